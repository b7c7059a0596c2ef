//! Estudio CLI
//!
//! Four entry points over the harness: `train`, `retrain`, `audit`, and
//! `fairness`. Every subcommand prints a final JSON object to stdout and
//! exits non-zero with a descriptive message on any unrecoverable error.
//! Logs go to stderr so stdout stays machine-readable.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use estudio::audit::{run_audit, AuditConfig};
use estudio::dataset::DATA_URL;
use estudio::fairness::{run_fairness_scan, FairnessConfig, FairnessScanOutcome};
use estudio::run::{run_retraining, run_training, RetrainConfig, TrainConfig};

#[derive(Parser, Debug)]
#[command(name = "estudio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regression experiment harness with a durable experiment store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the student performance regression model
    Train(TrainArgs),
    /// Rebuild and retrain a model using parameters stored in the experiment store
    Retrain(RetrainArgs),
    /// Run MLSecOps security checks against the dataset, store, and model artifacts
    Audit(AuditArgs),
    /// Evaluate per-group fairness metrics for a sensitive feature
    Fairness(FairnessArgs),
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// Dataset path or URL
    #[arg(long, default_value = DATA_URL)]
    dataset: String,

    /// SQLite database file for experiment metadata
    #[arg(long, default_value = "experiments.db")]
    db_path: PathBuf,

    /// Tracker experiment name
    #[arg(long, default_value = "student-performance-regression")]
    experiment_name: String,

    /// Tracker run name
    #[arg(long, default_value = "baseline-random-forest")]
    run_name: String,

    /// Fraction of data used for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Random seed used for splitting and the model
    #[arg(long, default_value_t = 42)]
    random_state: u64,

    /// Explicit tracker root; takes precedence over --use-local-tracker
    #[arg(long)]
    tracking_uri: Option<String>,

    /// Use a tracker root derived from the database path
    #[arg(long)]
    use_local_tracker: bool,

    /// Free-form notes stored alongside the experiment metadata
    #[arg(long)]
    notes: Option<String>,
}

#[derive(clap::Args, Debug)]
struct RetrainArgs {
    /// SQLite database file that contains experiment metadata
    #[arg(long, default_value = "experiments.db")]
    db_path: PathBuf,

    /// Id of the experiment to reload; the latest one when omitted
    #[arg(long)]
    experiment_id: Option<i64>,

    /// Tracker experiment name
    #[arg(long, default_value = "student-performance-regression")]
    experiment_name: String,

    /// Tracker run name override
    #[arg(long)]
    run_name: Option<String>,

    /// Explicit tracker root; takes highest precedence
    #[arg(long)]
    tracking_uri: Option<String>,

    /// Reuse the tracker root stored in the experiment metadata if available
    #[arg(long)]
    reuse_tracking_uri: bool,

    /// Fall back to a tracker root derived from the database path
    #[arg(long)]
    use_local_tracker: bool,

    /// Notes to store for the new experiment record
    #[arg(long)]
    notes: Option<String>,
}

#[derive(clap::Args, Debug)]
struct AuditArgs {
    /// Path to the training dataset CSV
    #[arg(long)]
    dataset: PathBuf,

    /// JSON file storing the dataset baseline profile
    #[arg(long, default_value = "security_baseline.json")]
    baseline: PathBuf,

    /// Path to the experiments SQLite database
    #[arg(long)]
    experiments_db: PathBuf,

    /// Tracker root containing run artifacts
    #[arg(long, default_value = "runs")]
    runs_dir: PathBuf,

    /// Allowed percentage deviation for dataset statistics
    #[arg(long, default_value_t = 15.0)]
    tolerance_pct: f64,

    /// Recompute and overwrite the baseline profile
    #[arg(long)]
    reset_baseline: bool,

    /// JSON file containing model artifact signatures
    #[arg(long, default_value = "model_signatures.json")]
    model_signatures: PathBuf,

    /// Append missing model signatures to the signature file
    #[arg(long)]
    record_model_signatures: bool,

    /// Path to write the audit report (JSON)
    #[arg(long, default_value = "security_report.json")]
    report_path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct FairnessArgs {
    /// Local CSV (preferred) or URL to the student dataset
    #[arg(long, default_value = ".data/student-mat.csv")]
    dataset: String,

    /// Column name to evaluate group fairness on
    #[arg(long, default_value = "sex")]
    sensitive_feature: String,

    /// Where to store the JSON report
    #[arg(long, default_value = "fairness_report.json")]
    output: PathBuf,

    /// Test split size
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    random_state: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Train(args) => {
            let outcome = run_training(&TrainConfig {
                dataset: args.dataset,
                db_path: args.db_path,
                experiment_name: args.experiment_name,
                run_name: Some(args.run_name),
                test_size: args.test_size,
                random_state: args.random_state,
                tracking_uri: args.tracking_uri,
                use_local_tracker: args.use_local_tracker,
                notes: args.notes,
            })
            .context("training run failed")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Retrain(args) => {
            let outcome = run_retraining(&RetrainConfig {
                db_path: args.db_path,
                experiment_id: args.experiment_id,
                experiment_name: args.experiment_name,
                run_name: args.run_name,
                tracking_uri: args.tracking_uri,
                reuse_tracking_uri: args.reuse_tracking_uri,
                use_local_tracker: args.use_local_tracker,
                notes: args.notes,
            })
            .context("retraining run failed")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Audit(args) => {
            let report = run_audit(&AuditConfig {
                dataset: args.dataset,
                baseline_path: args.baseline,
                db_path: args.experiments_db,
                runs_dir: args.runs_dir,
                tolerance_pct: args.tolerance_pct,
                reset_baseline: args.reset_baseline,
                signatures_path: args.model_signatures,
                record_signatures: args.record_model_signatures,
                report_path: args.report_path.clone(),
            })?;
            let summary = serde_json::json!({
                "generated_at": report.generated_at,
                "report_path": args.report_path,
                "controls": report
                    .controls
                    .iter()
                    .map(|c| serde_json::json!({"control": c.control, "status": c.status}))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Fairness(args) => {
            let config = FairnessConfig {
                dataset: args.dataset,
                sensitive_feature: args.sensitive_feature,
                output: args.output.clone(),
                test_size: args.test_size,
                random_state: args.random_state,
            };
            match run_fairness_scan(&config)? {
                FairnessScanOutcome::Completed(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(ExitCode::SUCCESS)
                }
                FairnessScanOutcome::Failed { error } => {
                    let payload = serde_json::json!({
                        "status": "failed",
                        "error": error,
                        "output": args.output,
                    });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
