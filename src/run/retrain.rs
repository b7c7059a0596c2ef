//! Retraining orchestrator: rebuild a run from a stored experiment record

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::{self, DATA_URL};
use crate::error::Result;
use crate::split::{DEFAULT_RANDOM_STATE, DEFAULT_TEST_SIZE};
use crate::store::{ExperimentDb, ExperimentRecord, MetricMap};

use super::{execute, resolve_tracking_root, RunSpec};

/// Configuration for one retraining run, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct RetrainConfig {
    /// SQLite store holding the experiment to reload.
    pub db_path: PathBuf,
    /// Experiment to reload; the latest record when omitted.
    pub experiment_id: Option<i64>,
    /// Tracker experiment name.
    pub experiment_name: String,
    /// Optional tracker run name override.
    pub run_name: Option<String>,
    /// Explicit tracker root; takes highest precedence.
    pub tracking_uri: Option<String>,
    /// Reuse the tracker root recorded on the source experiment.
    pub reuse_tracking_uri: bool,
    /// Fall back to a tracker root derived from the store path.
    pub use_local_tracker: bool,
    /// Notes stored on the new experiment record.
    pub notes: Option<String>,
}

/// Machine-readable retraining summary printed to stdout.
#[derive(Debug, Serialize)]
pub struct RetrainOutcome {
    /// Id of the experiment the configuration was reloaded from.
    pub origin_experiment_id: i64,
    /// Id of the newly persisted experiment record.
    pub experiment_id: i64,
    /// Tracker run id of the new run.
    pub tracking_run_id: String,
    /// Metrics on both folds.
    pub metrics: MetricMap,
    /// Tracker root the run was logged to.
    pub tracking_uri: String,
    /// Store location.
    pub db_path: String,
}

/// Reload a stored experiment and run the fit-and-log cycle with its
/// configuration.
///
/// Missing `random_state` / `test_size` keys in the stored config fall back
/// to the documented defaults (42 and 0.2). The new record's train config is
/// the origin's config merged with `origin_experiment_id` and refreshed row
/// counts; unrelated keys survive the merge.
///
/// # Errors
///
/// Returns a not-found error when the store is empty or the id is unknown;
/// any later step failure aborts the run and propagates.
pub fn run_retraining(config: &RetrainConfig) -> Result<RetrainOutcome> {
    // Read scope: connection opened, record fetched, connection closed
    let record = {
        let db = ExperimentDb::open(&config.db_path)?;
        match config.experiment_id {
            Some(id) => db.fetch_experiment_by_id(id)?,
            None => db.fetch_latest_experiment()?,
        }
    };
    tracing::info!(
        origin_experiment_id = record.id(),
        model_type = record.model_type(),
        "reloaded experiment configuration"
    );

    let spec = spec_from_record(&record, config);
    let output = execute(spec)?;

    Ok(RetrainOutcome {
        origin_experiment_id: record.id(),
        experiment_id: output.experiment_id,
        tracking_run_id: output.tracking_run_id,
        metrics: output.metrics,
        tracking_uri: output.tracking_uri,
        db_path: config.db_path.display().to_string(),
    })
}

fn spec_from_record(record: &ExperimentRecord, config: &RetrainConfig) -> RunSpec {
    let train_config = record.train_config();
    let random_state = train_config
        .get("random_state")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(DEFAULT_RANDOM_STATE);
    let test_size = train_config
        .get("test_size")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(DEFAULT_TEST_SIZE);

    let tracking_root = resolve_tracking_root(
        config.tracking_uri.as_deref(),
        if config.reuse_tracking_uri {
            record.tracking_uri()
        } else {
            None
        },
        config.use_local_tracker,
        &config.db_path,
    );

    // Forward-compatible merge: start from the origin's full config
    let mut train_config_base = train_config.clone();
    train_config_base.insert(
        "origin_experiment_id".to_string(),
        serde_json::json!(record.id()),
    );

    let mut tags = BTreeMap::new();
    tags.insert("target".to_string(), dataset::TARGET_COLUMN.to_string());
    tags.insert(
        "origin_experiment_id".to_string(),
        record.id().to_string(),
    );

    RunSpec {
        dataset_source: record.data_source().unwrap_or(DATA_URL).to_string(),
        db_path: config.db_path.clone(),
        experiment_name: config.experiment_name.clone(),
        run_name: Some(
            config
                .run_name
                .clone()
                .unwrap_or_else(|| format!("retrain-from-{}", record.id())),
        ),
        model_type: record.model_type().to_string(),
        hyperparameters: record.hyperparameters().clone(),
        train_config_base,
        test_size,
        random_state,
        tracking_root,
        extra_params: vec![(
            "origin_experiment_id".to_string(),
            serde_json::json!(record.id()),
        )],
        tags,
        notes: Some(
            config
                .notes
                .clone()
                .unwrap_or_else(|| format!("Retrained from experiment {}", record.id())),
        ),
    }
}
