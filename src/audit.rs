//! MLSecOps security audit
//!
//! Three controls, each mapped to OWASP-ML / MITRE-ATLAS identifiers in the
//! report:
//!
//! - **dataset integrity**: SHA-256 of the dataset file plus a per-column
//!   statistical profile compared to a stored baseline within a percentage
//!   tolerance
//! - **experiment store**: the snapshot relation exists and both splits are
//!   present and non-empty
//! - **model signatures**: SHA-256 signatures of tracked model artifacts
//!   verified against (or recorded into) a signature file
//!
//! All checks run to completion and every violation is itemized; the audit
//! report is written to its output location even when controls fail.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::{Frame, DATASET_DELIMITER};
use crate::error::{Error, Result};
use crate::metrics::SummaryStats;
use crate::store::ExperimentDb;

/// Static definition of one security control.
struct ControlDef {
    key: &'static str,
    description: &'static str,
    owasp: &'static str,
    mitre: &'static [&'static str],
}

const DATASET_INTEGRITY: ControlDef = ControlDef {
    key: "dataset_integrity",
    description: "Verify dataset hash and statistical profile to detect poisoning or tampering.",
    owasp: "ML01 Data Poisoning",
    mitre: &[
        "ATLAS.TA0001 Initial Access",
        "ATLAS.T1546 Poison Training Data",
    ],
};

const EXPERIMENT_STORE: ControlDef = ControlDef {
    key: "experiment_store",
    description: "Ensure dataset snapshots exist for both splits to defend supply-chain attacks.",
    owasp: "ML06 Supply-Chain Vulnerability",
    mitre: &["ATLAS.T1521 Manipulate ML Supply Chain"],
};

const MODEL_SIGNATURES: ControlDef = ControlDef {
    key: "model_signatures",
    description: "Validate tracked model artifacts via SHA-256 signatures.",
    owasp: "ML05 Model Theft",
    mitre: &["ATLAS.T1600 Exfiltration of ML Assets"],
};

/// Configuration for one audit run, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Training dataset CSV to profile.
    pub dataset: PathBuf,
    /// JSON file holding the dataset baseline profile.
    pub baseline_path: PathBuf,
    /// Experiment store to check.
    pub db_path: PathBuf,
    /// Tracker root containing run artifacts.
    pub runs_dir: PathBuf,
    /// Allowed percentage deviation for dataset statistics.
    pub tolerance_pct: f64,
    /// Recompute and overwrite the baseline profile.
    pub reset_baseline: bool,
    /// JSON file holding model artifact signatures.
    pub signatures_path: PathBuf,
    /// Append signatures for model artifacts not yet recorded.
    pub record_signatures: bool,
    /// Where the audit report is written.
    pub report_path: PathBuf,
}

/// Hash + statistical fingerprint of a dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Dataset file location.
    pub path: String,
    /// SHA-256 of the file contents.
    pub sha256: String,
    /// Tolerance the profile was captured with.
    pub tolerance_pct: f64,
    /// Per-numeric-column summary statistics.
    pub stats: BTreeMap<String, SummaryStats>,
    /// When the profile was captured.
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Baseline {
    dataset: DatasetProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignatureEntry {
    sha256: String,
    path: String,
    recorded_at: DateTime<Utc>,
}

/// Per-control outcome in the audit report.
#[derive(Debug, Clone, Serialize)]
pub struct ControlReport {
    /// Control key.
    pub control: String,
    /// What the control defends against.
    pub description: String,
    /// OWASP ML identifier.
    pub owasp: String,
    /// MITRE ATLAS identifiers.
    pub mitre: Vec<String>,
    /// Outcome: passed, failed, verified, recorded, or missing.
    pub status: String,
    /// When the control ran.
    pub timestamp: DateTime<Utc>,
}

/// Full audit report, written as JSON to the configured report path.
#[derive(Debug, Serialize)]
pub struct AuditReport {
    /// When the audit ran.
    pub generated_at: DateTime<Utc>,
    /// Current dataset profile.
    pub dataset: DatasetProfile,
    /// Per-control outcomes.
    pub controls: Vec<ControlReport>,
}

/// SHA-256 of a file's contents, hex encoded.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Profile a dataset file: content hash plus per-numeric-column statistics.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn build_dataset_profile(csv_path: &Path, tolerance_pct: f64) -> Result<DatasetProfile> {
    let frame = Frame::from_delimited_path(csv_path, DATASET_DELIMITER)?;
    let mut stats = BTreeMap::new();
    for column in frame.numeric_columns() {
        if let Some(values) = frame.numeric_column(&column) {
            if let Some(summary) = SummaryStats::from_values(&values) {
                stats.insert(column, summary);
            }
        }
    }
    Ok(DatasetProfile {
        path: csv_path.display().to_string(),
        sha256: sha256_file(csv_path)?,
        tolerance_pct,
        stats,
        last_updated: Utc::now(),
    })
}

/// Compare a current profile against the baseline; returns every violation.
fn verify_dataset(baseline: &DatasetProfile, current: &DatasetProfile) -> Vec<String> {
    let tolerance = baseline.tolerance_pct;
    let mut violations = Vec::new();

    if baseline.sha256 != current.sha256 {
        violations.push(format!(
            "dataset hash mismatch: possible tampering or drift in {}",
            current.path
        ));
    }

    for (column, reference) in &baseline.stats {
        let Some(observed) = current.stats.get(column) else {
            violations.push(format!(
                "column '{column}' missing from current dataset profile"
            ));
            continue;
        };
        let pairs = [
            ("mean", reference.mean, observed.mean),
            ("std", reference.std, observed.std),
            ("min", reference.min, observed.min),
            ("max", reference.max, observed.max),
        ];
        for (metric, reference_value, observed_value) in pairs {
            if reference_value == 0.0 {
                continue;
            }
            let delta_pct =
                (observed_value - reference_value).abs() / reference_value.abs() * 100.0;
            if delta_pct > tolerance {
                violations.push(format!(
                    "{column}.{metric} deviated by {delta_pct:.2}% \
                     (baseline={reference_value:.4}, current={observed_value:.4})"
                ));
            }
        }
    }

    violations
}

/// Check the snapshot relation exists and both splits hold rows.
fn verify_snapshot_store(db_path: &Path) -> Vec<String> {
    let db = match ExperimentDb::open_existing(db_path) {
        Ok(db) => db,
        Err(Error::Integrity { violations }) => return violations,
        Err(err) => return vec![err.to_string()],
    };

    match db.has_table("dataset_snapshots") {
        Ok(true) => {}
        Ok(false) => {
            return vec![format!(
                "dataset_snapshots table not found in {}",
                db_path.display()
            )]
        }
        Err(err) => return vec![err.to_string()],
    }

    let counts = match db.split_row_counts() {
        Ok(counts) => counts,
        Err(err) => return vec![err.to_string()],
    };

    let mut violations = Vec::new();
    for split in ["train", "test"] {
        match counts.get(split) {
            None => violations.push(format!("dataset_snapshots missing expected split: {split}")),
            Some(0) => violations.push(format!("dataset_snapshots split '{split}' is empty")),
            Some(_) => {}
        }
    }
    violations
}

/// Locate model artifacts under the tracker root, keyed by run id.
fn collect_model_artifacts(runs_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut artifacts = BTreeMap::new();
    if !runs_dir.exists() {
        return Ok(artifacts);
    }

    for experiment_entry in std::fs::read_dir(runs_dir)? {
        let experiment_dir = experiment_entry?.path();
        if !experiment_dir.is_dir() || is_hidden(&experiment_dir) {
            continue;
        }
        for run_entry in std::fs::read_dir(&experiment_dir)? {
            let run_dir = run_entry?.path();
            if !run_dir.is_dir() || is_hidden(&run_dir) {
                continue;
            }
            let candidate = run_dir.join("artifacts").join("model").join("model.json");
            if candidate.exists() {
                if let Some(run_id) = run_dir.file_name().and_then(|n| n.to_str()) {
                    artifacts.insert(run_id.to_string(), candidate);
                }
            }
        }
    }
    Ok(artifacts)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Verify (and optionally record) model artifact signatures.
///
/// Returns the control status plus every violation found.
fn verify_model_signatures(
    signatures_path: &Path,
    artifacts: &BTreeMap<String, PathBuf>,
    record: bool,
) -> Result<(String, Vec<String>)> {
    if !signatures_path.exists() {
        if record && !artifacts.is_empty() {
            let mut signatures = BTreeMap::new();
            for (run_id, path) in artifacts {
                signatures.insert(run_id.clone(), signature_entry(path)?);
            }
            write_signatures(signatures_path, &signatures)?;
            tracing::info!(count = signatures.len(), "recorded model signatures");
            return Ok(("recorded".to_string(), Vec::new()));
        }
        return Ok(("missing".to_string(), Vec::new()));
    }

    let text = std::fs::read_to_string(signatures_path)?;
    let mut signatures: BTreeMap<String, SignatureEntry> = serde_json::from_str(&text)?;

    let mut violations = Vec::new();
    for (run_id, entry) in &signatures {
        let recorded_path = PathBuf::from(&entry.path);
        if !recorded_path.exists() {
            violations.push(format!(
                "recorded model artifact missing: {}",
                recorded_path.display()
            ));
            continue;
        }
        if sha256_file(&recorded_path)? != entry.sha256 {
            violations.push(format!("model hash mismatch for run {run_id}"));
        }
    }
    if !violations.is_empty() {
        return Ok(("failed".to_string(), violations));
    }

    if record {
        let mut appended = 0usize;
        for (run_id, path) in artifacts {
            if signatures.contains_key(run_id) {
                continue;
            }
            signatures.insert(run_id.clone(), signature_entry(path)?);
            appended += 1;
        }
        if appended > 0 {
            write_signatures(signatures_path, &signatures)?;
            tracing::info!(appended, "appended signatures for new model artifacts");
            return Ok(("recorded".to_string(), Vec::new()));
        }
    }

    Ok(("verified".to_string(), Vec::new()))
}

fn signature_entry(path: &Path) -> Result<SignatureEntry> {
    Ok(SignatureEntry {
        sha256: sha256_file(path)?,
        path: path.display().to_string(),
        recorded_at: Utc::now(),
    })
}

fn write_signatures(path: &Path, signatures: &BTreeMap<String, SignatureEntry>) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(signatures)?)?;
    Ok(())
}

fn control_report(def: &ControlDef, status: &str) -> ControlReport {
    ControlReport {
        control: def.key.to_string(),
        description: def.description.to_string(),
        owasp: def.owasp.to_string(),
        mitre: def.mitre.iter().map(ToString::to_string).collect(),
        status: status.to_string(),
        timestamp: Utc::now(),
    }
}

/// Run every control, write the audit report, and fail with an itemized
/// violation list if any control failed.
///
/// # Errors
///
/// Returns [`Error::Integrity`] carrying every violation found across all
/// controls, or an IO/parse error from the checks themselves.
pub fn run_audit(config: &AuditConfig) -> Result<AuditReport> {
    if !config.dataset.exists() {
        return Err(Error::Integrity {
            violations: vec![format!("dataset not found at {}", config.dataset.display())],
        });
    }

    if config.reset_baseline || !config.baseline_path.exists() {
        let profile = build_dataset_profile(&config.dataset, config.tolerance_pct)?;
        std::fs::write(
            &config.baseline_path,
            serde_json::to_string_pretty(&Baseline { dataset: profile })?,
        )?;
        tracing::info!(path = %config.baseline_path.display(), "baseline profile created");
    }

    let baseline: Baseline =
        serde_json::from_str(&std::fs::read_to_string(&config.baseline_path)?)?;
    let current = build_dataset_profile(&config.dataset, config.tolerance_pct)?;

    let mut all_violations = Vec::new();
    let mut controls = Vec::new();

    let dataset_violations = verify_dataset(&baseline.dataset, &current);
    controls.push(control_report(
        &DATASET_INTEGRITY,
        if dataset_violations.is_empty() {
            "passed"
        } else {
            "failed"
        },
    ));
    all_violations.extend(dataset_violations);

    let store_violations = verify_snapshot_store(&config.db_path);
    controls.push(control_report(
        &EXPERIMENT_STORE,
        if store_violations.is_empty() {
            "passed"
        } else {
            "failed"
        },
    ));
    all_violations.extend(store_violations);

    let artifacts = collect_model_artifacts(&config.runs_dir)?;
    let (signature_status, signature_violations) = verify_model_signatures(
        &config.signatures_path,
        &artifacts,
        config.record_signatures,
    )?;
    controls.push(control_report(&MODEL_SIGNATURES, &signature_status));
    all_violations.extend(signature_violations);

    let report = AuditReport {
        generated_at: Utc::now(),
        dataset: current,
        controls,
    };
    // Report is written even when controls failed
    std::fs::write(&config.report_path, serde_json::to_string_pretty(&report)?)?;

    if all_violations.is_empty() {
        tracing::info!("all security checks passed");
        Ok(report)
    } else {
        Err(Error::Integrity {
            violations: all_violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(dir: &Path, rows: &[(i64, i64)]) -> PathBuf {
        let path = dir.join("data.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "age;G3").unwrap();
        for (age, grade) in rows {
            writeln!(file, "{age};{grade}").unwrap();
        }
        path
    }

    #[test]
    fn test_profile_captures_numeric_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(dir.path(), &[(16, 10), (18, 14)]);
        let profile = build_dataset_profile(&path, 15.0).unwrap();
        assert!(profile.stats.contains_key("age"));
        assert!(profile.stats.contains_key("G3"));
        assert!((profile.stats["age"].mean - 17.0).abs() < 1e-12);
        assert_eq!(profile.sha256.len(), 64);
    }

    #[test]
    fn test_verify_dataset_itemizes_every_drift() {
        let dir = tempfile::tempdir().unwrap();
        let baseline_path = write_dataset(dir.path(), &[(16, 10), (18, 14)]);
        let baseline = build_dataset_profile(&baseline_path, 10.0).unwrap();

        let drifted_path = write_dataset(dir.path(), &[(30, 2), (50, 3)]);
        let drifted = build_dataset_profile(&drifted_path, 10.0).unwrap();

        let violations = verify_dataset(&baseline, &drifted);
        // hash mismatch plus several stat deviations, all reported
        assert!(violations.len() > 2);
        assert!(violations.iter().any(|v| v.contains("hash mismatch")));
        assert!(violations.iter().any(|v| v.contains("age.mean")));
    }

    #[test]
    fn test_verify_snapshot_store_flags_missing_splits() {
        use crate::store::{ConfigMap, NewExperiment, Split};
        use std::collections::BTreeMap as Map;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("experiments.db");
        {
            let mut db = ExperimentDb::open(&db_path).unwrap();
            let id = db
                .insert_experiment(NewExperiment::new(
                    "RandomForestRegressor",
                    ConfigMap::new(),
                    ConfigMap::new(),
                ))
                .unwrap();
            let rows: Vec<Map<String, serde_json::Value>> = vec![Map::new()];
            db.insert_dataset_split(id, Split::Train, &rows, &[1.0])
                .unwrap();
            // no test split inserted
        }

        let violations = verify_snapshot_store(&db_path);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("test"));
    }

    #[test]
    fn test_signatures_record_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        std::fs::write(&model_path, "{}").unwrap();
        let mut artifacts = BTreeMap::new();
        artifacts.insert("run-1".to_string(), model_path.clone());

        let signatures_path = dir.path().join("model_signatures.json");

        let (status, violations) =
            verify_model_signatures(&signatures_path, &artifacts, true).unwrap();
        assert_eq!(status, "recorded");
        assert!(violations.is_empty());

        let (status, violations) =
            verify_model_signatures(&signatures_path, &artifacts, false).unwrap();
        assert_eq!(status, "verified");
        assert!(violations.is_empty());

        // Tamper with the artifact: next verify must fail with an itemized entry
        std::fs::write(&model_path, "{\"tampered\":true}").unwrap();
        let (status, violations) =
            verify_model_signatures(&signatures_path, &artifacts, false).unwrap();
        assert_eq!(status, "failed");
        assert!(violations.iter().any(|v| v.contains("run-1")));
    }

    #[test]
    fn test_signatures_missing_without_record_flag() {
        let dir = tempfile::tempdir().unwrap();
        let signatures_path = dir.path().join("model_signatures.json");
        let (status, violations) =
            verify_model_signatures(&signatures_path, &BTreeMap::new(), false).unwrap();
        assert_eq!(status, "missing");
        assert!(violations.is_empty());
    }
}
