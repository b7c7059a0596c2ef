//! End-to-end orchestrator tests: train, retrain, and audit over a
//! synthetic semicolon-delimited dataset.

use std::io::Write;
use std::path::{Path, PathBuf};

use estudio::audit::{run_audit, AuditConfig};
use estudio::run::{run_retraining, run_training, RetrainConfig, TrainConfig};
use estudio::store::{ExperimentDb, Split};

fn write_dataset(dir: &Path) -> PathBuf {
    let path = dir.join("students.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "age;studytime;school;sex;G3").unwrap();
    for i in 0..60i64 {
        let school = if i % 3 == 0 { "GP" } else { "MS" };
        let sex = if i % 2 == 0 { "F" } else { "M" };
        let grade = 5 + (i % 3) * 4 + i % 2;
        writeln!(file, "{};{};{};{};{}", 15 + i % 5, 1 + i % 4, school, sex, grade).unwrap();
    }
    path
}

fn train_config(dir: &Path) -> TrainConfig {
    TrainConfig {
        dataset: write_dataset(dir).display().to_string(),
        db_path: dir.join("experiments.db"),
        experiment_name: "flow-test".to_string(),
        run_name: Some("baseline".to_string()),
        test_size: 0.2,
        random_state: 42,
        tracking_uri: Some(dir.join("runs").display().to_string()),
        use_local_tracker: false,
        notes: Some("integration".to_string()),
    }
}

#[test]
fn test_training_persists_record_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_config(dir.path());

    let outcome = run_training(&config).unwrap();
    assert_eq!(outcome.experiment_id, 1);
    assert!(outcome.metrics.contains_key("test_mae"));
    assert!(outcome.metrics.contains_key("train_r2"));

    let db = ExperimentDb::open(&config.db_path).unwrap();
    let record = db.fetch_experiment_by_id(1).unwrap();
    assert_eq!(record.model_type(), "RandomForestRegressor");
    assert_eq!(record.tracking_run_id(), Some(outcome.tracking_run_id.as_str()));
    assert_eq!(record.notes(), Some("integration"));

    // Snapshot batches match the row counts recorded in train_config
    let train_rows = record.train_config()["train_rows"].as_i64().unwrap();
    let test_rows = record.train_config()["test_rows"].as_i64().unwrap();
    assert_eq!(train_rows + test_rows, 60);

    let train_split = db.fetch_split_rows(1, Split::Train).unwrap();
    let test_split = db.fetch_split_rows(1, Split::Test).unwrap();
    assert_eq!(train_split.len() as i64, train_rows);
    assert_eq!(test_split.len() as i64, test_rows);

    // Gap-free zero-based row indices
    for (expected, row) in train_split.iter().enumerate() {
        assert_eq!(row.row_index(), expected as i64);
    }

    // Tracker run directory holds the model artifact and analysis reports
    let run_dir = dir
        .path()
        .join("runs")
        .join("flow-test")
        .join(&outcome.tracking_run_id);
    assert!(run_dir.join("metrics.json").exists());
    assert!(run_dir.join("artifacts/model/model.json").exists());
    assert!(run_dir.join("artifacts/analysis/predictions.csv").exists());
    assert!(run_dir.join("artifacts/analysis/summary.json").exists());
}

#[test]
fn test_training_is_deterministic_for_fixed_seed() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let outcome_a = run_training(&train_config(dir_a.path())).unwrap();
    let outcome_b = run_training(&train_config(dir_b.path())).unwrap();

    assert_eq!(outcome_a.metrics, outcome_b.metrics);
}

#[test]
fn test_retraining_appends_lineage_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_config(dir.path());
    run_training(&config).unwrap();

    let outcome = run_retraining(&RetrainConfig {
        db_path: config.db_path.clone(),
        experiment_id: None,
        experiment_name: "flow-test".to_string(),
        run_name: None,
        tracking_uri: Some(dir.path().join("runs").display().to_string()),
        reuse_tracking_uri: false,
        use_local_tracker: false,
        notes: None,
    })
    .unwrap();

    assert_eq!(outcome.origin_experiment_id, 1);
    assert_eq!(outcome.experiment_id, 2);

    let db = ExperimentDb::open(&config.db_path).unwrap();
    let record = db.fetch_experiment_by_id(2).unwrap();
    assert_eq!(record.origin_experiment_id(), Some(1));
    assert_eq!(record.notes(), Some("Retrained from experiment 1"));

    // Identical configuration and dataset: metrics must reproduce
    let origin = db.fetch_experiment_by_id(1).unwrap();
    assert_eq!(record.hyperparameters(), origin.hyperparameters());
    assert_eq!(record.metrics(), origin.metrics());

    // The origin record was not mutated
    assert_eq!(origin.origin_experiment_id(), None);
}

#[test]
fn test_retraining_reuses_stored_tracker_uri() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_config(dir.path());
    run_training(&config).unwrap();

    let outcome = run_retraining(&RetrainConfig {
        db_path: config.db_path.clone(),
        experiment_id: Some(1),
        experiment_name: "flow-test".to_string(),
        run_name: Some("reuse-uri".to_string()),
        tracking_uri: None,
        reuse_tracking_uri: true,
        use_local_tracker: false,
        notes: None,
    })
    .unwrap();

    assert_eq!(
        outcome.tracking_uri,
        dir.path().join("runs").display().to_string()
    );
}

#[test]
fn test_retraining_missing_experiment_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_config(dir.path());
    run_training(&config).unwrap();

    let err = run_retraining(&RetrainConfig {
        db_path: config.db_path,
        experiment_id: Some(99),
        experiment_name: "flow-test".to_string(),
        run_name: None,
        tracking_uri: None,
        reuse_tracking_uri: false,
        use_local_tracker: false,
        notes: None,
    })
    .unwrap_err();
    assert!(matches!(err, estudio::Error::ExperimentNotFound(99)));
}

#[test]
fn test_audit_passes_over_fresh_training_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_config(dir.path());
    run_training(&config).unwrap();

    let dataset = dir.path().join("students.csv");
    let audit = AuditConfig {
        dataset: dataset.clone(),
        baseline_path: dir.path().join("security_baseline.json"),
        db_path: config.db_path.clone(),
        runs_dir: dir.path().join("runs"),
        tolerance_pct: 15.0,
        reset_baseline: false,
        signatures_path: dir.path().join("model_signatures.json"),
        record_signatures: true,
        report_path: dir.path().join("security_report.json"),
    };

    // First run records the baseline and model signatures
    let report = run_audit(&audit).unwrap();
    assert!(report
        .controls
        .iter()
        .any(|c| c.control == "dataset_integrity" && c.status == "passed"));
    assert!(report
        .controls
        .iter()
        .any(|c| c.control == "experiment_store" && c.status == "passed"));
    assert!(dir.path().join("security_report.json").exists());

    // Second run verifies the recorded signatures
    let report = run_audit(&audit).unwrap();
    assert!(report
        .controls
        .iter()
        .any(|c| c.control == "model_signatures" && c.status == "verified"));

    // Tampering with the dataset must itemize violations
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&dataset)
        .unwrap();
    writeln!(file, "99;9;GP;F;20").unwrap();
    drop(file);

    let err = run_audit(&audit).unwrap_err();
    assert!(matches!(err, estudio::Error::Integrity { .. }));
    assert!(err.to_string().contains("hash mismatch"));
}
