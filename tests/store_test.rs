//! Experiment store integration tests
//!
//! Round-trip, ordering, and not-found behavior against a real SQLite file,
//! including reopening the store to confirm durability.

use std::collections::BTreeMap;

use estudio::store::{ConfigMap, ExperimentDb, NewExperiment, Split};
use estudio::Error;

fn scenario_hyperparameters() -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("n_estimators".to_string(), serde_json::json!(100));
    map.insert("max_depth".to_string(), serde_json::json!(5));
    map
}

fn scenario_train_config() -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("test_size".to_string(), serde_json::json!(0.2));
    map.insert("random_state".to_string(), serde_json::json!(42));
    map
}

// =============================================================================
// Round-trip
// =============================================================================

#[test]
fn test_fresh_store_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let db = ExperimentDb::open(dir.path().join("experiments.db")).unwrap();

    let id = db
        .insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            scenario_hyperparameters(),
            scenario_train_config(),
        ))
        .unwrap();
    assert_eq!(id, 1);

    let record = db.fetch_experiment_by_id(1).unwrap();
    assert_eq!(record.model_type(), "RandomForestRegressor");
    assert_eq!(record.hyperparameters(), &scenario_hyperparameters());
    assert_eq!(record.train_config(), &scenario_train_config());
    assert!(record.created_at().timestamp() > 0);
}

#[test]
fn test_round_trip_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiments.db");

    let id = {
        let db = ExperimentDb::open(&path).unwrap();
        db.insert_experiment(
            NewExperiment::new(
                "RandomForestRegressor",
                scenario_hyperparameters(),
                scenario_train_config(),
            )
            .tracking_run_id("run-abc")
            .data_source("https://example.com/students.csv")
            .notes("baseline"),
        )
        .unwrap()
    };

    // Fresh connection: everything must have been committed durably
    let db = ExperimentDb::open(&path).unwrap();
    let record = db.fetch_experiment_by_id(id).unwrap();
    assert_eq!(record.tracking_run_id(), Some("run-abc"));
    assert_eq!(record.data_source(), Some("https://example.com/students.csv"));
    assert_eq!(record.notes(), Some("baseline"));
    assert_eq!(record.hyperparameters(), &scenario_hyperparameters());
}

#[test]
fn test_key_insertion_order_is_irrelevant() {
    let db = ExperimentDb::open_in_memory().unwrap();

    let mut forward = ConfigMap::new();
    forward.insert("a".to_string(), serde_json::json!(1));
    forward.insert("b".to_string(), serde_json::json!(2));

    let mut reverse = ConfigMap::new();
    reverse.insert("b".to_string(), serde_json::json!(2));
    reverse.insert("a".to_string(), serde_json::json!(1));

    let first = db
        .insert_experiment(NewExperiment::new("m", forward, ConfigMap::new()))
        .unwrap();
    let second = db
        .insert_experiment(NewExperiment::new("m", reverse, ConfigMap::new()))
        .unwrap();

    let first = db.fetch_experiment_by_id(first).unwrap();
    let second = db.fetch_experiment_by_id(second).unwrap();
    assert_eq!(first.hyperparameters(), second.hyperparameters());
}

// =============================================================================
// Ordering and not-found
// =============================================================================

#[test]
fn test_latest_returns_most_recent_insert() {
    let db = ExperimentDb::open_in_memory().unwrap();
    for _ in 0..3 {
        db.insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            ConfigMap::new(),
            ConfigMap::new(),
        ))
        .unwrap();
    }
    let latest_id = db
        .insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            ConfigMap::new(),
            ConfigMap::new(),
        ))
        .unwrap();

    assert_eq!(db.fetch_latest_experiment().unwrap().id(), latest_id);
}

#[test]
fn test_not_found_errors() {
    let db = ExperimentDb::open_in_memory().unwrap();

    assert!(matches!(
        db.fetch_latest_experiment().unwrap_err(),
        Error::NoExperiments
    ));
    assert!(matches!(
        db.fetch_experiment_by_id(7).unwrap_err(),
        Error::ExperimentNotFound(7)
    ));
}

// =============================================================================
// Dataset snapshots
// =============================================================================

#[test]
fn test_split_insert_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = ExperimentDb::open(dir.path().join("experiments.db")).unwrap();
    let id = db
        .insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            scenario_hyperparameters(),
            scenario_train_config(),
        ))
        .unwrap();

    let rows: Vec<BTreeMap<String, serde_json::Value>> = vec![
        [("a".to_string(), serde_json::json!(1))].into_iter().collect(),
        [("a".to_string(), serde_json::json!(2))].into_iter().collect(),
    ];
    let written = db
        .insert_dataset_split(id, Split::Test, &rows, &[10.5, 20.5])
        .unwrap();
    assert_eq!(written, 2);

    let fetched = db.fetch_split_rows(id, Split::Test).unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].row_index(), 0);
    assert_eq!(fetched[0].target(), Some(10.5));
    assert_eq!(fetched[1].row_index(), 1);
    assert_eq!(fetched[1].target(), Some(20.5));
}

#[test]
fn test_split_rows_share_feature_keys() {
    let mut db = ExperimentDb::open_in_memory().unwrap();
    let id = db
        .insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            ConfigMap::new(),
            ConfigMap::new(),
        ))
        .unwrap();

    let rows: Vec<BTreeMap<String, serde_json::Value>> = (0..4)
        .map(|i| {
            [
                ("age".to_string(), serde_json::json!(15 + i)),
                ("school".to_string(), serde_json::json!("GP")),
            ]
            .into_iter()
            .collect()
        })
        .collect();
    db.insert_dataset_split(id, Split::Train, &rows, &[1.0, 2.0, 3.0, 4.0])
        .unwrap();

    let fetched = db.fetch_split_rows(id, Split::Train).unwrap();
    let first_keys: Vec<&String> = fetched[0].features().keys().collect();
    for row in &fetched {
        assert_eq!(row.features().keys().collect::<Vec<_>>(), first_keys);
    }
}

#[test]
fn test_length_mismatch_is_rejected_not_truncated() {
    let mut db = ExperimentDb::open_in_memory().unwrap();
    let id = db
        .insert_experiment(NewExperiment::new(
            "RandomForestRegressor",
            ConfigMap::new(),
            ConfigMap::new(),
        ))
        .unwrap();

    let rows: Vec<BTreeMap<String, serde_json::Value>> =
        vec![BTreeMap::new(), BTreeMap::new(), BTreeMap::new()];
    let err = db
        .insert_dataset_split(id, Split::Train, &rows, &[1.0, 2.0])
        .unwrap_err();
    assert!(matches!(err, Error::SplitLengthMismatch { .. }));
    assert!(db.fetch_split_rows(id, Split::Train).unwrap().is_empty());
}
