//! Property-based tests for the store invariants and the splitter

use std::collections::BTreeMap;

use proptest::prelude::*;

use estudio::split::train_test_split;
use estudio::store::{ConfigMap, ExperimentDb, NewExperiment, Split};

fn json_scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9_-]{0,12}".prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
    ]
}

fn config_map() -> impl Strategy<Value = ConfigMap> {
    prop::collection::btree_map("[a-z_]{1,10}", json_scalar(), 0..8)
}

proptest! {
    /// Property: mappings come back exactly as inserted, for any contents.
    #[test]
    fn prop_experiment_mapping_round_trip(
        hyperparameters in config_map(),
        train_config in config_map(),
    ) {
        let db = ExperimentDb::open_in_memory().unwrap();
        let id = db
            .insert_experiment(NewExperiment::new(
                "RandomForestRegressor",
                hyperparameters.clone(),
                train_config.clone(),
            ))
            .unwrap();

        let record = db.fetch_experiment_by_id(id).unwrap();
        prop_assert_eq!(record.hyperparameters(), &hyperparameters);
        prop_assert_eq!(record.train_config(), &train_config);
    }

    /// Property: N snapshot rows in, exactly N rows out with row_index
    /// values 0..N-1 in order.
    #[test]
    fn prop_split_integrity(targets in prop::collection::vec(-1000.0f64..1000.0, 1..50)) {
        let mut db = ExperimentDb::open_in_memory().unwrap();
        let id = db
            .insert_experiment(NewExperiment::new(
                "RandomForestRegressor",
                ConfigMap::new(),
                ConfigMap::new(),
            ))
            .unwrap();

        let rows: Vec<BTreeMap<String, serde_json::Value>> = targets
            .iter()
            .enumerate()
            .map(|(i, _)| {
                [("row".to_string(), serde_json::json!(i))]
                    .into_iter()
                    .collect()
            })
            .collect();

        let written = db
            .insert_dataset_split(id, Split::Train, &rows, &targets)
            .unwrap();
        prop_assert_eq!(written, targets.len());

        let fetched = db.fetch_split_rows(id, Split::Train).unwrap();
        prop_assert_eq!(fetched.len(), targets.len());
        for (expected, row) in fetched.iter().enumerate() {
            prop_assert_eq!(row.row_index(), expected as i64);
            prop_assert_eq!(row.target(), Some(targets[expected]));
        }
    }

    /// Property: the latest experiment is always the last one inserted.
    #[test]
    fn prop_latest_is_last_inserted(count in 1usize..12) {
        let db = ExperimentDb::open_in_memory().unwrap();
        let mut last = 0;
        for _ in 0..count {
            last = db
                .insert_experiment(NewExperiment::new(
                    "RandomForestRegressor",
                    ConfigMap::new(),
                    ConfigMap::new(),
                ))
                .unwrap();
        }
        prop_assert_eq!(db.fetch_latest_experiment().unwrap().id(), last);
    }

    /// Property: the splitter partitions every row exactly once and is
    /// reproducible for a fixed seed.
    #[test]
    fn prop_split_partitions_and_reproduces(
        num_rows in 2usize..400,
        test_size in 0.05f64..0.95,
        seed in any::<u64>(),
    ) {
        let (train, test) = train_test_split(num_rows, test_size, seed).unwrap();
        prop_assert!(!train.is_empty());
        prop_assert!(!test.is_empty());

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..num_rows).collect::<Vec<_>>());

        let (train_again, test_again) = train_test_split(num_rows, test_size, seed).unwrap();
        prop_assert_eq!(train, train_again);
        prop_assert_eq!(test, test_again);
    }
}
