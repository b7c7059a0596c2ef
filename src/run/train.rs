//! Training orchestrator: fresh configuration to fitted, logged, persisted run

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::dataset;
use crate::error::Result;
use crate::pipeline::MODEL_TYPE;
use crate::store::{ConfigMap, MetricMap};

use super::{execute, resolve_tracking_root, RunSpec};

/// Configuration for one training run, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Dataset path or URL.
    pub dataset: String,
    /// SQLite store for experiment metadata.
    pub db_path: PathBuf,
    /// Tracker experiment name.
    pub experiment_name: String,
    /// Optional tracker run name.
    pub run_name: Option<String>,
    /// Fraction of rows held out for evaluation.
    pub test_size: f64,
    /// Seed for splitting and the model.
    pub random_state: u64,
    /// Explicit tracker root override.
    pub tracking_uri: Option<String>,
    /// Fall back to a tracker root derived from the store path.
    pub use_local_tracker: bool,
    /// Free-form notes stored with the experiment record.
    pub notes: Option<String>,
}

/// Machine-readable training summary printed to stdout.
#[derive(Debug, Serialize)]
pub struct TrainOutcome {
    /// Id of the newly persisted experiment record.
    pub experiment_id: i64,
    /// Tracker run id cross-referenced on the record.
    pub tracking_run_id: String,
    /// Metrics on both folds.
    pub metrics: MetricMap,
    /// Tracker root the run was logged to.
    pub tracking_uri: String,
    /// Store location.
    pub db_path: String,
}

/// Baseline hyperparameters for the student performance regression.
#[must_use]
pub fn default_hyperparameters(random_state: u64) -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("n_estimators".to_string(), serde_json::json!(200));
    map.insert("max_depth".to_string(), serde_json::json!(8));
    map.insert("random_state".to_string(), serde_json::json!(random_state));
    map.insert("n_jobs".to_string(), serde_json::json!(-1));
    map
}

/// Run one full training cycle from fresh configuration.
///
/// # Errors
///
/// Any step failure (retrieval, missing target column, fit, tracker or
/// store write) aborts the run and propagates.
pub fn run_training(config: &TrainConfig) -> Result<TrainOutcome> {
    let tracking_root = resolve_tracking_root(
        config.tracking_uri.as_deref(),
        None,
        config.use_local_tracker,
        &config.db_path,
    );

    let mut tags = BTreeMap::new();
    tags.insert("target".to_string(), dataset::TARGET_COLUMN.to_string());

    let output = execute(RunSpec {
        dataset_source: config.dataset.clone(),
        db_path: config.db_path.clone(),
        experiment_name: config.experiment_name.clone(),
        run_name: config.run_name.clone(),
        model_type: MODEL_TYPE.to_string(),
        hyperparameters: default_hyperparameters(config.random_state),
        train_config_base: ConfigMap::new(),
        test_size: config.test_size,
        random_state: config.random_state,
        tracking_root,
        extra_params: Vec::new(),
        tags,
        notes: config.notes.clone(),
    })?;

    Ok(TrainOutcome {
        experiment_id: output.experiment_id,
        tracking_run_id: output.tracking_run_id,
        metrics: output.metrics,
        tracking_uri: output.tracking_uri,
        db_path: config.db_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters_match_baseline() {
        let map = default_hyperparameters(42);
        assert_eq!(map["n_estimators"], serde_json::json!(200));
        assert_eq!(map["max_depth"], serde_json::json!(8));
        assert_eq!(map["random_state"], serde_json::json!(42));
        assert_eq!(map["n_jobs"], serde_json::json!(-1));
    }
}
