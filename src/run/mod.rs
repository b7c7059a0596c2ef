//! Training and retraining orchestrators
//!
//! Both entry points drive the same linear fit-and-log cycle:
//!
//! ```text
//! load -> split -> build -> fit -> predict -> metrics
//!      -> tracker (metrics, params, model, reports)
//!      -> store (experiment record + both snapshot batches)
//!      -> JSON summary
//! ```
//!
//! There is no branching on failure: any error aborts the run and
//! propagates. Tracker writes happen before the store insert, so a failed
//! insert still leaves a complete externally-tracked run; the store record
//! then carries the tracker's run id for cross-referencing.

mod retrain;
mod train;

pub use retrain::{run_retraining, RetrainConfig, RetrainOutcome};
pub use train::{default_hyperparameters, run_training, TrainConfig, TrainOutcome};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::dataset;
use crate::error::Result;
use crate::metrics::{mean_absolute_error, mean_squared_error, r2_score};
use crate::pipeline::build_pipeline;
use crate::report::{log_regression_artifacts, FoldData};
use crate::split::train_test_split;
use crate::store::{ConfigMap, ExperimentDb, MetricMap, NewExperiment, Split};
use crate::tracker::{RunStatus, TrackerSession, DEFAULT_TRACKER_ROOT};

/// Resolve the tracker root by explicit precedence: override > URI stored on
/// the source experiment > store-adjacent local directory > tracker default.
pub(crate) fn resolve_tracking_root(
    explicit: Option<&str>,
    stored: Option<&str>,
    use_local_store: bool,
    db_path: &Path,
) -> String {
    if let Some(uri) = explicit {
        return uri.to_string();
    }
    if let Some(uri) = stored {
        return uri.to_string();
    }
    if use_local_store {
        return db_path.with_extension("runs").display().to_string();
    }
    DEFAULT_TRACKER_ROOT.to_string()
}

/// Everything one fit-and-log cycle needs, assembled by the train or retrain
/// front-end.
pub(crate) struct RunSpec {
    pub dataset_source: String,
    pub db_path: PathBuf,
    pub experiment_name: String,
    pub run_name: Option<String>,
    pub model_type: String,
    pub hyperparameters: ConfigMap,
    /// Base train config to merge refreshed values into. Retraining passes
    /// the origin's config here so unrelated keys survive.
    pub train_config_base: ConfigMap,
    pub test_size: f64,
    pub random_state: u64,
    pub tracking_root: String,
    pub extra_params: Vec<(String, serde_json::Value)>,
    pub tags: BTreeMap<String, String>,
    pub notes: Option<String>,
}

pub(crate) struct RunOutput {
    pub experiment_id: i64,
    pub tracking_run_id: String,
    pub metrics: MetricMap,
    pub tracking_uri: String,
}

/// The shared linear state machine (training orchestrator steps 1-9).
pub(crate) fn execute(spec: RunSpec) -> Result<RunOutput> {
    if let Some(parent) = spec.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let frame = dataset::load_dataset(&spec.dataset_source)?;
    let (features, targets) = frame.split_target(dataset::TARGET_COLUMN)?;
    tracing::info!(
        rows = features.num_rows(),
        columns = features.num_columns(),
        "dataset loaded"
    );

    let numeric_features = features.numeric_columns();
    let categorical_features = features.categorical_columns();
    let mut pipeline = build_pipeline(
        numeric_features,
        categorical_features,
        &spec.hyperparameters,
    )?;

    let (train_idx, test_idx) =
        train_test_split(features.num_rows(), spec.test_size, spec.random_state)?;
    let train_frame = features.select_rows(&train_idx);
    let test_frame = features.select_rows(&test_idx);
    let y_train = select(&targets, &train_idx);
    let y_test = select(&targets, &test_idx);

    let session = TrackerSession::open(&spec.tracking_root, spec.experiment_name.clone())?;
    let mut run = session.start_run(spec.run_name.as_deref())?;

    pipeline.fit(&train_frame, &y_train)?;
    let train_predictions = pipeline.predict(&train_frame)?;
    let test_predictions = pipeline.predict(&test_frame)?;
    let metrics = regression_metrics(&y_train, &train_predictions, &y_test, &test_predictions);
    tracing::info!(
        test_mae = metrics.get("test_mae"),
        test_r2 = metrics.get("test_r2"),
        "pipeline fitted"
    );

    run.log_metrics(&metrics)?;
    let flattened: BTreeMap<String, serde_json::Value> = spec
        .hyperparameters
        .iter()
        .map(|(key, value)| (format!("model__{key}"), value.clone()))
        .collect();
    run.log_params(&flattened)?;
    run.log_param("target_column", serde_json::json!(dataset::TARGET_COLUMN))?;
    run.log_param("test_size", serde_json::json!(spec.test_size))?;
    run.log_param("random_state", serde_json::json!(spec.random_state))?;
    for (key, value) in &spec.extra_params {
        run.log_param(key, value.clone())?;
    }
    run.log_json_artifact("model", "model.json", &pipeline)?;
    log_regression_artifacts(
        &mut run,
        &pipeline,
        FoldData {
            actual: &y_train,
            predicted: &train_predictions,
        },
        FoldData {
            actual: &y_test,
            predicted: &test_predictions,
        },
        &metrics,
        "analysis",
        &spec.tags,
    )?;

    let mut train_config = spec.train_config_base;
    train_config.insert("test_size".to_string(), serde_json::json!(spec.test_size));
    train_config.insert(
        "random_state".to_string(),
        serde_json::json!(spec.random_state),
    );
    train_config.insert(
        "target_column".to_string(),
        serde_json::json!(dataset::TARGET_COLUMN),
    );
    train_config.insert(
        "feature_count".to_string(),
        serde_json::json!(features.num_columns()),
    );
    train_config.insert("train_rows".to_string(), serde_json::json!(y_train.len()));
    train_config.insert("test_rows".to_string(), serde_json::json!(y_test.len()));

    let mut new_experiment = NewExperiment::new(
        spec.model_type,
        spec.hyperparameters.clone(),
        train_config,
    )
    .tracking_run_id(run.run_id())
    .tracking_uri(session.uri())
    .metrics(metrics.clone())
    .data_source(spec.dataset_source.clone());
    if let Some(notes) = &spec.notes {
        new_experiment = new_experiment.notes(notes.clone());
    }

    // Store connection scoped to one logical transaction sequence
    let experiment_id = {
        let mut db = ExperimentDb::open(&spec.db_path)?;
        let experiment_id = db.insert_experiment(new_experiment)?;
        db.insert_dataset_split(
            experiment_id,
            Split::Train,
            &train_frame.feature_maps(),
            &y_train,
        )?;
        db.insert_dataset_split(
            experiment_id,
            Split::Test,
            &test_frame.feature_maps(),
            &y_test,
        )?;
        experiment_id
    };
    tracing::info!(experiment_id, "experiment persisted");

    let record = run.complete(RunStatus::Success)?;
    Ok(RunOutput {
        experiment_id,
        tracking_run_id: record.run_id().to_string(),
        metrics,
        tracking_uri: session.uri(),
    })
}

fn regression_metrics(
    y_train: &[f64],
    train_predictions: &[f64],
    y_test: &[f64],
    test_predictions: &[f64],
) -> MetricMap {
    let mut metrics = MetricMap::new();
    metrics.insert(
        "train_mse".to_string(),
        mean_squared_error(y_train, train_predictions),
    );
    metrics.insert(
        "train_mae".to_string(),
        mean_absolute_error(y_train, train_predictions),
    );
    metrics.insert("train_r2".to_string(), r2_score(y_train, train_predictions));
    metrics.insert(
        "test_mse".to_string(),
        mean_squared_error(y_test, test_predictions),
    );
    metrics.insert(
        "test_mae".to_string(),
        mean_absolute_error(y_test, test_predictions),
    );
    metrics.insert("test_r2".to_string(), r2_score(y_test, test_predictions));
    metrics
}

fn select(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}
