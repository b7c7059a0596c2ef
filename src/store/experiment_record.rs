//! Experiment Record - one persisted training run

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mapping type used for hyperparameters and train configuration.
///
/// A `BTreeMap` keeps keys sorted, so serializing the mapping always yields
/// the same text for the same contents regardless of insertion order.
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

/// Metric mapping (metric name to value).
pub type MetricMap = BTreeMap<String, f64>;

/// A persisted training run: configuration, outcome metrics, and the
/// tracker cross-reference.
///
/// Records are immutable once inserted. Retraining appends a new record
/// whose `train_config` carries an `origin_experiment_id` back-reference,
/// forming an append-only lineage graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    id: i64,
    model_type: String,
    hyperparameters: ConfigMap,
    train_config: ConfigMap,
    created_at: DateTime<Utc>,
    tracking_run_id: Option<String>,
    tracking_uri: Option<String>,
    metrics: Option<MetricMap>,
    data_source: Option<String>,
    notes: Option<String>,
}

impl ExperimentRecord {
    /// Assemble a record from stored fields. Used by the store when reading
    /// rows back; everything else treats records as read-only.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: i64,
        model_type: String,
        hyperparameters: ConfigMap,
        train_config: ConfigMap,
        created_at: DateTime<Utc>,
        tracking_run_id: Option<String>,
        tracking_uri: Option<String>,
        metrics: Option<MetricMap>,
        data_source: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id,
            model_type,
            hyperparameters,
            train_config,
            created_at,
            tracking_run_id,
            tracking_uri,
            metrics,
            data_source,
            notes,
        }
    }

    /// Auto-assigned id, monotonically increasing by creation order.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Estimator family label.
    #[must_use]
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Hyperparameter mapping, order-insensitive.
    #[must_use]
    pub const fn hyperparameters(&self) -> &ConfigMap {
        &self.hyperparameters
    }

    /// Train configuration (split ratios, row counts, target column, and for
    /// retrain records the origin experiment id).
    #[must_use]
    pub const fn train_config(&self) -> &ConfigMap {
        &self.train_config
    }

    /// Insertion timestamp (UTC, immutable).
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Tracker run id, if the run was tracked.
    #[must_use]
    pub fn tracking_run_id(&self) -> Option<&str> {
        self.tracking_run_id.as_deref()
    }

    /// Tracker root the run was logged to, if any.
    #[must_use]
    pub fn tracking_uri(&self) -> Option<&str> {
        self.tracking_uri.as_deref()
    }

    /// Outcome metrics, if recorded.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricMap> {
        self.metrics.as_ref()
    }

    /// Dataset origin identifier, if recorded.
    #[must_use]
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// Free-text notes, if any.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// The origin experiment id for retrain records, read out of
    /// `train_config`.
    #[must_use]
    pub fn origin_experiment_id(&self) -> Option<i64> {
        self.train_config
            .get("origin_experiment_id")
            .and_then(serde_json::Value::as_i64)
    }
}

/// Insert payload for a new experiment row.
///
/// The store assigns `id` and `created_at` at insertion; everything else is
/// provided here. Optional fields chain builder-style:
///
/// ```rust
/// use estudio::store::NewExperiment;
/// use std::collections::BTreeMap;
///
/// let new = NewExperiment::new("RandomForestRegressor", BTreeMap::new(), BTreeMap::new())
///     .data_source("https://example.com/data.csv")
///     .notes("baseline");
/// assert_eq!(new.model_type(), "RandomForestRegressor");
/// ```
#[derive(Debug, Clone)]
pub struct NewExperiment {
    model_type: String,
    hyperparameters: ConfigMap,
    train_config: ConfigMap,
    tracking_run_id: Option<String>,
    tracking_uri: Option<String>,
    metrics: Option<MetricMap>,
    data_source: Option<String>,
    notes: Option<String>,
}

impl NewExperiment {
    /// Create a payload with the required fields.
    #[must_use]
    pub fn new(
        model_type: impl Into<String>,
        hyperparameters: ConfigMap,
        train_config: ConfigMap,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            hyperparameters,
            train_config,
            tracking_run_id: None,
            tracking_uri: None,
            metrics: None,
            data_source: None,
            notes: None,
        }
    }

    /// Set the tracker run id.
    #[must_use]
    pub fn tracking_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.tracking_run_id = Some(run_id.into());
        self
    }

    /// Set the tracker root the run was logged to.
    #[must_use]
    pub fn tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = Some(uri.into());
        self
    }

    /// Attach outcome metrics.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricMap) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the dataset origin identifier.
    #[must_use]
    pub fn data_source(mut self, source: impl Into<String>) -> Self {
        self.data_source = Some(source.into());
        self
    }

    /// Attach free-text notes.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Estimator family label.
    #[must_use]
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub(crate) const fn hyperparameters_ref(&self) -> &ConfigMap {
        &self.hyperparameters
    }

    pub(crate) const fn train_config_ref(&self) -> &ConfigMap {
        &self.train_config
    }

    pub(crate) fn tracking_run_id_ref(&self) -> Option<&str> {
        self.tracking_run_id.as_deref()
    }

    pub(crate) fn tracking_uri_ref(&self) -> Option<&str> {
        self.tracking_uri.as_deref()
    }

    pub(crate) const fn metrics_ref(&self) -> Option<&MetricMap> {
        self.metrics.as_ref()
    }

    pub(crate) fn data_source_ref(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    pub(crate) fn notes_ref(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}
