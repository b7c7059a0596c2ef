//! # Estudio: Regression Experiment Harness
//!
//! Estudio trains a preprocessing + random-forest regression pipeline on a
//! delimited tabular dataset, logs metrics and artifacts to a file-based run
//! tracker, and persists experiment metadata and dataset snapshots in a
//! durable SQLite store.
//!
//! ## Design Principles
//!
//! - **Append-only lineage**: experiment records are immutable; retraining
//!   appends a new record with an `origin_experiment_id` back-reference
//! - **Deterministic serialization**: mapping fields are stored with sorted
//!   keys so identical configurations hash identically
//! - **Round-trip fidelity**: a stored record carries enough to rebuild an
//!   equivalent pipeline (hyperparameters + train config + data source)
//! - **Explicit capability queries**: optional reporting inputs (feature
//!   importances, output feature names) are `Option`s, never attribute probes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use estudio::store::ExperimentDb;
//! use std::collections::BTreeMap;
//!
//! let db = ExperimentDb::open("experiments.db")?;
//! let mut hyperparameters = BTreeMap::new();
//! hyperparameters.insert("n_estimators".to_string(), serde_json::json!(200));
//! let id = db.insert_experiment(
//!     estudio::store::NewExperiment::new("RandomForestRegressor", hyperparameters, BTreeMap::new()),
//! )?;
//! let record = db.fetch_experiment_by_id(id)?;
//! assert_eq!(record.model_type(), "RandomForestRegressor");
//! # Ok::<(), estudio::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod audit;
pub mod dataset;
pub mod error;
pub mod fairness;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod split;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
