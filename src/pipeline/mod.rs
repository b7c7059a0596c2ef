//! Preprocessing + regression pipeline
//!
//! A pipeline is built purely structurally from explicit feature lists and a
//! hyperparameter mapping; no data is touched until `fit`. That is what lets
//! the retrain flow reconstruct equivalent preprocessing from a stored
//! record's hyperparameters plus freshly computed column lists.
//!
//! ```text
//! Frame ──> Preprocessor (scale numeric, one-hot categorical) ──> ForestRegressor
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estudio::pipeline::build_pipeline;
//! use std::collections::BTreeMap;
//!
//! let mut hyperparameters = BTreeMap::new();
//! hyperparameters.insert("n_estimators".to_string(), serde_json::json!(200));
//! let pipeline = build_pipeline(
//!     vec!["age".to_string()],
//!     vec!["school".to_string()],
//!     &hyperparameters,
//! )?;
//! # Ok::<(), estudio::Error>(())
//! ```

mod forest;
mod preprocess;

pub use forest::{ForestParams, ForestRegressor, MaxFeatures};
pub use preprocess::Preprocessor;

use serde::{Deserialize, Serialize};

use crate::dataset::Frame;
use crate::error::Result;
use crate::store::ConfigMap;

/// Estimator family label stored with every experiment record.
pub const MODEL_TYPE: &str = "RandomForestRegressor";

/// Assemble an unfitted pipeline from feature lists and hyperparameters.
///
/// The hyperparameter mapping is handed to the regressor verbatim; an
/// unrecognized key is an error here, not a silent drop. Building performs
/// no data access.
///
/// # Errors
///
/// Returns an error for unknown or invalid hyperparameters.
pub fn build_pipeline(
    numeric_features: Vec<String>,
    categorical_features: Vec<String>,
    hyperparameters: &ConfigMap,
) -> Result<Pipeline> {
    let params = ForestParams::from_map(hyperparameters)?;
    Ok(Pipeline {
        preprocessor: Preprocessor::new(numeric_features, categorical_features),
        regressor: ForestRegressor::new(params),
    })
}

/// Preprocessor + regressor, fitted as a unit.
///
/// Serializable after fitting; the serialized form is the model artifact
/// logged to the tracker and signed by the security audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    regressor: ForestRegressor,
}

impl Pipeline {
    /// Fit preprocessing statistics and the regressor on the training fold.
    ///
    /// # Errors
    ///
    /// Returns an error if a feature column is missing or the regressor
    /// rejects the encoded matrix.
    pub fn fit(&mut self, frame: &Frame, targets: &[f64]) -> Result<()> {
        self.preprocessor.fit(frame)?;
        let matrix = self.preprocessor.transform(frame)?;
        self.regressor.fit(&matrix, targets)
    }

    /// Predict targets for a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if called before `fit`.
    pub fn predict(&self, frame: &Frame) -> Result<Vec<f64>> {
        let matrix = self.preprocessor.transform(frame)?;
        self.regressor.predict(&matrix)
    }

    /// Normalized per-feature importances of the fitted regressor.
    ///
    /// `None` until fitted. This is the explicit capability query the
    /// reporting component uses instead of probing attributes.
    #[must_use]
    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.regressor.feature_importances()
    }

    /// Names of the encoded feature columns, aligned with importances.
    ///
    /// `None` until fitted.
    #[must_use]
    pub fn output_feature_names(&self) -> Option<Vec<String>> {
        self.preprocessor.output_feature_names()
    }

    /// The regressor's configured hyperparameters.
    #[must_use]
    pub const fn params(&self) -> &ForestParams {
        self.regressor.params()
    }
}
