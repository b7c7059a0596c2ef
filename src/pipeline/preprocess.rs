//! Preprocessing stages: standardization and one-hot encoding
//!
//! Numeric features are scaled to zero mean / unit variance using statistics
//! computed from the training fold only. Categorical features are one-hot
//! encoded with an ignore-unknown policy: a category never seen during fit
//! encodes to an all-zero block at predict time instead of failing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dataset::Frame;
use crate::error::{Error, Result};

/// Column-transformer over explicit numeric and categorical feature lists.
///
/// Construction is purely structural; `fit` is the first call that touches
/// data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    numeric_features: Vec<String>,
    categorical_features: Vec<String>,
    state: Option<FittedState>,
}

/// Statistics captured at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedState {
    /// (mean, std) per numeric feature, in `numeric_features` order
    numeric_stats: Vec<(f64, f64)>,
    /// Sorted category values per categorical feature
    categories: Vec<Vec<String>>,
}

impl Preprocessor {
    /// Create an unfitted preprocessor over the given feature lists.
    #[must_use]
    pub const fn new(numeric_features: Vec<String>, categorical_features: Vec<String>) -> Self {
        Self {
            numeric_features,
            categorical_features,
            state: None,
        }
    }

    /// Compute scaling statistics and category sets from the training fold.
    ///
    /// # Errors
    ///
    /// Returns an error if a named feature is missing from the frame or a
    /// numeric feature contains a non-numeric cell.
    pub fn fit(&mut self, frame: &Frame) -> Result<()> {
        let mut numeric_stats = Vec::with_capacity(self.numeric_features.len());
        for name in &self.numeric_features {
            let values = frame.numeric_column(name).ok_or_else(|| {
                Error::Pipeline(format!("numeric feature '{name}' missing or non-numeric"))
            })?;
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance =
                values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
            numeric_stats.push((mean, variance.sqrt()));
        }

        let mut categories = Vec::with_capacity(self.categorical_features.len());
        for name in &self.categorical_features {
            let values = frame
                .category_column(name)
                .ok_or_else(|| Error::Pipeline(format!("categorical feature '{name}' missing")))?;
            let unique: BTreeSet<String> = values.into_iter().collect();
            categories.push(unique.into_iter().collect());
        }

        self.state = Some(FittedState {
            numeric_stats,
            categories,
        });
        Ok(())
    }

    /// Encode a frame into a dense feature matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if called before `fit` or if a feature column is
    /// missing from the frame.
    pub fn transform(&self, frame: &Frame) -> Result<Vec<Vec<f64>>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::Pipeline("transform called before fit".to_string()))?;

        let numeric_indices: Vec<usize> = self
            .numeric_features
            .iter()
            .map(|name| {
                frame.column_index(name).ok_or_else(|| {
                    Error::Pipeline(format!("numeric feature '{name}' missing from frame"))
                })
            })
            .collect::<Result<_>>()?;
        let categorical_indices: Vec<usize> = self
            .categorical_features
            .iter()
            .map(|name| {
                frame.column_index(name).ok_or_else(|| {
                    Error::Pipeline(format!("categorical feature '{name}' missing from frame"))
                })
            })
            .collect::<Result<_>>()?;

        let mut matrix = Vec::with_capacity(frame.num_rows());
        for row in frame.rows() {
            let mut encoded = Vec::with_capacity(self.output_width(state));

            for (feature_pos, &col_idx) in numeric_indices.iter().enumerate() {
                let raw = row[col_idx].as_f64().ok_or_else(|| {
                    Error::Pipeline(format!(
                        "non-numeric value in numeric feature '{}'",
                        self.numeric_features[feature_pos]
                    ))
                })?;
                let (mean, std) = state.numeric_stats[feature_pos];
                encoded.push(if std > 0.0 { (raw - mean) / std } else { 0.0 });
            }

            for (feature_pos, &col_idx) in categorical_indices.iter().enumerate() {
                let value = row[col_idx].as_category();
                let known = &state.categories[feature_pos];
                // Unknown category encodes as all zeros
                for category in known {
                    encoded.push(if *category == value { 1.0 } else { 0.0 });
                }
            }

            matrix.push(encoded);
        }
        Ok(matrix)
    }

    /// Names of the encoded output columns, in matrix order.
    ///
    /// `None` until fitted.
    #[must_use]
    pub fn output_feature_names(&self) -> Option<Vec<String>> {
        let state = self.state.as_ref()?;
        let mut names: Vec<String> = self.numeric_features.clone();
        for (feature, categories) in self.categorical_features.iter().zip(&state.categories) {
            for category in categories {
                names.push(format!("{feature}={category}"));
            }
        }
        Some(names)
    }

    fn output_width(&self, state: &FittedState) -> usize {
        self.numeric_features.len() + state.categories.iter().map(Vec::len).sum::<usize>()
    }
}
