//! Deterministic random-forest regressor
//!
//! Exact-greedy variance-reduction trees over bootstrap samples, with
//! per-split feature subsampling. All randomness flows from the configured
//! `random_state` through per-tree seeded RNGs, so the same seed and data
//! always produce the same model and the same predictions.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::split::DEFAULT_RANDOM_STATE;
use crate::store::ConfigMap;

/// How many features are considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Every feature (the estimator default).
    All,
    /// `round(sqrt(num_features))`, at least one.
    Sqrt,
    /// `round(log2(num_features))`, at least one.
    Log2,
    /// A fixed feature count, capped at the feature total.
    Count(usize),
    /// A fraction of the feature total, at least one.
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(self, num_features: usize) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let resolved = match self {
            Self::All => num_features,
            Self::Sqrt => (num_features as f64).sqrt().round() as usize,
            Self::Log2 => (num_features as f64).log2().round() as usize,
            Self::Count(count) => count,
            Self::Fraction(fraction) => (num_features as f64 * fraction).round() as usize,
        };
        resolved.clamp(1, num_features)
    }
}

/// Hyperparameters recognized by [`ForestRegressor`].
///
/// Parsed from the experiment's hyperparameter mapping; any key outside this
/// set is rejected at build time rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees in the ensemble.
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until the leaf minimum stops it.
    pub max_depth: Option<usize>,
    /// Minimum samples a leaf may hold.
    pub min_samples_leaf: usize,
    /// Per-split feature subsampling policy.
    pub max_features: MaxFeatures,
    /// Seed for bootstrap sampling and feature subsampling.
    pub random_state: u64,
    /// Parallelism hint accepted for config fidelity; training is
    /// single-threaded, so the value has no effect.
    pub n_jobs: Option<i64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            random_state: DEFAULT_RANDOM_STATE,
            n_jobs: None,
        }
    }
}

impl ForestParams {
    /// Parse the hyperparameter mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHyperparameter`] for an unrecognized key and
    /// [`Error::InvalidHyperparameter`] for a value with the wrong type or
    /// an out-of-range value.
    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let mut params = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "n_estimators" => {
                    params.n_estimators = positive_usize(key, value)?;
                }
                "max_depth" => {
                    params.max_depth = if value.is_null() {
                        None
                    } else {
                        Some(positive_usize(key, value)?)
                    };
                }
                "min_samples_leaf" => {
                    params.min_samples_leaf = positive_usize(key, value)?;
                }
                "max_features" => {
                    params.max_features = parse_max_features(key, value)?;
                }
                "random_state" => {
                    params.random_state = value.as_u64().ok_or_else(|| invalid(
                        key,
                        "expected a non-negative integer seed",
                    ))?;
                }
                "n_jobs" => {
                    params.n_jobs = Some(value.as_i64().ok_or_else(|| invalid(
                        key,
                        "expected an integer",
                    ))?);
                }
                other => return Err(Error::UnknownHyperparameter(other.to_string())),
            }
        }
        Ok(params)
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidHyperparameter {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn positive_usize(key: &str, value: &serde_json::Value) -> Result<usize> {
    value
        .as_u64()
        .filter(|v| *v >= 1)
        .map(|v| v as usize)
        .ok_or_else(|| invalid(key, "expected a positive integer"))
}

fn parse_max_features(key: &str, value: &serde_json::Value) -> Result<MaxFeatures> {
    if let Some(label) = value.as_str() {
        return match label {
            "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            other => Err(invalid(key, &format!("unknown policy '{other}'"))),
        };
    }
    if let Some(count) = value.as_u64() {
        if count >= 1 {
            #[allow(clippy::cast_possible_truncation)]
            return Ok(MaxFeatures::Count(count as usize));
        }
        return Err(invalid(key, "feature count must be at least 1"));
    }
    if let Some(fraction) = value.as_f64() {
        if fraction > 0.0 && fraction <= 1.0 {
            return Ok(MaxFeatures::Fraction(fraction));
        }
        return Err(invalid(key, "fraction must be in (0, 1]"));
    }
    Err(invalid(key, "expected 'sqrt', 'log2', a count, or a fraction"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if let Some(value) = node.value {
                return value;
            }
            idx = if row[node.feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    features_per_split: usize,
    num_features: usize,
}

impl TreeBuilder<'_> {
    fn build(
        &self,
        indices: &[usize],
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> RegressionTree {
        let mut nodes = Vec::new();
        self.build_node(indices, 0, &mut nodes, rng, importances);
        RegressionTree { nodes }
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<TreeNode>,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> usize {
        let current = nodes.len();
        let leaf_value = self.mean_target(indices);

        if depth >= self.max_depth || indices.len() < 2 * self.min_samples_leaf {
            nodes.push(leaf(leaf_value));
            return current;
        }

        let Some(split) = self.find_best_split(indices, rng) else {
            nodes.push(leaf(leaf_value));
            return current;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        importances[split.feature] += split.gain;

        nodes.push(TreeNode {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left = self.build_node(&left_indices, depth + 1, nodes, rng, importances);
        let right = self.build_node(&right_indices, depth + 1, nodes, rng, importances);
        nodes[current].left = left;
        nodes[current].right = right;
        current
    }

    /// Exact-greedy search: per candidate feature, sort the node's samples
    /// by feature value and sweep prefix sums, so each feature costs
    /// O(n log n) instead of O(n * thresholds).
    fn find_best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let mut candidate_features: Vec<usize> = (0..self.num_features).collect();
        candidate_features.shuffle(rng);
        candidate_features.truncate(self.features_per_split);
        // Iterate in ascending order so gain ties resolve to the lowest
        // feature index regardless of the shuffle
        candidate_features.sort_unstable();

        let n = indices.len();
        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n_f;

        let mut best: Option<SplitCandidate> = None;
        for feature in candidate_features {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for i in 1..n {
                left_sum += pairs[i - 1].1;
                left_sq += pairs[i - 1].1 * pairs[i - 1].1;

                if pairs[i].0 <= pairs[i - 1].0 {
                    continue;
                }
                if i < self.min_samples_leaf || n - i < self.min_samples_leaf {
                    continue;
                }

                #[allow(clippy::cast_precision_loss)]
                let (left_n, right_n) = (i as f64, (n - i) as f64);
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / left_n;
                let right_sse = right_sq - right_sum * right_sum / right_n;
                let gain = parent_sse - left_sse - right_sse;

                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (pairs[i - 1].0 + pairs[i].0) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = indices.len() as f64;
        indices.iter().map(|&i| self.y[i]).sum::<f64>() / n
    }
}

const fn leaf(value: f64) -> TreeNode {
    TreeNode {
        feature: 0,
        threshold: 0.0,
        left: 0,
        right: 0,
        value: Some(value),
    }
}

/// Random-forest regression estimator.
///
/// Unfitted after construction; `fit` grows the ensemble and captures
/// normalized per-feature importances (total split gain attributed to each
/// feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestRegressor {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    num_features: usize,
    importances: Option<Vec<f64>>,
}

impl ForestRegressor {
    /// Create an unfitted regressor with the given parameters.
    #[must_use]
    pub const fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            num_features: 0,
            importances: None,
        }
    }

    /// The configured hyperparameters.
    #[must_use]
    pub const fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Fit the ensemble on a dense feature matrix.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, mismatched lengths, or ragged rows.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() {
            return Err(Error::Pipeline("cannot fit on an empty matrix".to_string()));
        }
        if x.len() != y.len() {
            return Err(Error::Pipeline(format!(
                "feature matrix has {} rows but target has {}",
                x.len(),
                y.len()
            )));
        }
        let num_features = x[0].len();
        if x.iter().any(|row| row.len() != num_features) {
            return Err(Error::Pipeline("ragged feature matrix".to_string()));
        }

        let builder = TreeBuilder {
            x,
            y,
            max_depth: self.params.max_depth.unwrap_or(usize::MAX),
            min_samples_leaf: self.params.min_samples_leaf,
            features_per_split: self.params.max_features.resolve(num_features),
            num_features,
        };

        let mut importances = vec![0.0; num_features];
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for tree_idx in 0..self.params.n_estimators {
            let mut rng = StdRng::seed_from_u64(tree_seed(self.params.random_state, tree_idx));
            let bootstrap: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            trees.push(builder.build(&bootstrap, &mut rng, &mut importances));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for importance in &mut importances {
                *importance /= total;
            }
        }

        self.trees = trees;
        self.num_features = num_features;
        self.importances = Some(importances);
        Ok(())
    }

    /// Predict targets for a dense feature matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if called before `fit` or on rows of the wrong
    /// width.
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(Error::Pipeline("predict called before fit".to_string()));
        }
        if let Some(row) = x.iter().find(|row| row.len() != self.num_features) {
            return Err(Error::Pipeline(format!(
                "expected {} features per row, got {}",
                self.num_features,
                row.len()
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let tree_count = self.trees.len() as f64;
        Ok(x.iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
                    / tree_count
            })
            .collect())
    }

    /// Normalized per-feature importances; `None` until fitted.
    #[must_use]
    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

fn tree_seed(random_state: u64, tree_idx: usize) -> u64 {
    random_state ^ (tree_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 0 below x = 0.5, y = 10 above
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i) / 40.0]).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|row| if row[0] <= 0.5 { 0.0 } else { 10.0 })
            .collect();
        (x, y)
    }

    fn default_map() -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("n_estimators".to_string(), serde_json::json!(20));
        map.insert("max_depth".to_string(), serde_json::json!(4));
        map.insert("random_state".to_string(), serde_json::json!(42));
        map
    }

    #[test]
    fn test_params_from_map() {
        let params = ForestParams::from_map(&default_map()).unwrap();
        assert_eq!(params.n_estimators, 20);
        assert_eq!(params.max_depth, Some(4));
        assert_eq!(params.random_state, 42);
    }

    #[test]
    fn test_unknown_hyperparameter_rejected() {
        let mut map = default_map();
        map.insert("n_stimators".to_string(), serde_json::json!(10));
        let err = ForestParams::from_map(&map).unwrap_err();
        assert!(matches!(err, Error::UnknownHyperparameter(key) if key == "n_stimators"));
    }

    #[test]
    fn test_invalid_hyperparameter_value_rejected() {
        let mut map = ConfigMap::new();
        map.insert("n_estimators".to_string(), serde_json::json!("many"));
        assert!(matches!(
            ForestParams::from_map(&map),
            Err(Error::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_max_features_policies() {
        assert_eq!(MaxFeatures::All.resolve(9), 9);
        assert_eq!(MaxFeatures::Sqrt.resolve(9), 3);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
        assert_eq!(MaxFeatures::Count(100).resolve(9), 9);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(9), 5);
        // never zero
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(9), 1);
    }

    #[test]
    fn test_fit_learns_step_function() {
        let (x, y) = step_data();
        let mut forest = ForestRegressor::new(ForestParams {
            n_estimators: 20,
            max_depth: Some(4),
            ..ForestParams::default()
        });
        forest.fit(&x, &y).unwrap();
        let predictions = forest.predict(&x).unwrap();
        for (pred, actual) in predictions.iter().zip(&y) {
            assert!(
                (pred - actual).abs() < 3.0,
                "prediction {pred} too far from {actual}"
            );
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 10,
            max_features: MaxFeatures::Sqrt,
            ..ForestParams::default()
        };

        let mut a = ForestRegressor::new(params.clone());
        a.fit(&x, &y).unwrap();
        let mut b = ForestRegressor::new(params);
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_feature_importances_normalized() {
        let (x, y) = step_data();
        // second feature is pure noise
        let x: Vec<Vec<f64>> = x
            .iter()
            .enumerate()
            .map(|(i, row)| vec![row[0], (i % 3) as f64])
            .collect();

        let mut forest = ForestRegressor::new(ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        });
        forest.fit(&x, &y).unwrap();

        let importances = forest.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        let total: f64 = importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_predict_before_fit_errors() {
        let forest = ForestRegressor::new(ForestParams::default());
        assert!(forest.predict(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_fit_rejects_mismatched_lengths() {
        let mut forest = ForestRegressor::new(ForestParams::default());
        assert!(forest.fit(&[vec![1.0], vec![2.0]], &[1.0]).is_err());
    }
}
