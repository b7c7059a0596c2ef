//! Fairness scan: per-group regression metrics for a sensitive feature
//!
//! Trains the same pipeline as the training orchestrator, then evaluates the
//! test fold grouped by a sensitive feature column (per-group MAE and R²,
//! plus the largest between-group MAE gap). A failed scan writes an error
//! payload to the expected output location instead of crashing the process.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::dataset::{self, TARGET_COLUMN};
use crate::error::{Error, Result};
use crate::metrics::{mean_absolute_error, r2_score};
use crate::pipeline::build_pipeline;
use crate::run::default_hyperparameters;
use crate::split::train_test_split;

/// Configuration for one fairness scan, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct FairnessConfig {
    /// Dataset path (preferred) or URL.
    pub dataset: String,
    /// Column to group fairness metrics by.
    pub sensitive_feature: String,
    /// Where the JSON report (or error payload) is written.
    pub output: PathBuf,
    /// Fraction of rows held out for evaluation.
    pub test_size: f64,
    /// Seed for splitting and the model.
    pub random_state: u64,
}

/// Metrics for one group of test rows.
#[derive(Debug, Clone, Serialize)]
pub struct GroupMetrics {
    /// Number of test rows in the group.
    pub count: usize,
    /// Mean absolute error within the group.
    pub mae: f64,
    /// Coefficient of determination within the group.
    pub r2: f64,
}

/// Successful scan report.
#[derive(Debug, Serialize)]
pub struct FairnessReport {
    /// When the scan ran.
    pub generated_at: chrono::DateTime<Utc>,
    /// Dataset the scan ran against.
    pub dataset: String,
    /// The grouping column.
    pub sensitive_feature: String,
    /// Metrics over the whole test fold.
    pub overall: GroupMetrics,
    /// Metrics per sensitive-feature group.
    pub groups: BTreeMap<String, GroupMetrics>,
    /// Largest between-group MAE difference.
    pub mae_gap: f64,
}

/// Outcome of a scan entry point: a report, or a captured failure whose
/// payload was written to the output location.
#[derive(Debug)]
pub enum FairnessScanOutcome {
    /// Scan completed; report written to the output path.
    Completed(FairnessReport),
    /// Scan failed; error payload written to the output path.
    Failed {
        /// The failure message captured in the payload.
        error: String,
    },
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    generated_at: chrono::DateTime<Utc>,
    dataset: &'a str,
    sensitive_feature: &'a str,
    error: &'a str,
}

/// Run the scan, writing either the report or an error payload to the
/// configured output path.
///
/// # Errors
///
/// Returns an error only when the output payload itself cannot be written;
/// scan failures are captured as [`FairnessScanOutcome::Failed`].
pub fn run_fairness_scan(config: &FairnessConfig) -> Result<FairnessScanOutcome> {
    match scan(config) {
        Ok(report) => {
            std::fs::write(&config.output, serde_json::to_string_pretty(&report)?)?;
            tracing::info!(path = %config.output.display(), "fairness report written");
            Ok(FairnessScanOutcome::Completed(report))
        }
        Err(err) => {
            let message = err.to_string();
            let payload = ErrorPayload {
                generated_at: Utc::now(),
                dataset: &config.dataset,
                sensitive_feature: &config.sensitive_feature,
                error: &message,
            };
            std::fs::write(&config.output, serde_json::to_string_pretty(&payload)?)?;
            tracing::warn!(error = %message, "fairness scan failed; error payload written");
            Ok(FairnessScanOutcome::Failed { error: message })
        }
    }
}

fn scan(config: &FairnessConfig) -> Result<FairnessReport> {
    let frame = dataset::load_dataset(&config.dataset)?;
    let (features, targets) = frame.split_target(TARGET_COLUMN)?;

    if !features.has_column(&config.sensitive_feature) {
        return Err(Error::Config(format!(
            "sensitive feature '{}' not found in dataset",
            config.sensitive_feature
        )));
    }

    let mut pipeline = build_pipeline(
        features.numeric_columns(),
        features.categorical_columns(),
        &default_hyperparameters(config.random_state),
    )?;

    let (train_idx, test_idx) =
        train_test_split(features.num_rows(), config.test_size, config.random_state)?;
    let train_frame = features.select_rows(&train_idx);
    let test_frame = features.select_rows(&test_idx);
    let y_train: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();
    let y_test: Vec<f64> = test_idx.iter().map(|&i| targets[i]).collect();

    pipeline.fit(&train_frame, &y_train)?;
    let predictions = pipeline.predict(&test_frame)?;

    let group_labels = test_frame
        .category_column(&config.sensitive_feature)
        .ok_or_else(|| {
            Error::Config(format!(
                "sensitive feature '{}' unusable for grouping",
                config.sensitive_feature
            ))
        })?;

    let mut grouped: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for ((label, actual), predicted) in group_labels.iter().zip(&y_test).zip(&predictions) {
        let entry = grouped.entry(label.clone()).or_default();
        entry.0.push(*actual);
        entry.1.push(*predicted);
    }

    let groups: BTreeMap<String, GroupMetrics> = grouped
        .into_iter()
        .map(|(label, (actual, predicted))| {
            (
                label,
                GroupMetrics {
                    count: actual.len(),
                    mae: mean_absolute_error(&actual, &predicted),
                    r2: r2_score(&actual, &predicted),
                },
            )
        })
        .collect();

    let mae_values: Vec<f64> = groups.values().map(|g| g.mae).collect();
    let mae_gap = mae_values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - mae_values.iter().copied().fold(f64::INFINITY, f64::min);

    Ok(FairnessReport {
        generated_at: Utc::now(),
        dataset: config.dataset.clone(),
        sensitive_feature: config.sensitive_feature.clone(),
        overall: GroupMetrics {
            count: y_test.len(),
            mae: mean_absolute_error(&y_test, &predictions),
            r2: r2_score(&y_test, &predictions),
        },
        groups,
        mae_gap,
    })
}
