//! Reporting - diagnostic artifacts derived from fit results
//!
//! A pure function of the fitted pipeline, both folds' actual/predicted
//! values, and the computed metrics. Emits a predictions+residuals table, a
//! residual summary, diagnostic charts, and (when the capability queries
//! allow it) a top-N feature-importance table and chart.
//!
//! Optional artifacts never crash a run: any value mismatch (missing
//! importances, missing output names, length disagreement) degrades to an
//! explicit [`ArtifactStatus::Omitted`] outcome.

mod plots;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::metrics::SummaryStats;
use crate::pipeline::Pipeline;
use crate::store::MetricMap;
use crate::tracker::ActiveRun;

/// Number of features shown in the importance table and chart.
pub const TOP_FEATURES: usize = 20;

/// Histogram bin count for the residual distribution chart.
const HISTOGRAM_BINS: usize = 20;

/// Outcome of one artifact: written to a path, or omitted with a reason.
///
/// Distinguishes "artifact not applicable" from fatal errors, which
/// propagate as [`crate::Error`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// The artifact was produced at this path.
    Written(PathBuf),
    /// The artifact was skipped.
    Omitted {
        /// Which artifact was skipped
        artifact: String,
        /// Why it was skipped
        reason: String,
    },
}

/// One fold's actual values and model predictions.
#[derive(Debug, Clone, Copy)]
pub struct FoldData<'a> {
    /// Ground-truth target values
    pub actual: &'a [f64],
    /// Model predictions for the same rows
    pub predicted: &'a [f64],
}

impl FoldData<'_> {
    fn residuals(&self) -> Vec<f64> {
        self.actual
            .iter()
            .zip(self.predicted.iter())
            .map(|(a, p)| a - p)
            .collect()
    }
}

#[derive(Serialize)]
struct ReportSummary<'a> {
    metrics: &'a MetricMap,
    train_residuals: &'a SummaryStats,
    test_residuals: &'a SummaryStats,
}

/// Generate diagnostic artifacts under the run's named artifact path.
///
/// Returns the per-artifact outcomes in emission order.
///
/// # Errors
///
/// Returns an error on IO/serialization failures; optional-artifact value
/// mismatches are reported as `Omitted`, not errors.
pub fn log_regression_artifacts(
    run: &mut ActiveRun,
    pipeline: &Pipeline,
    train: FoldData<'_>,
    test: FoldData<'_>,
    metrics: &MetricMap,
    artifact_path: &str,
    tags: &BTreeMap<String, String>,
) -> Result<Vec<ArtifactStatus>> {
    if !tags.is_empty() {
        run.set_tags(tags)?;
    }

    let dir = run.artifact_dir(artifact_path)?;
    let mut outcomes = Vec::new();

    let residuals_train = train.residuals();
    let residuals_test = test.residuals();

    let predictions_path = dir.join("predictions.csv");
    write_predictions_table(&predictions_path, train, test, &residuals_train, &residuals_test)?;
    outcomes.push(ArtifactStatus::Written(predictions_path));

    match (
        SummaryStats::from_values(&residuals_train),
        SummaryStats::from_values(&residuals_test),
    ) {
        (Some(train_summary), Some(test_summary)) => {
            let summary_path = dir.join("summary.json");
            let summary = ReportSummary {
                metrics,
                train_residuals: &train_summary,
                test_residuals: &test_summary,
            };
            std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
            outcomes.push(ArtifactStatus::Written(summary_path));
        }
        _ => outcomes.push(ArtifactStatus::Omitted {
            artifact: "summary.json".to_string(),
            reason: "empty fold".to_string(),
        }),
    }

    let scatter_path = dir.join("actual_vs_predicted_test.png");
    plots::actual_vs_predicted(
        &scatter_path,
        "Actual vs Predicted (Test)",
        test.actual,
        test.predicted,
    )?;
    outcomes.push(ArtifactStatus::Written(scatter_path));

    let residual_path = dir.join("residuals_vs_prediction_test.png");
    plots::residual_scatter(
        &residual_path,
        "Residuals vs Prediction (Test)",
        test.predicted,
        &residuals_test,
    )?;
    outcomes.push(ArtifactStatus::Written(residual_path));

    let histogram_path = dir.join("residual_distribution_test.png");
    plots::residual_histogram(
        &histogram_path,
        "Residual Distribution (Test)",
        &residuals_test,
        HISTOGRAM_BINS,
    )?;
    outcomes.push(ArtifactStatus::Written(histogram_path));

    match collect_feature_importance(pipeline, TOP_FEATURES) {
        Ok(top_features) => {
            let table_path = dir.join("top_feature_importances.csv");
            write_importance_table(&table_path, &top_features)?;
            outcomes.push(ArtifactStatus::Written(table_path));

            let chart_path = dir.join("top_feature_importances.png");
            plots::importance_bar_chart(&chart_path, "Top Feature Importances", &top_features)?;
            outcomes.push(ArtifactStatus::Written(chart_path));
        }
        Err(reason) => {
            outcomes.push(ArtifactStatus::Omitted {
                artifact: "top_feature_importances".to_string(),
                reason,
            });
        }
    }

    Ok(outcomes)
}

/// Resolve the top-N `(feature, importance)` pairs, or the reason they are
/// unavailable.
fn collect_feature_importance(
    pipeline: &Pipeline,
    top_n: usize,
) -> std::result::Result<Vec<(String, f64)>, String> {
    let importances = pipeline
        .feature_importances()
        .ok_or_else(|| "regressor exposes no feature importances".to_string())?;
    let names = pipeline
        .output_feature_names()
        .ok_or_else(|| "preprocessor exposes no output feature names".to_string())?;
    if names.len() != importances.len() {
        return Err(format!(
            "importances length {} does not match feature-name count {}",
            importances.len(),
            names.len()
        ));
    }

    let mut entries: Vec<(String, f64)> = names.into_iter().zip(importances.iter().copied()).collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(top_n);
    Ok(entries)
}

fn write_predictions_table(
    path: &std::path::Path,
    train: FoldData<'_>,
    test: FoldData<'_>,
    residuals_train: &[f64],
    residuals_test: &[f64],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["set", "actual", "prediction", "residual"])?;
    for ((actual, predicted), residual) in train
        .actual
        .iter()
        .zip(train.predicted.iter())
        .zip(residuals_train.iter())
    {
        writer.write_record([
            "train".to_string(),
            actual.to_string(),
            predicted.to_string(),
            residual.to_string(),
        ])?;
    }
    for ((actual, predicted), residual) in test
        .actual
        .iter()
        .zip(test.predicted.iter())
        .zip(residuals_test.iter())
    {
        writer.write_record([
            "test".to_string(),
            actual.to_string(),
            predicted.to_string(),
            residual.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_importance_table(path: &std::path::Path, entries: &[(String, f64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["feature", "importance"])?;
    for (feature, importance) in entries {
        writer.write_record([feature.clone(), importance.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, Frame};
    use crate::pipeline::build_pipeline;
    use crate::store::ConfigMap;
    use crate::tracker::TrackerSession;

    fn fitted_pipeline() -> (Pipeline, Vec<f64>, Vec<f64>) {
        let rows: Vec<Vec<CellValue>> = (0..20).map(|i| vec![CellValue::Int(i)]).collect();
        let frame = Frame::new(vec!["age".to_string()], rows).unwrap();
        let targets: Vec<f64> = (0..20).map(f64::from).collect();

        let mut map = ConfigMap::new();
        map.insert("n_estimators".to_string(), serde_json::json!(5));
        let mut pipeline = build_pipeline(vec!["age".to_string()], vec![], &map).unwrap();
        pipeline.fit(&frame, &targets).unwrap();
        let predictions = pipeline.predict(&frame).unwrap();
        (pipeline, targets, predictions)
    }

    #[test]
    fn test_all_artifacts_written_for_fitted_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let session = TrackerSession::open(root.path(), "report-test").unwrap();
        let mut run = session.start_run(None).unwrap();

        let (pipeline, targets, predictions) = fitted_pipeline();
        let fold = FoldData {
            actual: &targets,
            predicted: &predictions,
        };
        let outcomes = log_regression_artifacts(
            &mut run,
            &pipeline,
            fold,
            fold,
            &MetricMap::new(),
            "analysis",
            &BTreeMap::new(),
        )
        .unwrap();

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, ArtifactStatus::Written(_))));
        assert!(run
            .dir()
            .join("artifacts/analysis/predictions.csv")
            .exists());
        assert!(run.dir().join("artifacts/analysis/summary.json").exists());
        assert!(run
            .dir()
            .join("artifacts/analysis/top_feature_importances.csv")
            .exists());
    }

    #[test]
    fn test_importances_omitted_for_unfitted_regressor() {
        let root = tempfile::tempdir().unwrap();
        let session = TrackerSession::open(root.path(), "report-test").unwrap();
        let mut run = session.start_run(None).unwrap();

        // Built but never fitted: capability queries return None
        let pipeline = build_pipeline(vec!["age".to_string()], vec![], &ConfigMap::new()).unwrap();
        let actual = [1.0, 2.0, 3.0];
        let predicted = [1.1, 1.9, 3.2];
        let fold = FoldData {
            actual: &actual,
            predicted: &predicted,
        };

        let outcomes = log_regression_artifacts(
            &mut run,
            &pipeline,
            fold,
            fold,
            &MetricMap::new(),
            "analysis",
            &BTreeMap::new(),
        )
        .unwrap();

        assert!(outcomes.iter().any(|o| matches!(
            o,
            ArtifactStatus::Omitted { artifact, .. } if artifact == "top_feature_importances"
        )));
        assert!(!run
            .dir()
            .join("artifacts/analysis/top_feature_importances.csv")
            .exists());
    }

    #[test]
    fn test_top_features_sorted_descending() {
        let (pipeline, _, _) = fitted_pipeline();
        let entries = collect_feature_importance(&pipeline, 20).unwrap();
        for window in entries.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
    }
}
