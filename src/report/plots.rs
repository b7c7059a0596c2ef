//! Diagnostic chart rendering
//!
//! Bitmap charts for the reporting component: actual-vs-predicted scatter,
//! residual scatter, residual histogram, and the top-feature-importance bar
//! chart. Chart errors are surfaced as [`Error::Plot`].

use std::error::Error as StdError;
use std::path::Path;

use plotters::prelude::*;

use crate::error::{Error, Result};

type RenderResult = std::result::Result<(), Box<dyn StdError>>;

fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min.is_finite() && max.is_finite() && (max - min) > f64::EPSILON {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    } else {
        (min - 1.0, max + 1.0)
    }
}

/// Actual-vs-predicted scatter with the identity diagonal.
pub(crate) fn actual_vs_predicted(
    path: &Path,
    title: &str,
    actual: &[f64],
    predicted: &[f64],
) -> Result<()> {
    render_actual_vs_predicted(path, title, actual, predicted)
        .map_err(|e| Error::Plot(e.to_string()))
}

fn render_actual_vs_predicted(
    path: &Path,
    title: &str,
    actual: &[f64],
    predicted: &[f64],
) -> RenderResult {
    let all: Vec<f64> = actual.iter().chain(predicted.iter()).copied().collect();
    let (lo, hi) = padded_range(&all);

    let root = BitMapBackend::new(path, (900, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, lo..hi)?;
    chart
        .configure_mesh()
        .x_desc("Actual")
        .y_desc("Predicted")
        .draw()?;

    chart.draw_series(
        actual
            .iter()
            .zip(predicted.iter())
            .map(|(&a, &p)| Circle::new((a, p), 3, BLUE.mix(0.6).filled())),
    )?;
    chart.draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], RED.stroke_width(1)))?;

    root.present()?;
    Ok(())
}

/// Residuals against predictions, with a zero reference line.
pub(crate) fn residual_scatter(
    path: &Path,
    title: &str,
    predicted: &[f64],
    residuals: &[f64],
) -> Result<()> {
    render_residual_scatter(path, title, predicted, residuals)
        .map_err(|e| Error::Plot(e.to_string()))
}

fn render_residual_scatter(
    path: &Path,
    title: &str,
    predicted: &[f64],
    residuals: &[f64],
) -> RenderResult {
    let (x_lo, x_hi) = padded_range(predicted);
    let (y_lo, y_hi) = padded_range(residuals);

    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_desc("Predicted")
        .y_desc("Residual (Actual - Predicted)")
        .draw()?;

    chart.draw_series(
        predicted
            .iter()
            .zip(residuals.iter())
            .map(|(&p, &r)| Circle::new((p, r), 3, BLUE.mix(0.6).filled())),
    )?;
    chart.draw_series(LineSeries::new(
        vec![(x_lo, 0.0), (x_hi, 0.0)],
        RED.stroke_width(1),
    ))?;

    root.present()?;
    Ok(())
}

/// Residual distribution histogram.
pub(crate) fn residual_histogram(
    path: &Path,
    title: &str,
    residuals: &[f64],
    bins: usize,
) -> Result<()> {
    render_residual_histogram(path, title, residuals, bins)
        .map_err(|e| Error::Plot(e.to_string()))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn render_residual_histogram(
    path: &Path,
    title: &str,
    residuals: &[f64],
    bins: usize,
) -> RenderResult {
    let (lo, hi) = padded_range(residuals);
    let bins = bins.max(1);
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0u32; bins];
    for &value in residuals {
        let bin = (((value - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0);

    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0u32..max_count + 1)?;
    chart
        .configure_mesh()
        .x_desc("Residual")
        .y_desc("Frequency")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
        let left = lo + width * i as f64;
        Rectangle::new(
            [(left, 0), (left + width, count)],
            BLUE.mix(0.75).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Horizontal bar chart of the top feature importances, highest on top.
pub(crate) fn importance_bar_chart(
    path: &Path,
    title: &str,
    entries: &[(String, f64)],
) -> Result<()> {
    render_importance_bar_chart(path, title, entries).map_err(|e| Error::Plot(e.to_string()))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn render_importance_bar_chart(
    path: &Path,
    title: &str,
    entries: &[(String, f64)],
) -> RenderResult {
    let max_importance = entries.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let height = 200 + 28 * entries.len() as u32;

    let root = BitMapBackend::new(path, (900, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(160)
        .build_cartesian_2d(0.0..max_importance * 1.05, 0.0..entries.len() as f64)?;
    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc("Importance")
        .y_labels(entries.len())
        .y_label_formatter(&|y| {
            // Highest-importance entry drawn at the top
            let idx = y.floor() as usize;
            entries
                .get(entries.len().saturating_sub(idx + 1))
                .map_or_else(String::new, |(name, _)| name.clone())
        })
        .draw()?;

    chart.draw_series(entries.iter().enumerate().map(|(i, (_, importance))| {
        let row = (entries.len() - 1 - i) as f64;
        Rectangle::new(
            [(0.0, row + 0.15), (*importance, row + 0.85)],
            BLUE.filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}
