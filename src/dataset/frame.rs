//! Typed in-memory tabular frame
//!
//! A `Frame` holds the parsed dataset: named columns over rows of scalar
//! cells. Cells are typed at parse time (integer, float, or text) and the
//! column-level numeric/categorical classification is derived from them,
//! which is what the pipeline builder consumes.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// One scalar cell of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Integer-valued cell
    Int(i64),
    /// Float-valued cell
    Float(f64),
    /// Free-text cell (categorical data)
    Text(String),
}

impl CellValue {
    /// Parse a raw CSV field into a typed cell.
    ///
    /// Integers are tried first so that `"42"` stays `Int(42)`, then floats,
    /// then everything else is text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(int) = trimmed.parse::<i64>() {
            return Self::Int(int);
        }
        if let Ok(float) = trimmed.parse::<f64>() {
            return Self::Float(float);
        }
        Self::Text(trimmed.to_string())
    }

    /// Numeric view of the cell, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Categorical view of the cell: its textual rendering.
    #[must_use]
    pub fn as_category(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.clone(),
        }
    }

    /// Convert to a JSON-safe scalar for snapshot persistence.
    ///
    /// Integers and finite floats pass through as JSON numbers; a non-finite
    /// float has no JSON number representation and falls back to its string
    /// rendering.
    #[must_use]
    pub fn to_portable(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or_else(|| serde_json::Value::from(v.to_string()), serde_json::Value::Number),
            Self::Text(v) => serde_json::Value::from(v.clone()),
        }
    }
}

/// A parsed tabular dataset: named columns over rows of typed cells.
#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Frame {
    /// Build a frame from a header and pre-parsed rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dataset`] if any row width differs from the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::Dataset(format!(
                    "row {} has {} cells, expected {}",
                    idx,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Read a delimited file into a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has no header, or
    /// contains ragged rows.
    pub fn from_delimited_path<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path.as_ref())?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_matches('"').to_string())
            .collect();
        if columns.is_empty() {
            return Err(Error::Dataset("dataset has no header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Vec<CellValue> = record
                .iter()
                .map(|field| CellValue::parse(field.trim_matches('"')))
                .collect();
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(Error::Dataset("dataset has no data rows".to_string()));
        }

        Self::new(columns, rows)
    }

    /// Column names, in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Borrow the raw rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether the frame contains a column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Columns where every cell is numeric.
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.rows.iter().all(|row| row[*idx].as_f64().is_some()))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Columns with at least one non-numeric cell.
    #[must_use]
    pub fn categorical_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.rows.iter().any(|row| row[*idx].as_f64().is_none()))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// All values of a numeric column, or `None` if the column is missing or
    /// contains a non-numeric cell.
    #[must_use]
    pub fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|row| row[idx].as_f64()).collect()
    }

    /// All values of a column rendered as category strings.
    #[must_use]
    pub fn category_column(&self, name: &str) -> Option<Vec<String>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_category()).collect())
    }

    /// Split off the target column, returning the feature frame and target
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] if the target is absent, or
    /// [`Error::Dataset`] if a target cell is not numeric.
    pub fn split_target(&self, target: &str) -> Result<(Self, Vec<f64>)> {
        let target_idx = self
            .column_index(target)
            .ok_or_else(|| Error::MissingColumn(target.to_string()))?;

        let mut targets = Vec::with_capacity(self.rows.len());
        let mut feature_rows = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let value = row[target_idx].as_f64().ok_or_else(|| {
                Error::Dataset(format!(
                    "target column '{target}' has a non-numeric value at row {row_idx}"
                ))
            })?;
            targets.push(value);

            let features: Vec<CellValue> = row
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != target_idx)
                .map(|(_, cell)| cell.clone())
                .collect();
            feature_rows.push(features);
        }

        let feature_columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.as_str() != target)
            .cloned()
            .collect();

        Ok((Self::new(feature_columns, feature_rows)?, targets))
    }

    /// New frame containing only the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Per-row feature mappings with JSON-safe scalar values, for snapshot
    /// persistence.
    #[must_use]
    pub fn feature_maps(&self) -> Vec<BTreeMap<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.clone(), cell.to_portable()))
                    .collect()
            })
            .collect()
    }
}
