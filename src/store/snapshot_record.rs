//! Dataset Snapshot Row - one feature/target row as seen by an experiment

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The train or test partition of a dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Rows the pipeline was fitted on.
    Train,
    /// Held-out evaluation rows.
    Test,
}

impl Split {
    /// Stable storage label for the split.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            other => Err(Error::Dataset(format!("unknown split label '{other}'"))),
        }
    }
}

/// One feature/target row persisted for a specific experiment's fold.
///
/// Rows belong to exactly one experiment (cascade-deleted with it) and are
/// identified by `(experiment_id, split, row_index)`. Feature values are
/// JSON-safe scalars; see `CellValue::to_portable`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetSnapshotRow {
    experiment_id: i64,
    split: Split,
    row_index: i64,
    features: BTreeMap<String, serde_json::Value>,
    target: Option<f64>,
    created_at: DateTime<Utc>,
}

impl DatasetSnapshotRow {
    pub(crate) const fn from_parts(
        experiment_id: i64,
        split: Split,
        row_index: i64,
        features: BTreeMap<String, serde_json::Value>,
        target: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_id,
            split,
            row_index,
            features,
            target,
            created_at,
        }
    }

    /// Id of the owning experiment.
    #[must_use]
    pub const fn experiment_id(&self) -> i64 {
        self.experiment_id
    }

    /// Which fold the row belongs to.
    #[must_use]
    pub const fn split(&self) -> Split {
        self.split
    }

    /// Zero-based position within the fold.
    #[must_use]
    pub const fn row_index(&self) -> i64 {
        self.row_index
    }

    /// Feature mapping (column name to JSON-safe scalar).
    #[must_use]
    pub const fn features(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.features
    }

    /// Target value, if the row had one.
    #[must_use]
    pub const fn target(&self) -> Option<f64> {
        self.target
    }

    /// Insertion timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trips_through_labels() {
        assert_eq!(Split::from_str("train").unwrap(), Split::Train);
        assert_eq!(Split::from_str("test").unwrap(), Split::Test);
        assert_eq!(Split::Train.to_string(), "train");
    }

    #[test]
    fn test_unknown_split_label_rejected() {
        assert!(Split::from_str("validation").is_err());
    }
}
