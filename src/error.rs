//! Error types for estudio
//!
//! One taxonomy for the whole harness: configuration errors, retrieval
//! errors, store errors, and integrity/security errors. Nothing is silently
//! retried; every failure propagates to the entry point.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Estudio error types
#[derive(Error, Debug)]
pub enum Error {
    /// Required column absent from the loaded dataset
    #[error("target column '{0}' not found in dataset")]
    MissingColumn(String),

    /// Invalid CLI or orchestrator configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed dataset contents (ragged rows, empty file, bad header)
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Dataset unreachable after the fallback path was exhausted
    #[error("{0}\nYou can place 'student-mat.csv' in the '.data' directory manually.")]
    Retrieval(String),

    /// Lookup by id found no experiment row
    #[error("experiment with id={0} not found")]
    ExperimentNotFound(i64),

    /// Latest-experiment query against an empty store
    #[error("no experiments found in the store")]
    NoExperiments,

    /// Snapshot batch insert called with mismatched sequence lengths
    #[error("dataset split insert rejected: {feature_rows} feature rows but {target_values} target values")]
    SplitLengthMismatch {
        /// Number of feature rows passed
        feature_rows: usize,
        /// Number of target values passed
        target_values: usize,
    },

    /// Hyperparameter key the regressor does not recognize
    #[error("unknown hyperparameter key: '{0}'")]
    UnknownHyperparameter(String),

    /// Hyperparameter value with the wrong type or an out-of-range value
    #[error("invalid hyperparameter '{key}': {reason}")]
    InvalidHyperparameter {
        /// The offending key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Pipeline misuse (e.g. predict before fit) or fit-time failure
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// One or more integrity/security checks failed; every violation is listed
    #[error("security checks failed:\n- {}", .violations.join("\n- "))]
    Integrity {
        /// All violations found, not just the first
        violations: Vec<String>,
    },

    /// Tracker session or run bookkeeping failure
    #[error("tracker error: {0}")]
    Tracker(String),

    /// Chart rendering failure
    #[error("plot error: {0}")]
    Plot(String),

    /// SQLite error from the experiment store
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error during dataset download
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Zip archive error during the fallback download path
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// CSV parse/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_error_lists_every_violation() {
        let err = Error::Integrity {
            violations: vec!["first problem".to_string(), "second problem".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("first problem"));
        assert!(message.contains("second problem"));
    }

    #[test]
    fn test_retrieval_error_names_remediation() {
        let err = Error::Retrieval("unable to download the dataset".to_string());
        assert!(err.to_string().contains(".data"));
    }
}
