//! Experiment Store - durable SQLite log of training runs
//!
//! The store owns two relations and is their sole writer; every other
//! component treats fetched records as read-only.
//!
//! ## Schema Overview
//!
//! ```text
//! experiments (1) ──< dataset_snapshots (N)
//!                         └─ indexed by (experiment_id, split)
//! ```
//!
//! Mapping fields (`hyperparameters`, `train_config`, `metrics`) are stored
//! as JSON text with sorted keys, so identical configurations serialize to
//! identical text regardless of key insertion order. Records are never
//! updated in place: retraining inserts a new row whose `train_config`
//! points back at the origin record.
//!
//! ## Durability
//!
//! Connections run in WAL journal mode and snapshot batches are written in
//! one transaction, so a crash mid-batch never leaves a partial split
//! visible after recovery.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estudio::store::{ExperimentDb, NewExperiment, Split};
//! use std::collections::BTreeMap;
//!
//! let mut db = ExperimentDb::open("experiments.db")?;
//! let id = db.insert_experiment(NewExperiment::new(
//!     "RandomForestRegressor",
//!     BTreeMap::new(),
//!     BTreeMap::new(),
//! ))?;
//! let written = db.insert_dataset_split(id, Split::Train, &[BTreeMap::new()], &[12.0])?;
//! assert_eq!(written, 1);
//! # Ok::<(), estudio::Error>(())
//! ```

mod experiment_record;
mod snapshot_record;

pub use experiment_record::{ConfigMap, ExperimentRecord, MetricMap, NewExperiment};
pub use snapshot_record::{DatasetSnapshotRow, Split};

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_type TEXT NOT NULL,
    hyperparameters TEXT NOT NULL,
    train_config TEXT NOT NULL,
    created_at TEXT NOT NULL,
    tracking_run_id TEXT,
    tracking_uri TEXT,
    metrics TEXT,
    data_source TEXT,
    notes TEXT
);

CREATE TABLE IF NOT EXISTS dataset_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
    split TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    features TEXT NOT NULL,
    target REAL,
    created_at TEXT NOT NULL,
    UNIQUE (experiment_id, split, row_index)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_experiment_split
    ON dataset_snapshots (experiment_id, split);
";

const EXPERIMENT_COLUMNS: &str = "id, model_type, hyperparameters, train_config, created_at, \
     tracking_run_id, tracking_uri, metrics, data_source, notes";

/// Durable, queryable log of every training run's configuration and outcome.
#[derive(Debug)]
pub struct ExperimentDb {
    conn: Connection,
}

impl ExperimentDb {
    /// Open (creating if necessary) the store at `path` and ensure the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the DDL fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self::from_connection(conn)?;
        db.ensure_schema()?;
        Ok(db)
    }

    /// Open an existing store without running the schema DDL.
    ///
    /// Used by the audit entry point, which must be able to observe a store
    /// that is missing expected tables instead of silently creating them.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Integrity {
                violations: vec![format!("SQLite database missing: {}", path.display())],
            });
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema DDL fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self::from_connection(conn)?;
        db.ensure_schema()?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Idempotently create both relations and the supporting index.
    ///
    /// Safe to call before every other operation and under concurrent
    /// callers; `CREATE ... IF NOT EXISTS` makes re-runs no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_DDL)?;
        Ok(())
    }

    /// Insert a new experiment row and return its assigned id.
    ///
    /// Mapping fields are serialized with sorted keys and `created_at` is
    /// stamped with the current UTC time. Existing rows are never mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub fn insert_experiment(&self, new: NewExperiment) -> Result<i64> {
        self.ensure_schema()?;
        let created_at = Utc::now().to_rfc3339();
        let metrics_json = new
            .metrics_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO experiments (
                model_type, hyperparameters, train_config, created_at,
                tracking_run_id, tracking_uri, metrics, data_source, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.model_type(),
                serde_json::to_string(new.hyperparameters_ref())?,
                serde_json::to_string(new.train_config_ref())?,
                created_at,
                new.tracking_run_id_ref(),
                new.tracking_uri_ref(),
                metrics_json,
                new.data_source_ref(),
                new.notes_ref(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch the most recently created experiment.
    ///
    /// Ties on `created_at` (possible at timestamp granularity) are broken
    /// by the higher id, so the latest insert always wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExperiments`] when the store is empty.
    pub fn fetch_latest_experiment(&self) -> Result<ExperimentRecord> {
        self.ensure_schema()?;
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {EXPERIMENT_COLUMNS} FROM experiments \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                [],
                read_experiment_row,
            )
            .optional()?;
        raw.map_or(Err(Error::NoExperiments), parse_experiment)
    }

    /// Fetch a specific experiment by its primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] when no row matches.
    pub fn fetch_experiment_by_id(&self, experiment_id: i64) -> Result<ExperimentRecord> {
        self.ensure_schema()?;
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE id = ?1"),
                params![experiment_id],
                read_experiment_row,
            )
            .optional()?;
        raw.map_or(Err(Error::ExperimentNotFound(experiment_id)), parse_experiment)
    }

    /// Persist one fold of the dataset as seen by an experiment.
    ///
    /// Feature rows and target values are paired positionally and
    /// `row_index` is the zero-based input position. The whole batch is
    /// written in a single transaction: a crash or error leaves either all
    /// rows or none.
    ///
    /// Length mismatch between the two sequences is an error, not a silent
    /// truncation. A missing parent experiment surfaces as a foreign-key
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SplitLengthMismatch`] on mismatched inputs, or a
    /// store error on constraint violations.
    pub fn insert_dataset_split(
        &mut self,
        experiment_id: i64,
        split: Split,
        feature_rows: &[BTreeMap<String, serde_json::Value>],
        target_values: &[f64],
    ) -> Result<usize> {
        if feature_rows.len() != target_values.len() {
            return Err(Error::SplitLengthMismatch {
                feature_rows: feature_rows.len(),
                target_values: target_values.len(),
            });
        }
        self.ensure_schema()?;

        let created_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dataset_snapshots (
                    experiment_id, split, row_index, features, target, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (row_index, (features, target)) in
                feature_rows.iter().zip(target_values.iter()).enumerate()
            {
                stmt.execute(params![
                    experiment_id,
                    split.as_str(),
                    row_index as i64,
                    serde_json::to_string(features)?,
                    target,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(feature_rows.len())
    }

    /// Read back one fold's snapshot rows, ordered by `row_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row deserialization fails.
    pub fn fetch_split_rows(
        &self,
        experiment_id: i64,
        split: Split,
    ) -> Result<Vec<DatasetSnapshotRow>> {
        self.ensure_schema()?;
        let mut stmt = self.conn.prepare(
            "SELECT experiment_id, split, row_index, features, target, created_at \
             FROM dataset_snapshots WHERE experiment_id = ?1 AND split = ?2 \
             ORDER BY row_index ASC",
        )?;
        let raw_rows = stmt
            .query_map(params![experiment_id, split.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, DateTime<Utc>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw_rows
            .into_iter()
            .map(|(exp_id, split_label, row_index, features, target, created_at)| {
                Ok(DatasetSnapshotRow::from_parts(
                    exp_id,
                    split_label.parse()?,
                    row_index,
                    serde_json::from_str(&features)?,
                    target,
                    created_at,
                ))
            })
            .collect()
    }

    /// Per-split snapshot row totals across all experiments.
    ///
    /// # Errors
    ///
    /// Returns an error if the `dataset_snapshots` relation is absent (the
    /// audit entry point treats that as a finding) or the query fails.
    pub fn split_row_counts(&self) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT split, COUNT(*) FROM dataset_snapshots GROUP BY split")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;
        Ok(counts)
    }

    /// Whether a table with the given name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

type RawExperiment = (
    i64,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_experiment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExperiment> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn parse_experiment(raw: RawExperiment) -> Result<ExperimentRecord> {
    let (
        id,
        model_type,
        hyperparameters,
        train_config,
        created_at,
        tracking_run_id,
        tracking_uri,
        metrics,
        data_source,
        notes,
    ) = raw;
    Ok(ExperimentRecord::from_parts(
        id,
        model_type,
        serde_json::from_str(&hyperparameters)?,
        serde_json::from_str(&train_config)?,
        created_at,
        tracking_run_id,
        tracking_uri,
        metrics.as_deref().map(serde_json::from_str).transpose()?,
        data_source,
        notes,
    ))
}
