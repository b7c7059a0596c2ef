//! File-based experiment tracker
//!
//! A tracker is addressed by a root directory and receives, per run: scalar
//! metrics, named params, key→string tags, and a tree of artifact files.
//! The session is an explicit value threaded through orchestrator calls;
//! there is no ambient process-wide tracker state.
//!
//! ## Layout
//!
//! ```text
//! <root>/<experiment-name>/<run-id>/
//!     meta.json       run lifecycle metadata
//!     metrics.json    metric name -> value
//!     params.json     param name -> value
//!     tags.json       tag name -> string
//!     artifacts/      e.g. model/model.json, analysis/*.csv|json|png
//! ```

mod run_record;

pub use run_record::{RunRecord, RunStatus};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::store::MetricMap;

/// Tracker root used when no URI is configured anywhere.
pub const DEFAULT_TRACKER_ROOT: &str = "runs";

/// Handle to a tracker root plus an experiment namespace within it.
#[derive(Debug, Clone)]
pub struct TrackerSession {
    root: PathBuf,
    experiment_name: String,
}

impl TrackerSession {
    /// Open (creating if needed) a session for `experiment_name` under
    /// `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, experiment_name: impl Into<String>) -> Result<Self> {
        let session = Self {
            root: root.into(),
            experiment_name: experiment_name.into(),
        };
        std::fs::create_dir_all(session.experiment_dir())?;
        Ok(session)
    }

    /// The tracker root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The tracker location as a storable string, recorded on experiment
    /// records so retraining can reuse it.
    #[must_use]
    pub fn uri(&self) -> String {
        self.root.display().to_string()
    }

    fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment_name)
    }

    /// Start a new run, creating its directory tree and initial `meta.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run directory cannot be created.
    pub fn start_run(&self, run_name: Option<&str>) -> Result<ActiveRun> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let record = RunRecord::new(
            run_id.clone(),
            self.experiment_name.clone(),
            run_name.map(str::to_string),
        );
        let dir = self.experiment_dir().join(&run_id);
        std::fs::create_dir_all(dir.join("artifacts"))?;

        let run = ActiveRun {
            dir,
            record,
            params: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        run.write_meta()?;
        tracing::info!(run_id = %run_id, "started tracker run");
        Ok(run)
    }
}

/// A run in progress: the only handle through which run files are written.
#[derive(Debug)]
pub struct ActiveRun {
    dir: PathBuf,
    record: RunRecord,
    params: BTreeMap<String, serde_json::Value>,
    tags: BTreeMap<String, String>,
}

impl ActiveRun {
    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.record.run_id()
    }

    /// Directory holding this run's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the full metric mapping to `metrics.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn log_metrics(&self, metrics: &MetricMap) -> Result<()> {
        write_json(&self.dir.join("metrics.json"), metrics)
    }

    /// Merge params into the run's param mapping and persist `params.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn log_params(&mut self, params: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        for (key, value) in params {
            self.params.insert(key.clone(), value.clone());
        }
        write_json(&self.dir.join("params.json"), &self.params)
    }

    /// Log a single named param.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn log_param(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.params.insert(key.to_string(), value);
        write_json(&self.dir.join("params.json"), &self.params)
    }

    /// Merge tags into the run's tag mapping and persist `tags.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_tags(&mut self, tags: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in tags {
            self.tags.insert(key.clone(), value.clone());
        }
        write_json(&self.dir.join("tags.json"), &self.tags)
    }

    /// Directory for artifacts under the given named artifact path,
    /// created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn artifact_dir(&self, artifact_path: &str) -> Result<PathBuf> {
        let dir = self.dir.join("artifacts").join(artifact_path);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Serialize a value as a JSON artifact file and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn log_json_artifact<T: Serialize>(
        &self,
        artifact_path: &str,
        file_name: &str,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.artifact_dir(artifact_path)?.join(file_name);
        write_json(&path, value)?;
        Ok(path)
    }

    /// Complete the run, finalize `meta.json`, and return the final record.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata write fails.
    pub fn complete(mut self, status: RunStatus) -> Result<RunRecord> {
        self.record.complete(status);
        self.write_meta()?;
        Ok(self.record)
    }

    fn write_meta(&self) -> Result<()> {
        write_json(&self.dir.join("meta.json"), &self.record)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}
