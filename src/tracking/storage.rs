//! Storage backend for experiment tracking
//!
//! Runs are stored one directory per run:
//! `<base_dir>/<experiment>/<run_id>/run.json` with artifacts under
//! `<run_id>/artifacts/`.

use super::tracker::Run;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const RUN_FILE: &str = "run.json";

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn experiment_dir(&self, experiment: &str) -> PathBuf {
        self.base_dir.join(experiment)
    }

    pub fn run_dir(&self, experiment: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment).join(run_id)
    }

    pub fn artifact_dir(&self, experiment: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment, run_id).join("artifacts")
    }

    /// Write a run's metadata, replacing any earlier version
    pub fn save_run(&self, run: &Run) -> Result<PathBuf> {
        let dir = self.run_dir(&run.experiment, &run.run_id);
        fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::Tracking(format!("failed to create {}: {}", dir.display(), e)))?;
        let path = dir.join(RUN_FILE);
        let json = serde_json::to_string_pretty(run)?;
        fs::write(&path, json)
            .map_err(|e| PipelineError::Tracking(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    pub fn load_run(&self, experiment: &str, run_id: &str) -> Result<Run> {
        let path = self.run_dir(experiment, run_id).join(RUN_FILE);
        let json = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Tracking(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load every run of an experiment, oldest first.
    ///
    /// Directories without a readable `run.json` are skipped with a warning.
    pub fn load_runs(&self, experiment: &str) -> Result<Vec<Run>> {
        let dir = self.experiment_dir(experiment);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path().join(RUN_FILE);
            if !path.is_file() {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(PipelineError::from)
                .and_then(|json| serde_json::from_str::<Run>(&json).map_err(PipelineError::from));
            match parsed {
                Ok(run) => runs.push(run),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run"),
            }
        }
        runs.sort_by_key(|run| run.start_time);
        Ok(runs)
    }

    /// Remove a run and its artifacts
    pub fn delete_run(&self, experiment: &str, run_id: &str) -> Result<()> {
        let dir = self.run_dir(experiment, run_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| PipelineError::Tracking(format!("failed to delete run {}: {}", run_id, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::RunStatus;

    #[test]
    fn test_save_and_load_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut run = Run::new("house-prices", Some("baseline"));
        run.params.insert("model".to_string(), "LinearRegression".to_string());
        run.metrics.insert("r2".to_string(), 0.82);
        run.status = RunStatus::Finished;

        let path = storage.save_run(&run).unwrap();
        assert!(path.ends_with(format!("house-prices/{}/run.json", run.run_id)));

        let loaded = storage.load_run("house-prices", &run.run_id).unwrap();
        assert_eq!(loaded, run);
    }

    #[test]
    fn test_load_runs_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let run = Run::new("exp", None);
        storage.save_run(&run).unwrap();

        let junk = storage.run_dir("exp", "junk");
        fs::create_dir_all(&junk).unwrap();
        fs::write(junk.join(RUN_FILE), "{not json").unwrap();

        let runs = storage.load_runs("exp").unwrap();
        assert_eq!(runs.len(), 1);
        assert!(storage.load_runs("missing").unwrap().is_empty());

        storage.delete_run("exp", &run.run_id).unwrap();
        assert!(storage.load_runs("exp").unwrap().is_empty());
    }
}
