//! File-backed experiment tracker

use super::storage::LocalStorage;
use super::Tracker;
use crate::error::{PipelineError, Result};
use crate::training::TrainedModel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
    Killed,
}

/// One recorded value of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub step: u64,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A single tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    /// Latest value per metric
    pub metrics: BTreeMap<String, f64>,
    pub metric_history: BTreeMap<String, Vec<MetricPoint>>,
    /// Artifact paths relative to the run directory
    pub artifacts: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl Run {
    pub fn new(experiment: &str, run_name: Option<&str>) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", &run_id[..8]));
        Self {
            run_id,
            run_name,
            experiment: experiment.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metric_history: BTreeMap::new(),
            artifacts: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Wall-clock duration in seconds, if the run has ended
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    fn record_metric(&mut self, key: &str, value: f64, step: Option<u64>) {
        let history = self.metric_history.entry(key.to_string()).or_default();
        let step = step.unwrap_or(history.len() as u64);
        history.push(MetricPoint {
            step,
            value,
            timestamp: Utc::now(),
        });
        self.metrics.insert(key.to_string(), value);
    }
}

/// Experiment tracker persisting runs as JSON files
#[derive(Debug)]
pub struct ExperimentTracker {
    experiment: String,
    storage: LocalStorage,
    active: Mutex<Option<Run>>,
}

impl ExperimentTracker {
    /// Create a tracker writing under `<output_dir>/<experiment>/`
    pub fn new(output_dir: impl Into<PathBuf>, experiment: impl Into<String>) -> Result<Self> {
        let experiment = experiment.into();
        if experiment.trim().is_empty() || experiment.contains(['/', '\\']) {
            return Err(PipelineError::Config(format!(
                "invalid experiment name '{}'",
                experiment
            )));
        }
        let storage = LocalStorage::new(output_dir);
        std::fs::create_dir_all(storage.experiment_dir(&experiment))?;
        Ok(Self {
            experiment,
            storage,
            active: Mutex::new(None),
        })
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Id of the active run, if any
    pub fn active_run_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|run| run.run_id.clone())
    }

    /// Snapshot of the active run
    pub fn active_run(&self) -> Option<Run> {
        self.active.lock().clone()
    }

    /// Directory holding the active run's artifacts
    pub fn artifact_dir(&self) -> Result<PathBuf> {
        let run_id = self.active_run_id().ok_or_else(no_active_run)?;
        Ok(self.storage.artifact_dir(&self.experiment, &run_id))
    }

    fn with_active<T>(&self, f: impl FnOnce(&mut Run) -> T) -> Result<T> {
        let mut guard = self.active.lock();
        match guard.as_mut() {
            Some(run) => Ok(f(run)),
            None => {
                error!(experiment = %self.experiment, "No active run");
                Err(no_active_run())
            }
        }
    }

    /// All persisted runs of this experiment, oldest first
    pub fn load_runs(&self) -> Result<Vec<Run>> {
        self.storage.load_runs(&self.experiment)
    }

    /// Finished run with the best value of `metric`
    pub fn best_run(&self, metric: &str, maximize: bool) -> Result<Option<Run>> {
        let best = self
            .load_runs()?
            .into_iter()
            .filter(|run| run.status == RunStatus::Finished)
            .filter_map(|run| run.metrics.get(metric).copied().map(|v| (v, run)))
            .filter(|(v, _)| v.is_finite())
            .fold(None::<(f64, Run)>, |best, (value, run)| match best {
                Some((current, _)) if (maximize && value <= current) || (!maximize && value >= current) => best,
                _ => Some((value, run)),
            });
        Ok(best.map(|(_, run)| run))
    }

    /// Attach a tag to the active run
    pub fn set_tag(&self, key: &str, value: &str) -> Result<()> {
        self.with_active(|run| {
            run.tags.insert(key.to_string(), value.to_string());
        })
    }

    /// Copy a file into the active run's artifacts
    pub fn log_artifact(&self, source: &Path) -> Result<PathBuf> {
        let dir = self.artifact_dir()?;
        let name = source
            .file_name()
            .ok_or_else(|| PipelineError::Tracking(format!("'{}' is not a file", source.display())))?;
        std::fs::create_dir_all(&dir)?;
        let destination = dir.join(name);
        std::fs::copy(source, &destination)?;
        let relative = format!("artifacts/{}", name.to_string_lossy());
        self.with_active(|run| run.artifacts.push(relative))?;
        Ok(destination)
    }
}

fn no_active_run() -> PipelineError {
    PipelineError::Tracking("no active run; call start_run first".to_string())
}

impl Tracker for ExperimentTracker {
    fn start_run(&self, run_name: Option<&str>) -> Result<String> {
        let mut guard = self.active.lock();
        if let Some(run) = guard.as_ref() {
            error!(run_id = %run.run_id, "A run is already active");
            return Err(PipelineError::Tracking(format!(
                "run '{}' is still active; end it before starting another",
                run.run_id
            )));
        }
        let run = Run::new(&self.experiment, run_name);
        self.storage.save_run(&run)?;
        info!(experiment = %self.experiment, run_id = %run.run_id, run_name = %run.run_name, "Started run");
        let run_id = run.run_id.clone();
        *guard = Some(run);
        Ok(run_id)
    }

    fn log_param(&self, key: &str, value: &str) -> Result<()> {
        debug!(key, value, "Logging param");
        self.with_active(|run| {
            run.params.insert(key.to_string(), value.to_string());
        })
    }

    fn log_metric(&self, key: &str, value: f64, step: Option<u64>) -> Result<()> {
        debug!(key, value, step, "Logging metric");
        self.with_active(|run| run.record_metric(key, value, step))
    }

    fn log_model(&self, model: &TrainedModel, metadata: &BTreeMap<String, String>) -> Result<PathBuf> {
        let dir = self.artifact_dir()?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("model.json");
        model.save(&path)?;

        self.with_active(|run| {
            run.artifacts.push("artifacts/model.json".to_string());
            run.tags.insert("model_kind".to_string(), model.kind().to_string());
            for (key, value) in metadata {
                run.tags.insert(format!("model.{}", key), value.clone());
            }
        })?;
        info!(path = %path.display(), "Logged model");
        Ok(path)
    }

    fn end_run(&self, status: RunStatus) -> Result<()> {
        let mut guard = self.active.lock();
        let mut run = guard.take().ok_or_else(no_active_run)?;
        run.status = status;
        run.end_time = Some(Utc::now());
        let saved = self.storage.save_run(&run);
        info!(run_id = %run.run_id, status = ?status, "Ended run");
        saved.map(|_| ())
    }
}
