//! Experiment tracking
//!
//! A [`Tracker`] records params, metrics and model artifacts for one run at a
//! time. The tracker is created once per process and handed explicitly to the
//! components that log to it.

mod storage;
mod tracker;

pub use storage::LocalStorage;
pub use tracker::{ExperimentTracker, MetricPoint, Run, RunStatus};

use crate::error::Result;
use crate::training::TrainedModel;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Sink for run parameters, metrics and models
pub trait Tracker: Send + Sync {
    /// Start a run and return its id
    fn start_run(&self, run_name: Option<&str>) -> Result<String>;

    fn log_param(&self, key: &str, value: &str) -> Result<()>;

    /// Record a metric value; `step` defaults to the metric's next index
    fn log_metric(&self, key: &str, value: f64, step: Option<u64>) -> Result<()>;

    /// Persist a fitted model as a run artifact and return its path
    fn log_model(&self, model: &TrainedModel, metadata: &BTreeMap<String, String>) -> Result<PathBuf>;

    /// Finish the active run with the given status
    fn end_run(&self, status: RunStatus) -> Result<()>;

    fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in params {
            self.log_param(key, value)?;
        }
        Ok(())
    }
}
