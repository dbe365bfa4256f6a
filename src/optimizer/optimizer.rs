//! Fixed-budget sequential minimizer

use super::config::TuningConfig;
use super::samplers::{create_sampler, Sampler};
use super::search_space::{SearchSpace, TrialParams};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Loss recorded for a trial whose objective failed
pub const FAILED_TRIAL_LOSS: f64 = f64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Complete,
    Failed,
}

/// Result of a single trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub params: TrialParams,
    pub loss: f64,
    pub status: TrialStatus,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every trial of one search, in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialRecord>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
}

impl Study {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trial; a completed trial becomes best only with a strictly smaller loss
    pub fn add_trial(&mut self, record: TrialRecord) {
        let idx = self.trials.len();
        let is_better = record.status == TrialStatus::Complete
            && self.best_loss().map_or(true, |best| record.loss < best);
        if is_better {
            self.best_trial_idx = Some(idx);
        }
        self.trials.push(record);
    }

    pub fn best_trial(&self) -> Option<&TrialRecord> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_trial().map(|t| t.loss)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn n_failed(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Failed)
            .count()
    }

    /// Save study to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Sequential model-based minimizer over a [`SearchSpace`]
pub struct HyperOptimizer {
    config: TuningConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
}

impl HyperOptimizer {
    pub fn new(config: TuningConfig, search_space: SearchSpace) -> Result<Self> {
        config.validate()?;
        search_space.validate()?;
        let sampler = create_sampler(&config);
        Ok(Self {
            config,
            search_space,
            sampler,
        })
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.search_space
    }

    /// Run exactly `max_evals` trials and return the study.
    ///
    /// An objective error or a non-finite loss marks the trial `Failed` with
    /// [`FAILED_TRIAL_LOSS`]; the search continues.
    pub fn minimize<F>(&mut self, mut objective: F) -> Result<Study>
    where
        F: FnMut(&TrialParams) -> Result<f64>,
    {
        let start = Instant::now();
        let mut study = Study::new();
        let mut history: Vec<(TrialParams, f64)> = Vec::with_capacity(self.config.max_evals);

        info!(
            max_evals = self.config.max_evals,
            sampler = self.sampler.name(),
            n_params = self.search_space.len(),
            "Starting hyperparameter search"
        );

        for trial_id in 0..self.config.max_evals {
            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &history);

            let (loss, status, error) = match objective(&params) {
                Ok(loss) if loss.is_finite() => (loss, TrialStatus::Complete, None),
                Ok(loss) => {
                    warn!(trial_id, loss, "Trial returned a non-finite loss");
                    (FAILED_TRIAL_LOSS, TrialStatus::Failed, Some(format!("non-finite loss {}", loss)))
                }
                Err(e) => {
                    warn!(trial_id, error = %e, "Trial failed");
                    (FAILED_TRIAL_LOSS, TrialStatus::Failed, Some(e.to_string()))
                }
            };

            history.push((params.clone(), loss));
            study.add_trial(TrialRecord {
                trial_id,
                params,
                loss,
                status,
                duration_secs: trial_start.elapsed().as_secs_f64(),
                error,
            });
            debug!(trial_id, loss, best = ?study.best_loss(), "Trial finished");
        }

        study.total_duration_secs = start.elapsed().as_secs_f64();
        info!(
            n_trials = study.n_trials(),
            n_failed = study.n_failed(),
            best_loss = ?study.best_loss(),
            elapsed_secs = study.total_duration_secs,
            "Hyperparameter search finished"
        );
        Ok(study)
    }
}
