//! Tuning configuration

use super::search_space::SearchSpace;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Sampler used to propose trials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Independent draws from the prior
    Random,
    /// Tree-structured Parzen Estimator
    Tpe,
}

/// Configuration for hyperparameter tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Number of trials to run
    pub max_evals: usize,

    /// Sampler type
    pub sampler: SamplerKind,

    /// Seed for the sampler and for models that take a `random_state`
    pub seed: u64,

    /// Number of initial random samples before TPE kicks in
    pub n_startup_trials: usize,

    /// Quantile of losses treated as "good" by TPE
    pub gamma: f64,

    /// Candidates drawn from the good density per TPE proposal
    pub n_candidates: usize,

    /// Space to search; the random forest default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_space: Option<SearchSpace>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            max_evals: 20,
            sampler: SamplerKind::Tpe,
            seed: 42,
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
            search_space: None,
        }
    }
}

impl TuningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_evals(mut self, n: usize) -> Self {
        self.max_evals = n;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerKind) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = Some(space);
        self
    }

    /// Configured space, falling back to the random forest default
    pub fn search_space(&self) -> SearchSpace {
        self.search_space
            .clone()
            .unwrap_or_else(SearchSpace::random_forest_default)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_evals == 0 {
            return Err(PipelineError::Config("max_evals must be at least 1".to_string()));
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(PipelineError::Config(format!(
                "gamma must lie in (0, 1), got {}",
                self.gamma
            )));
        }
        if self.n_candidates == 0 {
            return Err(PipelineError::Config("n_candidates must be at least 1".to_string()));
        }
        if let Some(space) = &self.search_space {
            space.validate()?;
        }
        Ok(())
    }
}
