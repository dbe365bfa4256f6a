//! Hyperparameter optimization module
//!
//! Provides fixed-budget hyperparameter search:
//! - Search spaces of uniform, log-uniform, integer and choice parameters
//! - Random and Tree-structured Parzen Estimator (TPE) samplers
//! - A study recording every trial, failed ones included
//! - A tuner scoring regression models by validation R²

mod config;
mod optimizer;
mod samplers;
mod search_space;
mod tuner;

pub use config::{SamplerKind, TuningConfig};
pub use optimizer::{HyperOptimizer, Study, TrialRecord, TrialStatus, FAILED_TRIAL_LOSS};
pub use samplers::{create_sampler, RandomSampler, Sampler, TpeSampler};
pub use search_space::{Distribution, Parameter, SearchSpace, TrialParams};
pub use tuner::{BestHyperparameters, HyperparameterTuner};
