//! Regression Workflow - CSV to tracked regression model
//!
//! This crate runs one supervised regression workflow end to end:
//! - Ingest a CSV from local disk or S3
//! - Clean it into an all-numeric frame
//! - Split it reproducibly into train and validation sets
//! - Train a linear or random forest regressor
//! - Optionally tune the forest with a fixed-budget TPE search
//! - Evaluate on the validation set and record the run
//!
//! # Modules
//!
//! ## Data
//! - [`ingest`] - CSV sources and sinks (local, S3)
//! - [`preprocessing`] - Cleaning strategy and train/validation split
//!
//! ## Modelling
//! - [`training`] - Model configuration, estimators and the trainer
//! - [`evaluation`] - Regression metrics and the evaluator
//! - [`optimizer`] - Search spaces, samplers and the hyperparameter tuner
//!
//! ## Orchestration
//! - [`tracking`] - File-backed experiment tracking
//! - [`pipeline`] - The end-to-end training pipeline
//! - [`config`] - Pipeline configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod ingest;
pub mod preprocessing;

// Modelling
pub mod training;
pub mod evaluation;
pub mod optimizer;

// Orchestration
pub mod tracking;
pub mod config;
pub mod pipeline;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result, SourceIoKind};

    // Ingestion
    pub use crate::ingest::{DataSink, DataSource, LocalCsvSink, LocalCsvSource, S3CsvSink, S3CsvSource, TextEncoding};

    // Preprocessing
    pub use crate::preprocessing::{CleanedDataset, CleaningArtifact, CleaningConfig, CleaningStrategy, DataCleaning, DataSplit, DataStrategy, SplitConfig, SplitStrategy};

    // Training
    pub use crate::training::{Hyperparameters, ModelConfig, ModelKind, ModelTrainer, ParameterValue, TrainedModel};

    // Evaluation
    pub use crate::evaluation::{EvaluationResult, Evaluator, RegressionMetric};

    // Optimization
    pub use crate::optimizer::{BestHyperparameters, HyperparameterTuner, SearchSpace, TuningConfig};

    // Experiment tracking
    pub use crate::tracking::{ExperimentTracker, Run, RunStatus, Tracker};

    // Pipeline
    pub use crate::config::{PipelineConfig, SinkConfig, SourceConfig, TrackingConfig};
    pub use crate::pipeline::{PipelineReport, TrainingPipeline};
}
