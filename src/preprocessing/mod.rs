//! Data preprocessing module
//!
//! Turns a raw heterogeneous table into model-ready train/validation data:
//! - Column drops, median and sentinel imputation
//! - Derived ratio/product features
//! - Persisted label encoding of categorical columns
//! - Seeded train/validation split
//! - A strategy executor that applies either step to a dataset

mod cleaning;
mod config;
mod encoder;
mod features;
mod imputer;
mod split;
mod strategy;

pub use cleaning::{CleanedDataset, CleaningArtifact, CleaningStrategy, FittedCleaning};
pub use config::{CleaningConfig, DerivedFeature, DerivedOp, SplitConfig};
pub use encoder::LabelEncoder;
pub use features::derive_feature;
pub use imputer::{column_median, fill_numeric, fill_text, missing_count};
pub use split::{DataSplit, SplitStrategy};
pub use strategy::{DataCleaning, DataStrategy, StrategyOutput};
