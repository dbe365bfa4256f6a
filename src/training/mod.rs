//! Model training module
//!
//! Provides the two supported regression estimators:
//! - Ordinary least squares linear regression
//! - Random forest of CART regression trees
//!
//! [`ModelTrainer`] dispatches a [`ModelConfig`] to the matching estimator.

mod config;
mod engine;
pub mod decision_tree;
pub mod linear_models;
pub mod random_forest;

pub use config::{Hyperparameters, ModelConfig, ModelKind, ParameterValue};
pub use decision_tree::{RegressionTree, TreeNode};
pub use engine::{fit_estimator, Estimator, ModelTrainer, TrainedModel};
pub use linear_models::LinearRegression;
pub use random_forest::{MaxFeatures, RandomForestRegressor, SampleCount};
