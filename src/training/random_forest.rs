//! Random forest regressor

use super::config::{Hyperparameters, ParameterValue};
use super::decision_tree::RegressionTree;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let count = match *self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n * f).floor() as usize,
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::All => n_features,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// An absolute sample count or a fraction of the training rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleCount {
    Count(usize),
    Fraction(f64),
}

impl SampleCount {
    /// Absolute count for `n_samples` rows, never below `floor`
    pub fn resolve(&self, n_samples: usize, floor: usize) -> usize {
        match *self {
            SampleCount::Count(c) => c.max(floor),
            SampleCount::Fraction(f) => ((f * n_samples as f64).ceil() as usize).max(floor),
        }
    }
}

/// Random forest of bootstrap-sampled regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: SampleCount,
    pub min_samples_leaf: SampleCount,
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

fn expect_int(name: &str, value: &ParameterValue, min: i64) -> Result<i64> {
    match value.as_i64() {
        Some(v) if v >= min => Ok(v),
        Some(_) => Err(PipelineError::invalid_parameter(name, value, format!("must be >= {}", min))),
        None => Err(PipelineError::invalid_parameter(
            name,
            value,
            format!("expected an int, got {}", value.type_name()),
        )),
    }
}

fn sample_count(name: &str, value: &ParameterValue, min_count: i64, max_fraction: f64) -> Result<SampleCount> {
    match value {
        ParameterValue::Int(_) => Ok(SampleCount::Count(expect_int(name, value, min_count)? as usize)),
        ParameterValue::Float(f) if *f > 0.0 && *f <= max_fraction => Ok(SampleCount::Fraction(*f)),
        ParameterValue::Float(_) => Err(PipelineError::invalid_parameter(
            name,
            value,
            format!("fraction must be in (0, {}]", max_fraction),
        )),
        _ => Err(PipelineError::invalid_parameter(name, value, "expected an int or a float")),
    }
}

impl RandomForestRegressor {
    /// Create a new regressor forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: SampleCount::Count(2),
            min_samples_leaf: SampleCount::Count(1),
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: SampleCount) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: SampleCount) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Build from hyperparameters, rejecting unknown names and out-of-domain values
    pub fn from_hyperparameters(params: &Hyperparameters) -> Result<Self> {
        let mut forest = Self::default();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => forest.n_estimators = expect_int(name, value, 1)? as usize,
                "max_depth" => forest.max_depth = Some(expect_int(name, value, 1)? as usize),
                "min_samples_split" => forest.min_samples_split = sample_count(name, value, 2, 1.0)?,
                "min_samples_leaf" => forest.min_samples_leaf = sample_count(name, value, 1, 0.5)?,
                "max_features" => {
                    forest.max_features = match value {
                        ParameterValue::String(s) if s == "sqrt" => MaxFeatures::Sqrt,
                        ParameterValue::String(s) if s == "log2" => MaxFeatures::Log2,
                        ParameterValue::Int(_) => MaxFeatures::Fixed(expect_int(name, value, 1)? as usize),
                        ParameterValue::Float(f) if *f > 0.0 && *f <= 1.0 => MaxFeatures::Fraction(*f),
                        _ => {
                            return Err(PipelineError::invalid_parameter(
                                name,
                                value,
                                "expected 'sqrt', 'log2', an int >= 1 or a fraction in (0, 1]",
                            ))
                        }
                    }
                }
                "bootstrap" => {
                    forest.bootstrap = value
                        .as_bool()
                        .ok_or_else(|| PipelineError::invalid_parameter(name, value, "expected a bool"))?
                }
                "random_state" => forest.random_state = Some(expect_int(name, value, 0)? as u64),
                _ => {
                    return Err(PipelineError::invalid_parameter(
                        name,
                        value,
                        "unknown parameter for RandomForestRegressor",
                    ))
                }
            }
        }
        Ok(forest)
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::Training(format!(
                "cannot fit a forest on {} rows and {} features",
                n_samples, n_features
            )));
        }

        self.n_features = n_features;
        let max_features = self.max_features.resolve(n_features);
        let min_split = self.min_samples_split.resolve(n_samples, 2);
        let min_leaf = self.min_samples_leaf.resolve(n_samples, 1);
        let base_seed = self.random_state.unwrap_or(42);
        debug!(
            n_estimators = self.n_estimators,
            max_features, min_split, min_leaf, "Fitting random forest"
        );

        // Build trees in parallel
        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<RegressionTree> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = RegressionTree::new()
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(min_split)
                    .with_min_samples_leaf(min_leaf)
                    .with_max_features(max_features);
                tree.fit_indices(x, y, &sample_indices, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<RegressionTree>>>()?;

        self.trees = trees;
        self.compute_feature_importances();
        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (total, &val) in totals.iter_mut().zip(imp.iter()) {
                    *total += val;
                }
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            for total in &mut totals {
                *total /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(totals));
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Mean prediction of all trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_trees = self.trees.len() as f64;
        let predictions = (0..x.nrows())
            .into_par_iter()
            .map(|i| -> Result<f64> {
                let row = x.row(i);
                let mut sum = 0.0;
                for tree in &self.trees {
                    sum += tree.predict_row(row)?;
                }
                Ok(sum / n_trees)
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Array1::from_vec(predictions))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
