//! Search space definition for hyperparameters

use crate::error::{PipelineError, Result};
use crate::training::{Hyperparameters, ParameterValue};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

/// A sampled configuration
pub type TrialParams = Hyperparameters;

/// Prior distribution of one hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    /// Continuous float in `[low, high]`
    Uniform { low: f64, high: f64 },
    /// Float whose logarithm is uniform in `[ln low, ln high]`
    LogUniform { low: f64, high: f64 },
    /// Integer in `[low, high]`, both inclusive
    IntUniform { low: i64, high: i64 },
    /// One of a fixed list of values
    Choice { options: Vec<ParameterValue> },
}

/// A single named hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(flatten)]
    pub distribution: Distribution,
}

impl Parameter {
    pub fn uniform(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            distribution: Distribution::Uniform { low, high },
        }
    }

    pub fn log_uniform(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            distribution: Distribution::LogUniform { low, high },
        }
    }

    pub fn int_uniform(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            distribution: Distribution::IntUniform { low, high },
        }
    }

    pub fn choice(name: impl Into<String>, options: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            distribution: Distribution::Choice { options },
        }
    }

    /// Choice over the integers of a half-open range
    pub fn int_choice(name: impl Into<String>, range: Range<i64>) -> Self {
        Self::choice(name, range.map(ParameterValue::Int).collect())
    }

    fn validate(&self) -> Result<()> {
        let problem = match &self.distribution {
            Distribution::Uniform { low, high } if !(low.is_finite() && high.is_finite() && low < high) => {
                Some(format!("uniform bounds [{}, {}] must be finite with low < high", low, high))
            }
            Distribution::LogUniform { low, high } if !(*low > 0.0 && high.is_finite() && low < high) => {
                Some(format!("log-uniform bounds [{}, {}] must satisfy 0 < low < high", low, high))
            }
            Distribution::IntUniform { low, high } if low > high => {
                Some(format!("integer bounds [{}, {}] must satisfy low <= high", low, high))
            }
            Distribution::Choice { options } if options.is_empty() => Some("choice has no options".to_string()),
            _ => None,
        };
        match problem {
            Some(reason) => Err(PipelineError::Config(format!(
                "search space parameter '{}': {}",
                self.name, reason
            ))),
            None => Ok(()),
        }
    }

    /// Draw a value from the prior
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.distribution {
            Distribution::Uniform { low, high } => ParameterValue::Float(low + rng.gen::<f64>() * (high - low)),
            Distribution::LogUniform { low, high } => {
                let (log_low, log_high) = (low.ln(), high.ln());
                let value = (log_low + rng.gen::<f64>() * (log_high - log_low)).exp();
                ParameterValue::Float(value.clamp(*low, *high))
            }
            Distribution::IntUniform { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            Distribution::Choice { options } => options[rng.gen_range(0..options.len())].clone(),
        }
    }

    /// Whether `value` lies in this parameter's domain
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match &self.distribution {
            Distribution::Uniform { low, high } | Distribution::LogUniform { low, high } => {
                matches!(value, ParameterValue::Float(v) if *v >= *low && *v <= *high)
            }
            Distribution::IntUniform { low, high } => {
                matches!(value, ParameterValue::Int(v) if *v >= *low && *v <= *high)
            }
            Distribution::Choice { options } => options.contains(value),
        }
    }

    /// Number of options of a choice parameter
    pub fn n_options(&self) -> Option<usize> {
        match &self.distribution {
            Distribution::Choice { options } => Some(options.len()),
            _ => None,
        }
    }

    /// Index of `value` among a choice parameter's options
    pub fn option_index(&self, value: &ParameterValue) -> Option<usize> {
        match &self.distribution {
            Distribution::Choice { options } => options.iter().position(|o| o == value),
            _ => None,
        }
    }

    pub fn option(&self, index: usize) -> Option<ParameterValue> {
        match &self.distribution {
            Distribution::Choice { options } => options.get(index).cloned(),
            _ => None,
        }
    }

    /// Map a numeric value into the unit interval
    pub fn to_unit(&self, value: &ParameterValue) -> Option<f64> {
        let unit = match (&self.distribution, value) {
            (Distribution::Uniform { low, high }, ParameterValue::Float(v)) => Some((v - low) / (high - low)),
            (Distribution::LogUniform { low, high }, ParameterValue::Float(v)) if *v > 0.0 => {
                Some((v.ln() - low.ln()) / (high.ln() - low.ln()))
            }
            (Distribution::IntUniform { low, high }, ParameterValue::Int(v)) => {
                Some((v - low) as f64 / (high - low + 1) as f64 + 0.5 / (high - low + 1) as f64)
            }
            _ => None,
        };
        unit.map(|u| u.clamp(0.0, 1.0))
    }

    /// Inverse of [`Parameter::to_unit`]; choices map to `None`
    pub fn from_unit(&self, u: f64) -> Option<ParameterValue> {
        let u = u.clamp(0.0, 1.0);
        match &self.distribution {
            Distribution::Uniform { low, high } => Some(ParameterValue::Float(low + u * (high - low))),
            Distribution::LogUniform { low, high } => {
                let value = (low.ln() + u * (high.ln() - low.ln())).exp();
                Some(ParameterValue::Float(value.clamp(*low, *high)))
            }
            Distribution::IntUniform { low, high } => {
                let span = high - low + 1;
                let offset = ((u * span as f64).floor() as i64).min(span - 1);
                Some(ParameterValue::Int(low + offset))
            }
            Distribution::Choice { .. } => None,
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any earlier one with the same name
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.retain(|p| p.name != param.name);
        self.parameters.push(param);
        self
    }

    pub fn uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::uniform(name, low, high))
    }

    pub fn log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_uniform(name, low, high))
    }

    pub fn int_uniform(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int_uniform(name, low, high))
    }

    pub fn choice(self, name: impl Into<String>, options: Vec<ParameterValue>) -> Self {
        self.add(Parameter::choice(name, options))
    }

    pub fn int_choice(self, name: impl Into<String>, range: Range<i64>) -> Self {
        self.add(Parameter::int_choice(name, range))
    }

    /// Random forest space used for review-score tuning
    pub fn random_forest_default() -> Self {
        Self::new()
            .int_choice("n_estimators", 10..300)
            .int_choice("max_depth", 1..20)
            .uniform("min_samples_split", 0.1, 1.0)
            .int_choice("min_samples_leaf", 1..10)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Reject empty spaces, duplicate names and malformed bounds
    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(PipelineError::Config("search space is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "search space defines '{}' more than once",
                    param.name
                )));
            }
            param.validate()?;
        }
        Ok(())
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Whether `params` assigns exactly this space's parameters, each within its domain
    pub fn contains(&self, params: &TrialParams) -> bool {
        params.len() == self.parameters.len()
            && self
                .parameters
                .iter()
                .all(|p| params.get(&p.name).is_some_and(|v| p.contains(v)))
    }
}
