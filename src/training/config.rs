//! Model selection and hyperparameter configuration

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported regression model kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    LinearRegression,
    RandomForestRegressor,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "LinearRegression",
            ModelKind::RandomForestRegressor => "RandomForestRegressor",
        }
    }

    /// Whether the hyperparameter tuner supports this kind
    pub fn is_tunable(&self) -> bool {
        matches!(self, ModelKind::RandomForestRegressor)
    }

    pub fn all() -> [ModelKind; 2] {
        [ModelKind::LinearRegression, ModelKind::RandomForestRegressor]
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LinearRegression" | "linear_regression" => Ok(ModelKind::LinearRegression),
            "RandomForestRegressor" | "random_forest" => Ok(ModelKind::RandomForestRegressor),
            other => Err(PipelineError::UnsupportedModel(format!(
                "'{}' (supported: LinearRegression, RandomForestRegressor)",
                other
            ))),
        }
    }
}

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Int(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::Bool(_) => "bool",
            ParameterValue::String(_) => "string",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<usize> for ParameterValue {
    fn from(v: usize) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

/// Hyperparameter name to value
pub type Hyperparameters = BTreeMap<String, ParameterValue>;

/// Named model plus optional hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperparameters: Option<Hyperparameters>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(ModelKind::RandomForestRegressor.as_str())
    }
}

impl ModelConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            hyperparameters: None,
        }
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = Some(hyperparameters);
        self
    }

    /// Add or replace a single hyperparameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.hyperparameters
            .get_or_insert_with(Hyperparameters::new)
            .insert(name.into(), value.into());
        self
    }

    /// Resolve the model kind
    pub fn kind(&self) -> Result<ModelKind> {
        self.model_name.parse()
    }

    /// Hyperparameters, empty when none were given
    pub fn params(&self) -> Hyperparameters {
        self.hyperparameters.clone().unwrap_or_default()
    }

    /// Overlay `overrides` on top of the configured hyperparameters
    pub fn merged_with(&self, overrides: &Hyperparameters) -> Self {
        let mut params = self.params();
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            model_name: self.model_name.clone(),
            hyperparameters: Some(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("LinearRegression".parse::<ModelKind>().unwrap(), ModelKind::LinearRegression);
        assert_eq!("random_forest".parse::<ModelKind>().unwrap(), ModelKind::RandomForestRegressor);
        let err = "XGBoostRegressor".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedModel(_)));
        assert!(!ModelKind::LinearRegression.is_tunable());
    }

    #[test]
    fn test_parameter_value_json() {
        let params: Hyperparameters = serde_json::from_str(
            r#"{"n_estimators": 120, "min_samples_split": 0.25, "bootstrap": false, "max_features": "sqrt"}"#,
        )
        .unwrap();
        assert_eq!(params["n_estimators"], ParameterValue::Int(120));
        assert_eq!(params["min_samples_split"], ParameterValue::Float(0.25));
        assert_eq!(params["bootstrap"], ParameterValue::Bool(false));
        assert_eq!(params["max_features"].as_str(), Some("sqrt"));

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"n_estimators\":120"));
    }

    #[test]
    fn test_merge_overrides() {
        let config = ModelConfig::new("RandomForestRegressor")
            .with_param("n_estimators", 50)
            .with_param("bootstrap", true);
        let mut tuned = Hyperparameters::new();
        tuned.insert("n_estimators".to_string(), ParameterValue::Int(200));

        let merged = config.merged_with(&tuned);
        let params = merged.params();
        assert_eq!(params["n_estimators"], ParameterValue::Int(200));
        assert_eq!(params["bootstrap"], ParameterValue::Bool(true));
    }
}
