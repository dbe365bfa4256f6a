//! Regression metrics and model evaluation

use crate::error::{PipelineError, Result};
use crate::tracking::Tracker;
use crate::training::TrainedModel;
use crate::utils::series_to_array1;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        error!(y_true = y_true.len(), y_pred = y_pred.len(), "Prediction length mismatch");
        return Err(PipelineError::ShapeMismatch {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        error!("Cannot evaluate on an empty target vector");
        return Err(PipelineError::ShapeMismatch {
            expected: "at least 1 sample".to_string(),
            actual: "0 samples".to_string(),
        });
    }
    Ok(())
}

fn sum_squared_residuals(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum()
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    Ok(sum_squared_residuals(y_true, y_pred) / y_true.len() as f64)
}

pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    mean_squared_error(y_true, y_pred).map(f64::sqrt)
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let total: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum();
    Ok(total / y_true.len() as f64)
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res = sum_squared_residuals(y_true, y_pred);

    if ss_tot > 0.0 {
        Ok(1.0 - ss_res / ss_tot)
    } else if ss_res == 0.0 {
        Ok(1.0)
    } else {
        Ok(0.0)
    }
}

/// Closed set of supported regression metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionMetric {
    Mse,
    Rmse,
    R2,
    Mae,
}

impl RegressionMetric {
    pub fn name(&self) -> &'static str {
        match self {
            RegressionMetric::Mse => "mse",
            RegressionMetric::Rmse => "rmse",
            RegressionMetric::R2 => "r2",
            RegressionMetric::Mae => "mae",
        }
    }

    /// Whether larger values are better
    pub fn greater_is_better(&self) -> bool {
        matches!(self, RegressionMetric::R2)
    }

    pub fn calculate(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        let value = match self {
            RegressionMetric::Mse => mean_squared_error(y_true, y_pred),
            RegressionMetric::Rmse => root_mean_squared_error(y_true, y_pred),
            RegressionMetric::R2 => r2_score(y_true, y_pred),
            RegressionMetric::Mae => mean_absolute_error(y_true, y_pred),
        }?;
        info!(metric = self.name(), value, "Computed metric");
        Ok(value)
    }
}

impl fmt::Display for RegressionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation-split scores of a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub r2: f64,
    pub rmse: f64,
    pub mse: f64,
    pub mae: f64,
    pub n_samples: usize,
}

impl EvaluationResult {
    pub fn get(&self, metric: RegressionMetric) -> f64 {
        match metric {
            RegressionMetric::Mse => self.mse,
            RegressionMetric::Rmse => self.rmse,
            RegressionMetric::R2 => self.r2,
            RegressionMetric::Mae => self.mae,
        }
    }
}

/// Scores models on a validation split
#[derive(Default)]
pub struct Evaluator<'a> {
    tracker: Option<&'a dyn Tracker>,
}

impl<'a> Evaluator<'a> {
    pub fn new() -> Self {
        Self { tracker: None }
    }

    /// Log every computed metric to `tracker`
    pub fn with_tracker(mut self, tracker: &'a dyn Tracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn evaluate(&self, model: &TrainedModel, x_val: &DataFrame, y_val: &Series) -> Result<EvaluationResult> {
        let y_true = series_to_array1(y_val)?;
        let y_pred = model.predict(x_val)?;
        self.evaluate_predictions(&y_true, &y_pred)
    }

    /// Score precomputed predictions
    pub fn evaluate_predictions(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<EvaluationResult> {
        let result = EvaluationResult {
            r2: RegressionMetric::R2.calculate(y_true, y_pred)?,
            rmse: RegressionMetric::Rmse.calculate(y_true, y_pred)?,
            mse: RegressionMetric::Mse.calculate(y_true, y_pred)?,
            mae: RegressionMetric::Mae.calculate(y_true, y_pred)?,
            n_samples: y_true.len(),
        };

        if let Some(tracker) = self.tracker {
            for metric in [
                RegressionMetric::R2,
                RegressionMetric::Rmse,
                RegressionMetric::Mse,
                RegressionMetric::Mae,
            ] {
                tracker.log_metric(metric.name(), result.get(metric), None)?;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let result = Evaluator::new().evaluate_predictions(&y, &y).unwrap();
        assert_eq!(result.r2, 1.0);
        assert_eq!(result.rmse, 0.0);
        assert_eq!(result.n_samples, 4);
    }

    #[test]
    fn test_mean_predictor() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![2.5, 2.5, 2.5, 2.5];
        let result = Evaluator::new().evaluate_predictions(&y_true, &y_pred).unwrap();
        assert!((result.rmse - 1.118).abs() < 1e-3);
        assert!((result.mse - 1.25).abs() < 1e-12);
        assert!((result.mae - 1.0).abs() < 1e-12);
        assert!(result.r2.abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_target() {
        let y = array![3.0, 3.0, 3.0];
        assert_eq!(r2_score(&y, &y).unwrap(), 1.0);
        assert_eq!(r2_score(&y, &array![3.0, 3.0, 4.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_r2_can_be_negative() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![3.0, 2.0, 1.0];
        assert!((r2_score(&y_true, &y_pred).unwrap() + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = mean_squared_error(&array![1.0, 2.0], &array![1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            RegressionMetric::R2.calculate(&empty, &empty),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(RegressionMetric::Rmse.to_string(), "rmse");
        assert!(RegressionMetric::R2.greater_is_better());
        assert!(!RegressionMetric::Mae.greater_is_better());
    }
}
