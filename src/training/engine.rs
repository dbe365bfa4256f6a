//! Model trainer and fitted-model container

use super::config::{Hyperparameters, ModelConfig, ModelKind};
use super::linear_models::LinearRegression;
use super::random_forest::RandomForestRegressor;
use crate::error::{PipelineError, Result};
use crate::tracking::Tracker;
use crate::utils::{column_names, columns_to_array2, frame_to_array2, series_to_array1};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// Fitted estimator variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    LinearRegression(LinearRegression),
    RandomForestRegressor(RandomForestRegressor),
}

impl Estimator {
    /// Construct an untrained estimator, passing hyperparameters through verbatim
    pub fn from_config(kind: ModelKind, params: &Hyperparameters) -> Result<Self> {
        Ok(match kind {
            ModelKind::LinearRegression => {
                Estimator::LinearRegression(LinearRegression::from_hyperparameters(params)?)
            }
            ModelKind::RandomForestRegressor => {
                Estimator::RandomForestRegressor(RandomForestRegressor::from_hyperparameters(params)?)
            }
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::LinearRegression(_) => ModelKind::LinearRegression,
            Estimator::RandomForestRegressor(_) => ModelKind::RandomForestRegressor,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::LinearRegression(model) => model.fit(x, y).map(|_| ()),
            Estimator::RandomForestRegressor(model) => model.fit(x, y).map(|_| ()),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::LinearRegression(model) => model.predict(x),
            Estimator::RandomForestRegressor(model) => model.predict(x),
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            Estimator::LinearRegression(model) => model.is_fitted(),
            Estimator::RandomForestRegressor(model) => model.is_fitted(),
        }
    }
}

/// A fitted model together with the feature layout it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    kind: ModelKind,
    hyperparameters: Hyperparameters,
    feature_names: Vec<String>,
    estimator: Estimator,
    trained_at: DateTime<Utc>,
    n_train_samples: usize,
    training_time_secs: f64,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn n_train_samples(&self) -> usize {
        self.n_train_samples
    }

    pub fn training_time_secs(&self) -> f64 {
        self.training_time_secs
    }

    /// Predict for a frame containing (at least) the training feature columns
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = columns_to_array2(df, &self.feature_names)?;
        self.predict_array(&x)
    }

    /// Predict for a matrix whose columns follow `feature_names()`
    pub fn predict_array(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        self.estimator.predict(x)
    }

    /// Impurity-based importances paired with feature names (forests only)
    pub fn feature_importances(&self) -> Option<Vec<(String, f64)>> {
        match &self.estimator {
            Estimator::RandomForestRegressor(model) => model.feature_importances().map(|imp| {
                self.feature_names
                    .iter()
                    .cloned()
                    .zip(imp.iter().copied())
                    .collect()
            }),
            Estimator::LinearRegression(_) => None,
        }
    }

    /// Save the model as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a model saved with [`TrainedModel::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        if !model.estimator.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        Ok(model)
    }
}

/// Dispatches a [`ModelConfig`] to the matching estimator and fits it
#[derive(Default)]
pub struct ModelTrainer<'a> {
    tracker: Option<&'a dyn Tracker>,
}

impl<'a> ModelTrainer<'a> {
    pub fn new() -> Self {
        Self { tracker: None }
    }

    /// Log model name and hyperparameters to `tracker` on every fit
    pub fn with_tracker(mut self, tracker: &'a dyn Tracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Fit a fresh model on the training split
    pub fn train(&self, x_train: &DataFrame, y_train: &Series, config: &ModelConfig) -> Result<TrainedModel> {
        let kind = config.kind().inspect_err(|e| {
            error!(model = %config.model_name, error = %e, "Unsupported model");
        })?;
        let params = config.params();

        let feature_names = column_names(x_train);
        if feature_names.is_empty() {
            error!("Training frame has no feature columns");
            return Err(PipelineError::DataIntegrity("training frame has no feature columns".to_string()));
        }
        if x_train.height() != y_train.len() {
            error!(rows = x_train.height(), targets = y_train.len(), "Feature/target length mismatch");
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} targets", x_train.height()),
                actual: format!("{} targets", y_train.len()),
            });
        }

        let x = frame_to_array2(x_train)?;
        let y = series_to_array1(y_train)?;

        let start = Instant::now();
        let estimator = fit_estimator(kind, &params, &x, &y).inspect_err(|e| {
            error!(model = %kind, error = %e, "Model training failed");
        })?;
        let training_time_secs = start.elapsed().as_secs_f64();

        info!(
            model = %kind,
            n_samples = x.nrows(),
            n_features = x.ncols(),
            elapsed_secs = training_time_secs,
            "Model trained"
        );

        if let Some(tracker) = self.tracker {
            tracker.log_param("model_name", kind.as_str())?;
            for (name, value) in &params {
                tracker.log_param(name, &value.to_string())?;
            }
        }

        Ok(TrainedModel {
            kind,
            hyperparameters: params,
            feature_names,
            estimator,
            trained_at: Utc::now(),
            n_train_samples: x.nrows(),
            training_time_secs,
        })
    }
}

/// Build and fit an estimator on plain arrays
pub fn fit_estimator(
    kind: ModelKind,
    params: &Hyperparameters,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<Estimator> {
    let mut estimator = Estimator::from_config(kind, params)?;
    estimator.fit(x, y)?;
    Ok(estimator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ParameterValue;

    fn linear_frame() -> (DataFrame, Series) {
        let x = df! {
            "a" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            "b" => [0.5, 1.0, 0.0, 2.0, 1.5, 3.0],
        }
        .unwrap();
        let y: Vec<f64> = (0..6)
            .map(|i| {
                let a = (i + 1) as f64;
                let b = [0.5, 1.0, 0.0, 2.0, 1.5, 3.0][i];
                2.0 * a - b + 1.0
            })
            .collect();
        (x, Series::new("price".into(), y))
    }

    #[test]
    fn test_train_linear_regression() {
        let (x, y) = linear_frame();
        let model = ModelTrainer::new()
            .train(&x, &y, &ModelConfig::new("LinearRegression"))
            .unwrap();

        assert_eq!(model.kind(), ModelKind::LinearRegression);
        assert_eq!(model.feature_names(), &["a".to_string(), "b".to_string()]);
        let preds = model.predict(&x).unwrap();
        let truth = series_to_array1(&y).unwrap();
        for (p, t) in preds.iter().zip(truth.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unsupported_model() {
        let (x, y) = linear_frame();
        let err = ModelTrainer::new()
            .train(&x, &y, &ModelConfig::new("GradientBoostingRegressor"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedModel(_)));
    }

    #[test]
    fn test_hyperparameters_passed_through() {
        let (x, y) = linear_frame();
        let config = ModelConfig::new("RandomForestRegressor")
            .with_param("n_estimators", 5)
            .with_param("max_depth", 3)
            .with_param("random_state", 7);
        let model = ModelTrainer::new().train(&x, &y, &config).unwrap();
        assert_eq!(model.hyperparameters()["n_estimators"], ParameterValue::Int(5));
        match model.estimator() {
            Estimator::RandomForestRegressor(forest) => assert_eq!(forest.n_trees(), 5),
            other => panic!("unexpected estimator {:?}", other.kind()),
        }
        assert_eq!(model.feature_importances().unwrap().len(), 2);

        let bad = ModelConfig::new("RandomForestRegressor").with_param("n_estimators", -3);
        assert!(matches!(
            ModelTrainer::new().train(&x, &y, &bad),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_predict_requires_feature_columns() {
        let (x, y) = linear_frame();
        let model = ModelTrainer::new()
            .train(&x, &y, &ModelConfig::new("LinearRegression"))
            .unwrap();
        let missing = df! { "a" => [1.0] }.unwrap();
        assert!(matches!(model.predict(&missing), Err(PipelineError::DataIntegrity(_))));
    }

    #[test]
    fn test_length_mismatch() {
        let (x, _) = linear_frame();
        let y = Series::new("price".into(), vec![1.0, 2.0]);
        let err = ModelTrainer::new()
            .train(&x, &y, &ModelConfig::new("LinearRegression"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y) = linear_frame();
        let config = ModelConfig::new("RandomForestRegressor").with_param("n_estimators", 3);
        let model = ModelTrainer::new().train(&x, &y, &config).unwrap();

        let path = dir.path().join("models/model.json");
        model.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();
        assert_eq!(loaded.kind(), model.kind());
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}
