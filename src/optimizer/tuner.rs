//! Hyperparameter tuning of regression models against a validation split

use super::config::TuningConfig;
use super::optimizer::{HyperOptimizer, Study, TrialStatus};
use super::search_space::{SearchSpace, TrialParams};
use crate::error::{PipelineError, Result};
use crate::evaluation::r2_score;
use crate::tracking::Tracker;
use crate::training::{fit_estimator, ModelConfig, ParameterValue};
use crate::utils::{column_names, columns_to_array2, series_to_array1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Outcome of a tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestHyperparameters {
    /// Parameter values of the best trial, members of the search space
    pub params: TrialParams,
    /// Best loss, the negated validation R²
    pub loss: f64,
    pub trial_id: usize,
    pub study: Study,
}

impl BestHyperparameters {
    /// Validation R² of the best trial
    pub fn r2(&self) -> f64 {
        -self.loss
    }

    /// Overlay the tuned values on a model configuration
    pub fn apply_to(&self, config: &ModelConfig) -> ModelConfig {
        config.merged_with(&self.params)
    }
}

/// Minimizes `-R²` on the validation split over a search space
pub struct HyperparameterTuner<'a> {
    config: TuningConfig,
    tracker: Option<&'a dyn Tracker>,
}

impl<'a> HyperparameterTuner<'a> {
    pub fn new(config: TuningConfig) -> Self {
        Self { config, tracker: None }
    }

    /// Log per-trial losses and the best values to `tracker`
    pub fn with_tracker(mut self, tracker: &'a dyn Tracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Run `max_evals` trials, each fitting a fresh model on the training split.
    #[allow(clippy::too_many_arguments)]
    pub fn tune(
        &self,
        x_train: &DataFrame,
        y_train: &Series,
        x_val: &DataFrame,
        y_val: &Series,
        model_config: &ModelConfig,
        search_space: &SearchSpace,
        max_evals: usize,
    ) -> Result<BestHyperparameters> {
        let kind = model_config.kind().inspect_err(|e| {
            error!(model = %model_config.model_name, error = %e, "Unsupported model");
        })?;
        if !kind.is_tunable() {
            error!(model = %kind, "Model is not tunable");
            return Err(PipelineError::UnsupportedModel(format!(
                "{} has no tunable hyperparameters",
                kind
            )));
        }

        let feature_names = column_names(x_train);
        let x_tr = columns_to_array2(x_train, &feature_names)?;
        let y_tr = series_to_array1(y_train)?;
        let x_va = columns_to_array2(x_val, &feature_names)?;
        let y_va = series_to_array1(y_val)?;
        if x_tr.nrows() != y_tr.len() || x_va.nrows() != y_va.len() {
            error!(
                train_rows = x_tr.nrows(),
                train_targets = y_tr.len(),
                val_rows = x_va.nrows(),
                val_targets = y_va.len(),
                "Feature/target length mismatch"
            );
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} train / {} validation targets", x_tr.nrows(), x_va.nrows()),
                actual: format!("{} train / {} validation targets", y_tr.len(), y_va.len()),
            });
        }

        let base_params = model_config.params();
        let seed_param = (search_space.get("random_state").is_none() && !base_params.contains_key("random_state"))
            .then(|| ParameterValue::Int(self.config.seed as i64));

        let config = TuningConfig {
            max_evals,
            ..self.config.clone()
        };
        let mut optimizer = HyperOptimizer::new(config, search_space.clone())?;

        let study = optimizer.minimize(|trial_params| {
            let mut params = base_params.clone();
            params.extend(trial_params.iter().map(|(k, v)| (k.clone(), v.clone())));
            if let Some(seed) = &seed_param {
                params.insert("random_state".to_string(), seed.clone());
            }
            let estimator = fit_estimator(kind, &params, &x_tr, &y_tr)?;
            let predictions = estimator.predict(&x_va)?;
            Ok(-r2_score(&y_va, &predictions)?)
        })?;

        if let Some(tracker) = self.tracker {
            for trial in &study.trials {
                tracker.log_metric("trial_loss", trial.loss, Some(trial.trial_id as u64))?;
            }
        }

        let best = study.best_trial().cloned().ok_or_else(|| {
            error!(n_trials = study.n_trials(), "Every tuning trial failed");
            PipelineError::Optimization(format!("all {} tuning trials failed", study.n_trials()))
        })?;
        debug_assert_eq!(best.status, TrialStatus::Complete);

        info!(
            trial_id = best.trial_id,
            r2 = -best.loss,
            params = ?best.params,
            "Best hyperparameters found"
        );

        if let Some(tracker) = self.tracker {
            for (name, value) in &best.params {
                tracker.log_param(&format!("best_{}", name), &value.to_string())?;
            }
            tracker.log_metric("best_r2", -best.loss, None)?;
        }

        Ok(BestHyperparameters {
            params: best.params,
            loss: best.loss,
            trial_id: best.trial_id,
            study,
        })
    }
}
