//! Integration test: hyperparameter tuning with a fixed trial budget

use polars::prelude::*;
use regression_workflow::optimizer::{HyperOptimizer, SamplerKind, TrialStatus};
use regression_workflow::prelude::*;

fn noisy_plane(n: usize, offset: usize) -> (DataFrame, Series) {
    let x1: Vec<f64> = (0..n).map(|i| ((i + offset) % 23) as f64).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i + offset) * 7 % 17) as f64).collect();
    let y: Vec<f64> = x1
        .iter()
        .zip(&x2)
        .enumerate()
        .map(|(i, (a, b))| 3.0 * a - 2.0 * b + (i % 3) as f64 * 0.5)
        .collect();
    let x = df!("x1" => &x1, "x2" => &x2).unwrap();
    (x, Series::new("y".into(), y))
}

fn tiny_forest_space() -> SearchSpace {
    SearchSpace::new()
        .int_choice("n_estimators", 3..8)
        .int_choice("max_depth", 2..6)
        .uniform("min_samples_split", 0.1, 0.5)
}

#[test]
fn test_tuner_runs_exactly_max_evals_trials() {
    let (x_train, y_train) = noisy_plane(60, 0);
    let (x_val, y_val) = noisy_plane(20, 5);

    for max_evals in [1, 5, 12] {
        let tuner = HyperparameterTuner::new(TuningConfig::new().with_n_startup_trials(3));
        let best = tuner
            .tune(
                &x_train,
                &y_train,
                &x_val,
                &y_val,
                &ModelConfig::new("RandomForestRegressor"),
                &tiny_forest_space(),
                max_evals,
            )
            .unwrap();
        assert_eq!(best.study.n_trials(), max_evals);
        assert!(tiny_forest_space().contains(&best.params));
        assert_eq!(best.r2(), -best.loss);
    }
}

#[test]
fn test_same_seed_same_trials() {
    let (x_train, y_train) = noisy_plane(50, 0);
    let (x_val, y_val) = noisy_plane(15, 3);

    let run = |seed: u64| {
        HyperparameterTuner::new(TuningConfig::new().with_seed(seed).with_n_startup_trials(2))
            .tune(
                &x_train,
                &y_train,
                &x_val,
                &y_val,
                &ModelConfig::new("RandomForestRegressor"),
                &tiny_forest_space(),
                6,
            )
            .unwrap()
    };

    let a = run(9);
    let b = run(9);
    let params = |best: &BestHyperparameters| -> Vec<Hyperparameters> {
        best.study.trials.iter().map(|t| t.params.clone()).collect()
    };
    assert_eq!(params(&a), params(&b));
    assert_eq!(a.loss, b.loss);
}

#[test]
fn test_linear_model_cannot_be_tuned() {
    let (x, y) = noisy_plane(20, 0);
    let err = HyperparameterTuner::new(TuningConfig::new())
        .tune(&x, &y, &x, &y, &ModelConfig::new("LinearRegression"), &tiny_forest_space(), 3)
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedModel(_)));
}

#[test]
fn test_optimizer_records_failed_trials() {
    let space = SearchSpace::new().uniform("x", -1.0, 1.0);
    let config = TuningConfig::new().with_max_evals(8).with_sampler(SamplerKind::Random);
    let mut optimizer = HyperOptimizer::new(config, space).unwrap();

    let mut calls = 0;
    let study = optimizer
        .minimize(|params| {
            calls += 1;
            let x = params["x"].as_f64().unwrap();
            if calls % 2 == 0 {
                Err(PipelineError::Training("diverged".to_string()))
            } else {
                Ok(x * x)
            }
        })
        .unwrap();

    assert_eq!(study.n_trials(), 8);
    assert_eq!(study.n_failed(), 4);
    let best = study.best_trial().unwrap();
    assert_eq!(best.status, TrialStatus::Complete);
    assert!(study
        .trials
        .iter()
        .filter(|t| t.status == TrialStatus::Complete)
        .all(|t| t.loss >= best.loss));
}
