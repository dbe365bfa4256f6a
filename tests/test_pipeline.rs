//! Integration test: Full pipeline (source → clean → split → train → evaluate)

use regression_workflow::prelude::*;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Synthetic order/review export with the columns the order-reviews preset expects
fn write_orders(dir: &Path, n: usize) -> PathBuf {
    let mut csv = String::from(
        "order_id,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,\
order_delivered_customer_date,order_estimated_delivery_date,customer_zip_code_prefix,order_item_id,\
price,freight_value,product_weight_g,product_length_cm,product_height_cm,product_width_cm,\
review_comment_message,review_score\n",
    );
    for i in 0..n {
        let price = 20.0 + ((i * 37) % 180) as f64;
        let freight = 5.0 + ((i * 11) % 40) as f64;
        let weight = if i % 9 == 0 { String::new() } else { (300 + (i * 53) % 2000).to_string() };
        let length = 10 + (i * 7) % 40;
        let height = 5 + (i * 3) % 20;
        let width = 8 + (i * 5) % 30;
        let comment = if i % 4 == 0 { "" } else { "ok" };
        let score = 1 + ((freight / price * 10.0) as usize + i % 2) % 5;
        writeln!(
            csv,
            "o{i},2018-01-01 10:00:00,2018-01-01 11:00:00,2018-01-02,2018-01-05,2018-01-10,{zip},1,\
{price},{freight},{weight},{length},{height},{width},{comment},{score}",
            zip = 10000 + i,
        )
        .unwrap();
    }
    let path = dir.join("orders.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

#[test]
fn test_order_reviews_preset_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_orders(dir.path(), 100);
    let processed = dir.path().join("processed.csv");

    let config = PipelineConfig::order_reviews()
        .with_source(SourceConfig::local(&data))
        .with_model(ModelConfig::new("LinearRegression"))
        .with_sink(SinkConfig::Local { path: processed.clone() })
        .with_tracking(TrackingConfig { enabled: false, ..TrackingConfig::default() });

    let report = TrainingPipeline::new(config).run().unwrap();
    assert_eq!(report.rows_ingested, 100);
    assert_eq!(report.rows_cleaned, 100);
    assert_eq!((report.n_train, report.n_val), (80, 20));
    assert!(report.run_id.is_none());
    assert!(report.evaluation.rmse.is_finite());
    assert!(report.evaluation.mse >= 0.0);

    let cleaned = LocalCsvSource::new().read(&processed.to_string_lossy()).unwrap();
    let names: Vec<String> = cleaned.get_column_names().iter().map(|s| s.to_string()).collect();
    assert!(names.contains(&"product_volume_cm3".to_string()));
    assert!(names.contains(&"freight_ratio".to_string()));
    assert!(!names.contains(&"customer_zip_code_prefix".to_string()));
    assert!(!names.contains(&"order_purchase_timestamp".to_string()));
    assert!(!names.contains(&"order_id".to_string()));
    assert_eq!(cleaned.column("product_weight_g").unwrap().null_count(), 0);
}

#[test]
fn test_tuned_forest_is_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_orders(dir.path(), 80);
    let runs = dir.path().join("mlruns");

    let config = PipelineConfig::order_reviews()
        .with_source(SourceConfig::local(&data))
        .with_tuning(
            TuningConfig::new().with_max_evals(4).with_search_space(
                SearchSpace::new()
                    .int_choice("n_estimators", 5..10)
                    .int_choice("max_depth", 2..6)
                    .int_choice("min_samples_leaf", 1..4),
            ),
        )
        .with_tracking_dir(&runs)
        .with_model_output(dir.path().join("model.json"));

    let report = TrainingPipeline::new(config).run().unwrap();
    let best = report.best_hyperparameters.as_ref().unwrap();
    assert_eq!(best.study.n_trials(), 4);
    assert!(best.params.contains_key("n_estimators"));
    assert!(report.feature_importances.is_some());

    let model = TrainedModel::load(dir.path().join("model.json")).unwrap();
    assert_eq!(model.kind(), ModelKind::RandomForestRegressor);
    assert_eq!(model.hyperparameters()["n_estimators"], best.params["n_estimators"]);

    let tracker = ExperimentTracker::new(&runs, "rf_regressor_experiment").unwrap();
    let best_run = tracker.best_run("r2", true).unwrap().unwrap();
    assert_eq!(Some(best_run.run_id.clone()), report.run_id);
    assert_eq!(best_run.status, RunStatus::Finished);
    assert!(best_run.params.contains_key("best_n_estimators"));
    assert_eq!(best_run.metric_history["trial_loss"].len(), 4);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_orders(dir.path(), 60);

    let run = || {
        let config = PipelineConfig::order_reviews()
            .with_source(SourceConfig::local(&data))
            .with_model(
                ModelConfig::new("RandomForestRegressor")
                    .with_param("n_estimators", 8)
                    .with_param("random_state", 3),
            )
            .with_seed(11)
            .with_tracking(TrackingConfig { enabled: false, ..TrackingConfig::default() });
        TrainingPipeline::new(config).run().unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.evaluation, second.evaluation);
}

#[test]
fn test_missing_target_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_orders(dir.path(), 30);
    let runs = dir.path().join("mlruns");

    let config = PipelineConfig::new()
        .with_source(SourceConfig::local(&data))
        .with_target("delivery_days")
        .with_tracking_dir(&runs);

    let err = TrainingPipeline::new(config).run().unwrap_err();
    assert!(matches!(err, PipelineError::DataIntegrity(_)), "unexpected error: {err}");

    let tracker = ExperimentTracker::new(&runs, "rf_regressor_experiment").unwrap();
    let recorded = tracker.load_runs().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, RunStatus::Failed);
}

#[test]
fn test_missing_source_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::order_reviews()
        .with_source(SourceConfig::local(dir.path().join("absent.csv")))
        .with_tracking(TrackingConfig { enabled: false, ..TrackingConfig::default() });

    let err = TrainingPipeline::new(config).run().unwrap_err();
    assert_eq!(err.source_kind(), Some(SourceIoKind::NotFound));
}

#[test]
fn test_tuning_linear_model_is_rejected() {
    let config = PipelineConfig::new()
        .with_model(ModelConfig::new("LinearRegression"))
        .with_tuning(TuningConfig::new());
    assert!(matches!(config.validate(), Err(PipelineError::UnsupportedModel(_))));
}
