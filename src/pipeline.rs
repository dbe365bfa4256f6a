//! End-to-end training pipeline
//!
//! Source → clean → (sink) → split → (tune) → train → evaluate, with the run
//! recorded by an [`ExperimentTracker`] created for the duration of the run.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::evaluation::{EvaluationResult, Evaluator};
use crate::ingest::{DataSink, DataSource};
use crate::optimizer::{BestHyperparameters, HyperparameterTuner};
use crate::preprocessing::{CleanedDataset, CleaningArtifact, CleaningStrategy, DataCleaning, DataStrategy, SplitStrategy};
use crate::tracking::{ExperimentTracker, RunStatus, Tracker};
use crate::training::{ModelTrainer, ParameterValue, TrainedModel};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub rows_ingested: usize,
    pub rows_cleaned: usize,
    pub n_train: usize,
    pub n_val: usize,
    pub best_hyperparameters: Option<BestHyperparameters>,
    pub evaluation: EvaluationResult,
    pub run_id: Option<String>,
    pub model_path: Option<PathBuf>,
    /// Cleaning state saved next to the model, for scoring raw data later
    pub cleaning_path: Option<PathBuf>,
    pub feature_importances: Option<Vec<(String, f64)>>,
    pub elapsed_secs: f64,
}

/// Runs one configured training workflow
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run with the source and sink described by the configuration
    pub fn run(&self) -> Result<PipelineReport> {
        self.config.validate()?;
        let source = self.config.source.build()?;
        let sink = self.config.sink.as_ref().map(|s| s.build()).transpose()?;
        self.run_with(source.as_ref(), sink.as_deref())
    }

    /// Run against explicit collaborators
    pub fn run_with(&self, source: &dyn DataSource, sink: Option<&dyn DataSink>) -> Result<PipelineReport> {
        self.config.validate()?;

        let tracker = if self.config.tracking.enabled {
            Some(ExperimentTracker::new(
                &self.config.tracking.output_dir,
                &self.config.tracking.experiment,
            )?)
        } else {
            None
        };
        let tracker_ref = tracker.as_ref().map(|t| t as &dyn Tracker);

        let run_id = match tracker_ref {
            Some(t) => Some(t.start_run(self.config.tracking.run_name.as_deref())?),
            None => None,
        };

        match self.execute(source, sink, tracker_ref) {
            Ok(mut report) => {
                if let Some(t) = tracker_ref {
                    t.end_run(RunStatus::Finished)?;
                }
                report.run_id = run_id;
                info!(
                    r2 = report.evaluation.r2,
                    rmse = report.evaluation.rmse,
                    elapsed_secs = report.elapsed_secs,
                    "Pipeline finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Pipeline failed");
                if let Some(t) = tracker_ref {
                    if let Err(end_err) = t.end_run(RunStatus::Failed) {
                        warn!(error = %end_err, "Failed to close run");
                    }
                }
                Err(e)
            }
        }
    }

    /// Read and clean the configured source, writing the result to `sink` when given
    pub fn clean(&self, source: &dyn DataSource, sink: Option<&dyn DataSink>) -> Result<CleanedDataset> {
        let df = source.read(&self.config.source.key())?;
        info!(source = %source.describe(), rows = df.height(), columns = df.width(), "Ingested dataset");

        let cleaned = DataCleaning::new(
            df,
            DataStrategy::Preprocess(CleaningStrategy::new(self.config.cleaning.clone())),
        )
        .handle_data()?
        .into_cleaned()?;

        if let (Some(sink), Some(sink_config)) = (sink, self.config.sink.as_ref()) {
            let mut frame = cleaned.frame.clone();
            sink.write(&mut frame, &sink_config.destination())?;
        }
        Ok(cleaned)
    }

    fn execute(
        &self,
        source: &dyn DataSource,
        sink: Option<&dyn DataSink>,
        tracker: Option<&dyn Tracker>,
    ) -> Result<PipelineReport> {
        let start = Instant::now();
        let config = &self.config;

        let df = source.read(&config.source.key())?;
        let rows_ingested = df.height();
        info!(source = %source.describe(), rows = rows_ingested, columns = df.width(), "Ingested dataset");

        if let Some(t) = tracker {
            let mut params = BTreeMap::new();
            params.insert("source".to_string(), config.source.describe());
            params.insert("target_column".to_string(), config.split.target_column.clone());
            params.insert("test_size".to_string(), config.split.test_size.to_string());
            params.insert("split_random_state".to_string(), config.split.random_state.to_string());
            t.log_params(&params)?;
        }

        let cleaned = DataCleaning::new(
            df,
            DataStrategy::Preprocess(CleaningStrategy::new(config.cleaning.clone())),
        )
        .handle_data()?
        .into_cleaned()?;
        let rows_cleaned = cleaned.height();
        let cleaning = CleaningArtifact::new(config.cleaning.clone(), cleaned.fitted());

        if let (Some(sink), Some(sink_config)) = (sink, config.sink.as_ref()) {
            let mut frame = cleaned.frame.clone();
            sink.write(&mut frame, &sink_config.destination())?;
        }

        let split = DataCleaning::new(
            cleaned.frame,
            DataStrategy::Split(SplitStrategy::from(config.split.clone())),
        )
        .handle_data()?
        .into_split()?;
        info!(n_train = split.n_train(), n_val = split.n_val(), "Split dataset");

        let (model_config, best_hyperparameters) = match &config.tuning {
            Some(tuning) => {
                let mut tuner = HyperparameterTuner::new(tuning.clone());
                if let Some(t) = tracker {
                    tuner = tuner.with_tracker(t);
                }
                let best = tuner.tune(
                    &split.x_train,
                    &split.y_train,
                    &split.x_val,
                    &split.y_val,
                    &config.model,
                    &tuning.search_space(),
                    tuning.max_evals,
                )?;
                let mut tuned = best.apply_to(&config.model);
                if !tuned.params().contains_key("random_state") {
                    tuned = tuned.with_param("random_state", ParameterValue::Int(tuning.seed as i64));
                }
                (tuned, Some(best))
            }
            None => (config.model.clone(), None),
        };

        let mut trainer = ModelTrainer::new();
        if let Some(t) = tracker {
            trainer = trainer.with_tracker(t);
        }
        let model = trainer.train(&split.x_train, &split.y_train, &model_config)?;

        let mut evaluator = Evaluator::new();
        if let Some(t) = tracker {
            evaluator = evaluator.with_tracker(t);
        }
        let evaluation = evaluator.evaluate(&model, &split.x_val, &split.y_val)?;

        let model_path = self.persist_model(&model, tracker)?;
        let cleaning_path = self.persist_cleaning(&cleaning)?;

        Ok(PipelineReport {
            rows_ingested,
            rows_cleaned,
            n_train: split.n_train(),
            n_val: split.n_val(),
            best_hyperparameters,
            evaluation,
            run_id: None,
            model_path,
            cleaning_path,
            feature_importances: model.feature_importances(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn persist_cleaning(&self, cleaning: &CleaningArtifact) -> Result<Option<PathBuf>> {
        let Some(output) = &self.config.model_output else {
            return Ok(None);
        };
        let path = CleaningArtifact::path_for_model(output);
        cleaning.save(&path)?;
        info!(path = %path.display(), "Saved cleaning state");
        Ok(Some(path))
    }

    fn persist_model(&self, model: &TrainedModel, tracker: Option<&dyn Tracker>) -> Result<Option<PathBuf>> {
        let mut path = None;
        if let Some(output) = &self.config.model_output {
            model.save(output)?;
            info!(path = %output.display(), "Saved model");
            path = Some(output.clone());
        }
        if let Some(t) = tracker {
            let mut metadata = BTreeMap::new();
            metadata.insert("n_features".to_string(), model.feature_names().len().to_string());
            metadata.insert("n_train_samples".to_string(), model.n_train_samples().to_string());
            metadata.insert("trained_at".to_string(), model.trained_at().to_rfc3339());
            let artifact = t.log_model(model, &metadata)?;
            path.get_or_insert(artifact);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SinkConfig, SourceConfig, TrackingConfig};
    use crate::error::PipelineError;
    use crate::ingest::{LocalCsvSink, LocalCsvSource};
    use crate::optimizer::TuningConfig;
    use crate::preprocessing::CleaningConfig;
    use crate::training::ModelConfig;
    use std::fmt::Write as _;

    fn write_dataset(dir: &std::path::Path) -> PathBuf {
        let mut csv = String::from("id,area,rooms,city,Price\n");
        for i in 0..100 {
            let area = 40 + (i * 13) % 90;
            let rooms = 1 + i % 4;
            let city = ["north", "south", "east"][i % 3];
            let area_field = if i % 17 == 0 { String::new() } else { area.to_string() };
            let price = 2 * area + 15 * rooms + if city == "south" { 30 } else { 0 };
            writeln!(csv, "{},{},{},{},{}", i, area_field, rooms, city, price).unwrap();
        }
        let path = dir.join("houses.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn config(dir: &std::path::Path, data: PathBuf) -> PipelineConfig {
        PipelineConfig::new()
            .with_source(SourceConfig::local(data))
            .with_cleaning(
                CleaningConfig::new()
                    .with_drop_columns(&["id"])
                    .with_median_columns(&["area"])
                    .with_categorical_columns(&["city"]),
            )
            .with_target("Price")
            .with_model(ModelConfig::new("LinearRegression"))
            .with_tracking_dir(dir.join("runs"))
    }

    #[test]
    fn test_linear_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let config = config(dir.path(), data.clone())
            .with_sink(SinkConfig::Local { path: dir.path().join("clean.csv") })
            .with_model_output(dir.path().join("model.json"));

        let report = TrainingPipeline::new(config).run().unwrap();
        assert_eq!(report.rows_ingested, 100);
        assert_eq!(report.rows_cleaned, 100);
        assert_eq!((report.n_train, report.n_val), (80, 20));
        assert_eq!(report.evaluation.n_samples, 20);
        assert!(report.evaluation.r2 > 0.5);
        assert!(dir.path().join("clean.csv").exists());
        assert_eq!(report.model_path, Some(dir.path().join("model.json")));
        assert_eq!(report.cleaning_path, Some(dir.path().join("model.cleaning.json")));

        // Raw rows cleaned with the saved state score like the validation split did
        let cleaning = CleaningArtifact::load(dir.path().join("model.cleaning.json")).unwrap();
        let raw = LocalCsvSource::new().read(&data.to_string_lossy()).unwrap();
        let cleaned = cleaning.apply(&raw).unwrap();
        let model = TrainedModel::load(dir.path().join("model.json")).unwrap();
        assert_eq!(model.predict(&cleaned.frame).unwrap().len(), 100);

        let tracker = ExperimentTracker::new(dir.path().join("runs"), "rf_regressor_experiment").unwrap();
        let runs = tracker.load_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(Some(runs[0].run_id.clone()), report.run_id);
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert!(runs[0].metrics.contains_key("r2"));
        assert_eq!(runs[0].params["model_name"], "LinearRegression");
        assert!(runs[0].artifacts.contains(&"artifacts/model.json".to_string()));
    }

    #[test]
    fn test_tuned_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let config = config(dir.path(), data)
            .with_model(ModelConfig::new("RandomForestRegressor"))
            .with_tuning(TuningConfig::new().with_max_evals(3).with_search_space(
                crate::optimizer::SearchSpace::new()
                    .int_choice("n_estimators", 3..6)
                    .int_choice("max_depth", 2..5),
            ));

        let report = TrainingPipeline::new(config).run().unwrap();
        let best = report.best_hyperparameters.unwrap();
        assert_eq!(best.study.n_trials(), 3);
        assert!(report.feature_importances.is_some());
        assert!(report.run_id.is_some());
    }

    #[test]
    fn test_failed_run_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let config = config(dir.path(), data).with_target("missing_target");

        let err = TrainingPipeline::new(config).run().unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));

        let tracker = ExperimentTracker::new(dir.path().join("runs"), "rf_regressor_experiment").unwrap();
        let runs = tracker.load_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), dir.path().join("nope.csv")).with_tracking(TrackingConfig {
            enabled: false,
            ..TrackingConfig::default()
        });
        let err = TrainingPipeline::new(config).run().unwrap_err();
        assert_eq!(err.source_kind(), Some(crate::error::SourceIoKind::NotFound));
    }

    #[test]
    fn test_clean_only() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let output = dir.path().join("out/clean.csv");
        let pipeline = TrainingPipeline::new(
            config(dir.path(), data).with_sink(SinkConfig::Local { path: output.clone() }),
        );
        let cleaned = pipeline
            .clean(&LocalCsvSource::new(), Some(&LocalCsvSink::new()))
            .unwrap();
        assert_eq!(cleaned.height(), 100);
        assert!(cleaned.encodings.contains_key("city"));
        assert!(output.exists());
    }
}
