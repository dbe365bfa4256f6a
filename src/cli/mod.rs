//! Regression workflow CLI module
//!
//! Command-line interface for training, cleaning and evaluation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{PipelineConfig, S3Location, SinkConfig, SourceConfig, TrackingConfig};
use crate::evaluation::{EvaluationResult, Evaluator};
use crate::ingest::{DataSink, DataSource, LocalCsvSink, LocalCsvSource, TextEncoding};
use crate::optimizer::TuningConfig;
use crate::pipeline::{PipelineReport, TrainingPipeline};
use crate::preprocessing::CleaningArtifact;
use crate::training::{ModelKind, TrainedModel};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "regflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regression training workflow: ingest, clean, split, train, tune, evaluate")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Built-in cleaning presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// E-commerce order reviews, target `review_score`
    OrderReviews,
}

impl Preset {
    fn config(self) -> PipelineConfig {
        match self {
            Preset::OrderReviews => PipelineConfig::order_reviews(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train(TrainArgs),

    /// Clean a CSV and write the cleaned dataset
    Clean {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline configuration (JSON); only the cleaning section is used
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Built-in cleaning preset
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Target column, protected from imputation
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Score a saved model on a CSV
    Evaluate {
        /// Model JSON written by `train --model-output`
        #[arg(short, long)]
        model: PathBuf,

        /// CSV with the target column; raw when `--cleaning` is given, cleaned otherwise
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Cleaning state saved with the model (`<model>.cleaning.json`)
        #[arg(long)]
        cleaning: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// Pipeline configuration (JSON); flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Built-in preset used when no config file is given
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Local CSV file
    #[arg(short, long, conflicts_with = "s3_bucket")]
    pub data: Option<PathBuf>,

    /// S3 bucket holding the CSV
    #[arg(long, requires = "s3_key")]
    pub s3_bucket: Option<String>,

    /// Object key of the CSV
    #[arg(long, requires = "s3_bucket")]
    pub s3_key: Option<String>,

    /// AWS region (defaults to AWS_REGION, then us-east-1)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom S3 endpoint, e.g. a local MinIO
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Text encoding of the CSV (utf-8, latin-1)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Target column name
    #[arg(short, long)]
    pub target: Option<String>,

    /// Model (LinearRegression, RandomForestRegressor)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Tune hyperparameters before the final fit
    #[arg(long)]
    pub tune: bool,

    /// Number of tuning trials
    #[arg(long)]
    pub max_evals: Option<usize>,

    /// Seed for the split and the tuner
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of rows used for validation
    #[arg(long)]
    pub test_size: Option<f64>,

    /// Where to write the fitted model JSON
    #[arg(long)]
    pub model_output: Option<PathBuf>,

    /// Where to write the cleaned dataset (local path or s3://bucket/key)
    #[arg(long)]
    pub processed_output: Option<String>,

    /// Tracking directory
    #[arg(long)]
    pub tracking_dir: Option<PathBuf>,

    /// Experiment name
    #[arg(long)]
    pub experiment: Option<String>,

    /// Disable run tracking
    #[arg(long)]
    pub no_tracking: bool,
}

// ─── Configuration assembly ────────────────────────────────────────────────────

fn base_config(config: Option<&Path>, preset: Option<Preset>) -> anyhow::Result<PipelineConfig> {
    Ok(match (config, preset) {
        (Some(path), _) => PipelineConfig::from_file(path)?,
        (None, Some(preset)) => preset.config(),
        (None, None) => PipelineConfig::default(),
    })
}

/// Parse `s3://bucket/key` into its parts
fn parse_s3_uri(uri: &str) -> Option<(String, String)> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    (!bucket.is_empty() && !key.is_empty()).then(|| (bucket.to_string(), key.to_string()))
}

/// Merge the config file (or preset) with command-line overrides
pub fn build_train_config(args: &TrainArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = base_config(args.config.as_deref(), args.preset)?;
    let encoding = args
        .encoding
        .as_deref()
        .map(str::parse::<TextEncoding>)
        .transpose()?;

    if let Some(data) = &args.data {
        config.source = SourceConfig::Local {
            path: data.clone(),
            encoding: encoding.unwrap_or_default(),
            allow_empty: true,
        };
    } else if let (Some(bucket), Some(key)) = (&args.s3_bucket, &args.s3_key) {
        let mut location = S3Location::new(bucket, key);
        location.region = args.region.clone();
        location.endpoint = args.endpoint.clone();
        config.source = SourceConfig::S3 {
            location,
            encoding: encoding.unwrap_or_default(),
            allow_empty: true,
        };
    } else if let Some(requested) = encoding {
        match &mut config.source {
            SourceConfig::Local { encoding, .. } | SourceConfig::S3 { encoding, .. } => *encoding = requested,
        }
    }

    if let Some(target) = &args.target {
        config = config.with_target(target);
    }
    if let Some(model) = &args.model {
        let kind: ModelKind = model.parse()?;
        if kind.as_str() != config.model.model_name {
            config.model = crate::training::ModelConfig::new(kind.as_str());
        }
    }
    if args.tune || args.max_evals.is_some() {
        let mut tuning = config.tuning.take().unwrap_or_else(TuningConfig::new);
        if let Some(max_evals) = args.max_evals {
            tuning.max_evals = max_evals;
        }
        config.tuning = Some(tuning);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(test_size) = args.test_size {
        config = config.with_test_size(test_size);
    }
    if let Some(path) = &args.model_output {
        config = config.with_model_output(path);
    }
    if let Some(output) = &args.processed_output {
        let sink = match parse_s3_uri(output) {
            Some((bucket, key)) => {
                let mut location = S3Location::new(bucket, key);
                location.region = args.region.clone();
                location.endpoint = args.endpoint.clone();
                SinkConfig::S3 { location }
            }
            None => SinkConfig::Local { path: PathBuf::from(output) },
        };
        config = config.with_sink(sink);
    }
    if let Some(dir) = &args.tracking_dir {
        config = config.with_tracking_dir(dir);
    }
    if let Some(experiment) = &args.experiment {
        config.tracking.experiment = experiment.clone();
    }
    if args.no_tracking {
        config.tracking = TrackingConfig {
            enabled: false,
            ..config.tracking
        };
    }

    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(args: &TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let config = build_train_config(args)?;
    kv("Source", &config.source.describe());
    kv("Target", &config.split.target_column);
    kv("Model", &config.model.model_name);
    if let Some(tuning) = &config.tuning {
        kv("Tuning", &format!("{} trials", tuning.max_evals));
    }
    println!();

    step_run("Running pipeline");
    let start = Instant::now();
    let report = TrainingPipeline::new(config).run()?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_report(&report);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    section("Data");
    kv("Rows ingested", &report.rows_ingested.to_string());
    kv("Rows cleaned", &report.rows_cleaned.to_string());
    kv("Train / val", &format!("{} / {}", report.n_train, report.n_val));

    if let Some(best) = &report.best_hyperparameters {
        section("Tuning");
        kv("Trials", &best.study.n_trials().to_string());
        kv("Failed", &best.study.n_failed().to_string());
        kv("Best val R²", &format!("{:.4}", best.r2()));
        for (name, value) in &best.params {
            kv(name, &value.to_string());
        }
    }

    section("Evaluation");
    println!("  {:<18} {}", muted("R²"), format!("{:.4}", report.evaluation.r2).white().bold());
    kv("RMSE", &format!("{:.4}", report.evaluation.rmse));
    kv("MSE", &format!("{:.4}", report.evaluation.mse));
    kv("MAE", &format!("{:.4}", report.evaluation.mae));

    if let Some(importances) = &report.feature_importances {
        let mut ranked = importances.clone();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        section("Top features");
        for (name, importance) in ranked.iter().take(5) {
            kv(name, &format!("{:.4}", importance));
        }
    }

    println!();
    if let Some(run_id) = &report.run_id {
        step_ok(&format!("Run {}", run_id.cyan()));
    }
    if let Some(path) = &report.model_path {
        step_ok(&format!("Model saved → {}", path.display()));
    }
    println!();
}

pub fn cmd_clean(
    data_path: &Path,
    output_path: &Path,
    config: Option<&Path>,
    preset: Option<Preset>,
    target: Option<&str>,
) -> anyhow::Result<()> {
    section("Clean");

    let mut pipeline_config = base_config(config, preset)?
        .with_source(SourceConfig::local(data_path))
        .with_sink(SinkConfig::Local { path: output_path.to_path_buf() });
    if let Some(target) = target {
        pipeline_config = pipeline_config.with_target(target);
    }

    step_run("Cleaning");
    let start = Instant::now();
    let pipeline = TrainingPipeline::new(pipeline_config);
    let sink = LocalCsvSink::new();
    let cleaned = pipeline.clean(&LocalCsvSource::new(), Some(&sink as &dyn DataSink))?;
    step_done(&format!("{:.2?}", start.elapsed()));

    kv("Rows", &cleaned.height().to_string());
    kv("Columns", &cleaned.frame.width().to_string());
    kv("Encoded", &cleaned.encodings.len().to_string());
    kv("Imputed", &cleaned.medians.len().to_string());
    println!();
    step_ok(&format!("Saved → {}", output_path.display()));
    println!();
    Ok(())
}

/// Score a saved model on a CSV, cleaning it first when a cleaning state is given
pub fn score_csv(
    model_path: &Path,
    data_path: &Path,
    target: &str,
    cleaning: Option<&Path>,
) -> anyhow::Result<EvaluationResult> {
    let model = TrainedModel::load(model_path)?;
    let mut df = LocalCsvSource::new().read(&data_path.to_string_lossy())?;
    if let Some(path) = cleaning {
        df = CleaningArtifact::load(path)?.apply(&df)?.frame;
    }

    let y = df
        .column(target)
        .map_err(|_| anyhow::anyhow!("target column '{}' not found", target))?
        .as_materialized_series()
        .clone();
    Ok(Evaluator::new().evaluate(&model, &df, &y)?)
}

pub fn cmd_evaluate(
    model_path: &Path,
    data_path: &Path,
    target: &str,
    cleaning: Option<&Path>,
) -> anyhow::Result<()> {
    section("Evaluate");
    kv("Model", &model_path.display().to_string());
    kv("Data", &data_path.display().to_string());
    if let Some(path) = cleaning {
        kv("Cleaning", &path.display().to_string());
    }
    println!();

    step_run("Scoring");
    let start = Instant::now();
    let result = score_csv(model_path, data_path, target, cleaning)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    println!("  {:<18} {}", muted("R²"), format!("{:.4}", result.r2).white().bold());
    kv("RMSE", &format!("{:.4}", result.rmse));
    kv("MSE", &format!("{:.4}", result.mse));
    kv("MAE", &format!("{:.4}", result.mae));
    kv("Samples", &result.n_samples.to_string());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() {
        assert_eq!(
            parse_s3_uri("s3://bucket/processed/houses.csv"),
            Some(("bucket".to_string(), "processed/houses.csv".to_string()))
        );
        assert_eq!(parse_s3_uri("out/houses.csv"), None);
        assert_eq!(parse_s3_uri("s3://bucket"), None);
    }

    #[test]
    fn test_train_flags_override_preset() {
        let args = TrainArgs {
            preset: Some(Preset::OrderReviews),
            data: Some(PathBuf::from("orders.csv")),
            model: Some("linear_regression".to_string()),
            seed: Some(7),
            processed_output: Some("s3://bucket/processed_house_prices.csv".to_string()),
            no_tracking: true,
            ..TrainArgs::default()
        };
        let config = build_train_config(&args).unwrap();

        assert_eq!(config.model.model_name, "LinearRegression");
        assert_eq!(config.split.random_state, 7);
        assert_eq!(config.split.target_column, "review_score");
        assert!(!config.tracking.enabled);
        assert!(config.tuning.is_none());
        assert!(matches!(config.sink, Some(SinkConfig::S3 { .. })));
        assert_eq!(config.source.describe(), "orders.csv");
    }

    #[test]
    fn test_tune_flag_enables_tuning() {
        let args = TrainArgs {
            data: Some(PathBuf::from("houses.csv")),
            target: Some("Price".to_string()),
            tune: true,
            max_evals: Some(4),
            ..TrainArgs::default()
        };
        let config = build_train_config(&args).unwrap();
        assert_eq!(config.tuning.as_ref().unwrap().max_evals, 4);
        assert_eq!(config.cleaning.target_column.as_deref(), Some("Price"));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let args = TrainArgs {
            model: Some("SVR".to_string()),
            ..TrainArgs::default()
        };
        assert!(build_train_config(&args).is_err());
    }

    #[test]
    fn test_score_raw_csv_with_saved_cleaning() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("id,area,city,Price\n");
        for i in 0..60 {
            let area = if i % 7 == 0 { "NA".to_string() } else { (40 + (i * 13) % 90).to_string() };
            let city = ["north", "south"][i % 2];
            let price = 100 + 3 * ((i * 13) % 90) + if city == "south" { 25 } else { 0 };
            csv.push_str(&format!("{},{},{},{}\n", i, area, city, price));
        }
        let data = dir.path().join("houses.csv");
        std::fs::write(&data, csv).unwrap();

        let args = TrainArgs {
            data: Some(data.clone()),
            target: Some("Price".to_string()),
            model: Some("LinearRegression".to_string()),
            model_output: Some(dir.path().join("model.json")),
            no_tracking: true,
            ..TrainArgs::default()
        };
        let mut config = build_train_config(&args).unwrap();
        config.cleaning = config
            .cleaning
            .with_drop_columns(&["id"])
            .with_median_columns(&["area"])
            .with_categorical_columns(&["city"]);
        TrainingPipeline::new(config).run().unwrap();

        let cleaning = dir.path().join("model.cleaning.json");
        let result = score_csv(&dir.path().join("model.json"), &data, "Price", Some(&cleaning)).unwrap();
        assert_eq!(result.n_samples, 60);
        assert!(result.r2.is_finite());

        // Raw rows without the cleaning state still carry text and missing columns
        assert!(score_csv(&dir.path().join("model.json"), &data, "Price", None).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "regflow", "train", "--data", "houses.csv", "--target", "Price", "--tune", "--max-evals", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Train(args) => {
                assert!(args.tune);
                assert_eq!(args.max_evals, Some(5));
            }
            _ => panic!("expected train"),
        }
        assert!(Cli::try_parse_from(["regflow", "train", "--s3-bucket", "b"]).is_err());
    }
}
