//! Pipeline configuration
//!
//! A [`PipelineConfig`] is loaded from a JSON file where every section is
//! optional, then adjusted with the `with_*` builders (the CLI maps its flags
//! onto those).

use crate::error::{PipelineError, Result};
use crate::ingest::{
    AwsCredentials, DataSink, DataSource, LocalCsvSink, LocalCsvSource, S3Client, S3Config, S3CsvSink,
    S3CsvSource, TextEncoding,
};
use crate::optimizer::TuningConfig;
use crate::preprocessing::{CleaningConfig, SplitConfig};
use crate::training::{ModelConfig, ModelKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

/// Explicit S3 credentials; the `AWS_*` environment variables are used when absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl From<&CredentialsConfig> for AwsCredentials {
    fn from(config: &CredentialsConfig) -> Self {
        let credentials = AwsCredentials::new(&config.access_key_id, &config.secret_access_key);
        match &config.session_token {
            Some(token) => credentials.with_session_token(token),
            None => credentials,
        }
    }
}

/// Bucket connection shared by the S3 source and sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsConfig>,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            region: None,
            endpoint: None,
            credentials: None,
        }
    }

    /// Build a client for this bucket
    pub fn client(&self) -> Result<S3Client> {
        let mut config = S3Config::new(&self.bucket);
        if let Some(region) = &self.region {
            config = config.with_region(region);
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        let client = S3Client::new(config)?;
        Ok(match &self.credentials {
            Some(credentials) => client.with_credentials(credentials.into()),
            None => client,
        })
    }
}

/// Where the raw dataset comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Local {
        path: PathBuf,
        #[serde(default)]
        encoding: TextEncoding,
        #[serde(default = "default_allow_empty")]
        allow_empty: bool,
    },
    S3 {
        #[serde(flatten)]
        location: S3Location,
        #[serde(default)]
        encoding: TextEncoding,
        #[serde(default = "default_allow_empty")]
        allow_empty: bool,
    },
}

fn default_allow_empty() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Local {
            path: PathBuf::from("data/olist_customers_dataset.csv"),
            encoding: TextEncoding::Utf8,
            allow_empty: true,
        }
    }
}

impl SourceConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        SourceConfig::Local {
            path: path.into(),
            encoding: TextEncoding::Utf8,
            allow_empty: true,
        }
    }

    pub fn s3(location: S3Location) -> Self {
        SourceConfig::S3 {
            location,
            encoding: TextEncoding::Utf8,
            allow_empty: true,
        }
    }

    /// Key handed to [`DataSource::read`]
    pub fn key(&self) -> String {
        match self {
            SourceConfig::Local { path, .. } => path.to_string_lossy().into_owned(),
            SourceConfig::S3 { location, .. } => location.key.clone(),
        }
    }

    /// Human-readable location for logs
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::Local { path, .. } => path.display().to_string(),
            SourceConfig::S3 { location, .. } => format!("s3://{}/{}", location.bucket, location.key),
        }
    }

    pub fn build(&self) -> Result<Box<dyn DataSource>> {
        Ok(match self {
            SourceConfig::Local {
                encoding, allow_empty, ..
            } => Box::new(
                LocalCsvSource::new()
                    .with_encoding(*encoding)
                    .allow_empty(*allow_empty),
            ),
            SourceConfig::S3 {
                location,
                encoding,
                allow_empty,
            } => Box::new(
                S3CsvSource::new(location.client()?)
                    .with_encoding(*encoding)
                    .allow_empty(*allow_empty),
            ),
        })
    }
}

/// Where the cleaned dataset is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Local {
        path: PathBuf,
    },
    S3 {
        #[serde(flatten)]
        location: S3Location,
    },
}

impl SinkConfig {
    pub fn destination(&self) -> String {
        match self {
            SinkConfig::Local { path } => path.to_string_lossy().into_owned(),
            SinkConfig::S3 { location } => location.key.clone(),
        }
    }

    pub fn build(&self) -> Result<Box<dyn DataSink>> {
        Ok(match self {
            SinkConfig::Local { .. } => Box::new(LocalCsvSink::new()),
            SinkConfig::S3 { location } => Box::new(S3CsvSink::new(location.client()?)),
        })
    }
}

/// Experiment tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub experiment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("mlruns"),
            experiment: "rf_regressor_experiment".to_string(),
            run_name: None,
        }
    }
}

/// Complete configuration of one training run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub cleaning: CleaningConfig,
    pub split: SplitConfig,
    pub model: ModelConfig,
    /// Tuning runs only when this section is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuning: Option<TuningConfig>,
    pub tracking: TrackingConfig,
    /// Destination for the cleaned dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkConfig>,
    /// Path for the fitted model JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_output: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration reproducing the order-review score workflow
    pub fn order_reviews() -> Self {
        Self {
            cleaning: CleaningConfig::order_reviews(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to read config");
            PipelineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Config(format!("invalid configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    pub fn with_cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = cleaning;
        self
    }

    /// Set the target column for both cleaning and splitting
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.cleaning.target_column = Some(target.clone());
        self.split.target_column = target;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.split.test_size = test_size;
        self
    }

    /// Seed for the split and, when tuning, for the sampler
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.random_state = seed;
        if let Some(tuning) = self.tuning.as_mut() {
            tuning.seed = seed;
        }
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model.model_name = name.into();
        self
    }

    pub fn with_tuning(mut self, tuning: TuningConfig) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn with_tracking(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn with_tracking_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tracking.output_dir = dir.into();
        self
    }

    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_model_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_output = Some(path.into());
        self
    }

    /// Check the configuration before any data is read
    pub fn validate(&self) -> Result<()> {
        let kind: ModelKind = self.model.kind().inspect_err(|e| {
            error!(model = %self.model.model_name, error = %e, "Unsupported model in configuration");
        })?;

        if self.split.target_column.trim().is_empty() {
            return Err(PipelineError::Config("target column must not be empty".to_string()));
        }
        if let Some(target) = &self.cleaning.target_column {
            if target != &self.split.target_column {
                return Err(PipelineError::Config(format!(
                    "cleaning target '{}' differs from split target '{}'",
                    target, self.split.target_column
                )));
            }
        }
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must lie in (0, 1), got {}",
                self.split.test_size
            )));
        }
        if let Some(tuning) = &self.tuning {
            tuning.validate()?;
            if !kind.is_tunable() {
                return Err(PipelineError::UnsupportedModel(format!(
                    "{} cannot be tuned",
                    kind
                )));
            }
        }
        if let SourceConfig::S3 { location, .. } = &self.source {
            if location.bucket.is_empty() || location.key.is_empty() {
                return Err(PipelineError::Config("S3 source needs a bucket and a key".to_string()));
            }
        }
        if self.tracking.enabled && self.tracking.experiment.trim().is_empty() {
            return Err(PipelineError::Config("experiment name must not be empty".to_string()));
        }
        Ok(())
    }
}
