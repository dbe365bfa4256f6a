//! Cleaning strategy: raw table to numeric, model-ready table

use super::config::CleaningConfig;
use super::encoder::LabelEncoder;
use super::features::{derive_feature, validate_feature};
use super::imputer::{column_median, fill_numeric, fill_text, missing_count};
use crate::error::{PipelineError, Result};
use crate::utils::{column_names, is_numeric_dtype};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Output of the cleaning strategy
#[derive(Debug, Clone)]
pub struct CleanedDataset {
    /// Numeric columns only, no nulls outside the target
    pub frame: DataFrame,
    /// Fitted encoders per categorical column
    pub encodings: BTreeMap<String, LabelEncoder>,
    /// Fill value used per imputed column
    pub medians: BTreeMap<String, f64>,
}

/// State learned while cleaning, reusable on new data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedCleaning {
    pub encodings: BTreeMap<String, LabelEncoder>,
    pub medians: BTreeMap<String, f64>,
}

impl CleanedDataset {
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Encoders and fill values, detached from the frame
    pub fn fitted(&self) -> FittedCleaning {
        FittedCleaning {
            encodings: self.encodings.clone(),
            medians: self.medians.clone(),
        }
    }
}

/// Cleaning configuration plus fitted state, stored next to a saved model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningArtifact {
    pub config: CleaningConfig,
    pub fitted: FittedCleaning,
}

impl CleaningArtifact {
    pub fn new(config: CleaningConfig, fitted: FittedCleaning) -> Self {
        Self { config, fitted }
    }

    /// `model.json` → `model.cleaning.json`
    pub fn path_for_model(model_path: impl AsRef<Path>) -> PathBuf {
        model_path.as_ref().with_extension("cleaning.json")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Clean raw data the way the training data was cleaned
    pub fn apply(&self, df: &DataFrame) -> Result<CleanedDataset> {
        CleaningStrategy::new(self.config.clone()).transform_with(df, &self.fitted)
    }
}

fn require_column(df: &DataFrame, name: &str, step: &str) -> Result<()> {
    if df.column(name).is_err() {
        error!(column = %name, step = %step, "Expected column is missing");
        return Err(PipelineError::DataIntegrity(format!(
            "column '{}' required by {} is missing",
            name, step
        )));
    }
    Ok(())
}

fn drop_all(df: DataFrame, columns: &[String], step: &str) -> Result<DataFrame> {
    for name in columns {
        require_column(&df, name, step)?;
    }
    Ok(df.drop_many(columns.iter().map(|s| s.as_str())))
}

/// Transforms a raw dataset into a [`CleanedDataset`]
#[derive(Debug, Clone, Default)]
pub struct CleaningStrategy {
    config: CleaningConfig,
}

impl CleaningStrategy {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Clean a dataset, learning medians and category encodings from it
    pub fn clean(&self, df: &DataFrame) -> Result<CleanedDataset> {
        self.run(df, None)
    }

    /// Clean new data with medians and encodings learned earlier.
    ///
    /// Categories not present in `fitted` are rejected. Columns without a
    /// recorded median fall back to the median of `df`.
    pub fn transform_with(&self, df: &DataFrame, fitted: &FittedCleaning) -> Result<CleanedDataset> {
        self.run(df, Some(fitted))
    }

    fn median_for(
        &self,
        df: &DataFrame,
        name: &str,
        fitted: Option<&FittedCleaning>,
    ) -> Result<f64> {
        if let Some(value) = fitted.and_then(|f| f.medians.get(name)) {
            return Ok(*value);
        }
        column_median(df, name)?.ok_or_else(|| {
            error!(column = %name, "Cannot impute a column with no observed values");
            PipelineError::DataIntegrity(format!("column '{}' has no non-missing values to impute from", name))
        })
    }

    fn run(&self, df: &DataFrame, fitted: Option<&FittedCleaning>) -> Result<CleanedDataset> {
        let config = &self.config;
        let target = config.target_column.as_deref();
        info!(rows = df.height(), cols = df.width(), "Cleaning dataset");

        if let Some(target) = target {
            require_column(df, target, "target")?;
        }
        for feature in &config.derived_features {
            validate_feature(feature, target)?;
        }

        let mut frame = drop_all(df.clone(), &config.drop_columns, "drop_columns")?;
        let mut medians = BTreeMap::new();
        let mut encodings = BTreeMap::new();

        for name in &config.median_columns {
            require_column(&frame, name, "median_columns")?;
            if Some(name.as_str()) == target {
                return Err(PipelineError::DataIntegrity(format!(
                    "target column '{}' cannot be imputed",
                    name
                )));
            }
            let median = self.median_for(&frame, name, fitted)?;
            let filled = fill_numeric(&mut frame, name, median)?;
            debug!(column = %name, median, filled, "Median imputation");
            medians.insert(name.clone(), median);
        }

        for name in &config.text_fill_columns {
            require_column(&frame, name, "text_fill_columns")?;
            let filled = fill_text(&mut frame, name, &config.text_sentinel)?;
            debug!(column = %name, filled, "Text imputation");
        }

        for feature in &config.derived_features {
            if frame.column(&feature.name).is_ok() {
                return Err(PipelineError::DataIntegrity(format!(
                    "derived feature '{}' collides with an existing column",
                    feature.name
                )));
            }
            let column = derive_feature(&frame, feature)?;
            debug!(feature = %feature.name, missing = column.null_count(), "Derived feature");
            frame.with_column(column)?;
        }

        for name in &config.categorical_columns {
            require_column(&frame, name, "categorical_columns")?;
            let column = frame.column(name)?;
            let (encoder, encoded) = match fitted.and_then(|f| f.encodings.get(name)) {
                Some(encoder) => (encoder.clone(), encoder.transform(column)?),
                None => LabelEncoder::fit_transform(column, &config.text_sentinel)?,
            };
            debug!(column = %name, categories = encoder.n_categories(), "Label encoding");
            frame.with_column(encoded)?;
            encodings.insert(name.clone(), encoder);
        }

        let numeric: Vec<String> = frame
            .get_columns()
            .iter()
            .filter(|c| is_numeric_dtype(c.dtype()))
            .map(|c| c.name().to_string())
            .collect();
        let dropped = frame.width() - numeric.len();
        frame = frame.select(numeric)?;
        debug!(dropped, "Kept numeric columns");

        if let Some(target) = target {
            if frame.column(target).is_err() {
                error!(column = %target, "Target column is not numeric");
                return Err(PipelineError::DataIntegrity(format!(
                    "target column '{}' is not numeric",
                    target
                )));
            }
        }

        frame = drop_all(frame, &config.post_drop_columns, "post_drop_columns")?;

        for name in column_names(&frame) {
            if Some(name.as_str()) == target || missing_count(frame.column(&name)?)? == 0 {
                continue;
            }
            if !config.impute_remaining_numeric {
                error!(column = %name, "Feature column still has missing values");
                return Err(PipelineError::DataIntegrity(format!(
                    "column '{}' has missing values after cleaning",
                    name
                )));
            }
            let median = self.median_for(&frame, &name, fitted)?;
            let filled = fill_numeric(&mut frame, &name, median)?;
            debug!(column = %name, median, filled, "Median imputation of remaining nulls");
            medians.insert(name, median);
        }

        info!(rows = frame.height(), cols = frame.width(), "Cleaning complete");
        Ok(CleanedDataset {
            frame,
            encodings,
            medians,
        })
    }
}
