//! Persisted label encoding for categorical columns

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maps each category of one column to a consecutive integer code.
///
/// Codes follow the lexicographic order of the category strings, so fitting
/// the same data twice always yields the same mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Category encoded for null values
    pub null_category: String,
    pub mapping: BTreeMap<String, i64>,
}

fn categories(column: &Column, null_category: &str) -> Result<Vec<String>> {
    let as_text = column.as_materialized_series().cast(&DataType::String)?;
    let values = as_text
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or(null_category).to_string())
        .collect();
    Ok(values)
}

impl LabelEncoder {
    /// Learn the category mapping of a column
    pub fn fit(column: &Column, null_category: &str) -> Result<Self> {
        let distinct: BTreeSet<String> = categories(column, null_category)?.into_iter().collect();
        let mapping = distinct
            .into_iter()
            .enumerate()
            .map(|(code, category)| (category, code as i64))
            .collect();
        Ok(Self {
            null_category: null_category.to_string(),
            mapping,
        })
    }

    /// Encode a column, failing on categories that were not seen during fit
    pub fn transform(&self, column: &Column) -> Result<Column> {
        let codes = categories(column, &self.null_category)?
            .into_iter()
            .map(|category| {
                self.mapping.get(&category).copied().ok_or_else(|| {
                    PipelineError::DataIntegrity(format!(
                        "column '{}' has unseen category '{}'",
                        column.name(),
                        category
                    ))
                })
            })
            .collect::<Result<Vec<i64>>>()?;
        Ok(Column::new(column.name().clone(), codes))
    }

    /// Fit on a column and return the encoder with the encoded column
    pub fn fit_transform(column: &Column, null_category: &str) -> Result<(Self, Column)> {
        let encoder = Self::fit(column, null_category)?;
        let encoded = encoder.transform(column)?;
        Ok((encoder, encoded))
    }

    /// Category for a code, if any
    pub fn inverse(&self, code: i64) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, &c)| c == code)
            .map(|(category, _)| category.as_str())
    }

    pub fn n_categories(&self) -> usize {
        self.mapping.len()
    }
}
