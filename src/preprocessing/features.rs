//! Derived numeric features

use super::config::{DerivedFeature, DerivedOp};
use crate::error::{PipelineError, Result};
use crate::utils::is_numeric_dtype;
use polars::prelude::*;

fn nullable_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name).map_err(|_| {
        PipelineError::DataIntegrity(format!("derived feature input '{}' not found", name))
    })?;
    if !is_numeric_dtype(column.dtype()) {
        return Err(PipelineError::DataIntegrity(format!(
            "derived feature input '{}' must be numeric, found {}",
            name,
            column.dtype()
        )));
    }
    let as_f64 = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(as_f64.f64()?.into_iter().collect())
}

/// Validate a feature definition against the frame and the target column
pub fn validate_feature(feature: &DerivedFeature, target: Option<&str>) -> Result<()> {
    let arity_ok = match feature.op {
        DerivedOp::Ratio => feature.inputs.len() == 2,
        DerivedOp::Product => feature.inputs.len() >= 2,
    };
    if !arity_ok {
        return Err(PipelineError::Config(format!(
            "derived feature '{}' has {} inputs, {:?} needs {}",
            feature.name,
            feature.inputs.len(),
            feature.op,
            if feature.op == DerivedOp::Ratio { "exactly 2" } else { "at least 2" }
        )));
    }
    if let Some(target) = target {
        if feature.inputs.iter().any(|input| input == target) {
            return Err(PipelineError::DataIntegrity(format!(
                "derived feature '{}' must not use the target column '{}'",
                feature.name, target
            )));
        }
    }
    Ok(())
}

/// Compute a derived feature column.
///
/// Missing inputs propagate as missing outputs, as does a zero denominator.
pub fn derive_feature(df: &DataFrame, feature: &DerivedFeature) -> Result<Column> {
    let inputs = feature
        .inputs
        .iter()
        .map(|name| nullable_values(df, name))
        .collect::<Result<Vec<_>>>()?;

    let values: Vec<Option<f64>> = (0..df.height())
        .map(|row| match feature.op {
            DerivedOp::Ratio => match (inputs[0][row], inputs[1][row]) {
                (Some(num), Some(den)) if den != 0.0 => Some(num / den),
                _ => None,
            },
            DerivedOp::Product => inputs
                .iter()
                .try_fold(1.0, |acc, column| column[row].map(|v| acc * v)),
        })
        .collect();

    Ok(Column::new(feature.name.as_str().into(), values))
}
