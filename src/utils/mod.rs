//! DataFrame ↔ ndarray conversion helpers shared by training, tuning and evaluation

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Check if a dtype is a primitive numeric type
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Names of all columns in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Cast a column to f64 values, failing on nulls.
///
/// Models only ever see cleaned data, so a null here means a stage upstream broke
/// its contract and the row cannot be silently zero-filled.
pub fn column_to_vec(column: &Column) -> Result<Vec<f64>> {
    let name = column.name().to_string();
    if !is_numeric_dtype(column.dtype()) {
        return Err(PipelineError::DataIntegrity(format!(
            "column '{}' has non-numeric dtype {}",
            name,
            column.dtype()
        )));
    }

    let as_f64 = column.cast(&DataType::Float64)?;
    as_f64
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                PipelineError::DataIntegrity(format!("column '{}' has a missing value at row {}", name, row))
            })
        })
        .collect()
}

/// Convert a target series to a 1-D array
pub fn series_to_array1(series: &Series) -> Result<Array1<f64>> {
    let column = series.clone().into_column();
    Ok(Array1::from_vec(column_to_vec(&column)?))
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df.column(col_name).map_err(|_| {
                PipelineError::DataIntegrity(format!("feature column '{}' not found", col_name))
            })?;
            column_to_vec(column)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_data[c][r]))
}

/// Convert every column of a feature frame, in order, to a row-major array
pub fn frame_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    columns_to_array2(df, &column_names(df))
}
