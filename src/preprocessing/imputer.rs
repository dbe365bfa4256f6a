//! Median and sentinel imputation on DataFrame columns

use crate::error::{PipelineError, Result};
use crate::utils::is_numeric_dtype;
use polars::prelude::*;

/// Median of the present values of a numeric column, `None` if all are missing.
///
/// NaN counts as missing, like null.
pub fn column_median(df: &DataFrame, name: &str) -> Result<Option<f64>> {
    let column = numeric_column(df, name)?;
    let values = column.as_materialized_series().cast(&DataType::Float64)?;
    let present: Float64Chunked = values
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(present.median())
}

/// Number of missing entries in a column: nulls plus NaN in float columns
pub fn missing_count(column: &Column) -> Result<usize> {
    let nan = match column.dtype() {
        DataType::Float32 | DataType::Float64 => {
            let values = column.as_materialized_series().cast(&DataType::Float64)?;
            values.f64()?.into_iter().filter(|v| v.is_some_and(f64::is_nan)).count()
        }
        _ => 0,
    };
    Ok(column.null_count() + nan)
}

fn numeric_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::DataIntegrity(format!("column '{}' not found", name)))?;
    if !is_numeric_dtype(column.dtype()) {
        return Err(PipelineError::DataIntegrity(format!(
            "column '{}' must be numeric for median imputation, found {}",
            name,
            column.dtype()
        )));
    }
    Ok(column)
}

/// Replace nulls and NaN in a numeric column with `value`.
///
/// Columns without missing entries are left untouched, dtype included.
pub fn fill_numeric(df: &mut DataFrame, name: &str, value: f64) -> Result<usize> {
    let column = numeric_column(df, name)?;
    let missing = missing_count(column)?;
    if missing == 0 {
        return Ok(0);
    }

    let as_f64 = column.as_materialized_series().cast(&DataType::Float64)?;
    let filled: Vec<f64> = as_f64
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(value))
        .collect();
    df.with_column(Column::new(name.into(), filled))?;
    Ok(missing)
}

/// Replace nulls in a text column with `sentinel`
pub fn fill_text(df: &mut DataFrame, name: &str, sentinel: &str) -> Result<usize> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::DataIntegrity(format!("column '{}' not found", name)))?;
    let missing = column.null_count();
    if missing == 0 {
        return Ok(0);
    }

    let as_text = column.as_materialized_series().cast(&DataType::String)?;
    let filled: Vec<String> = as_text
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or(sentinel).to_string())
        .collect();
    df.with_column(Column::new(name.into(), filled))?;
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("weight".into(), &[Some(1.0), None, Some(3.0), Some(10.0)]),
            Column::new("note".into(), &[Some("ok"), None, None, Some("bad")]),
            Column::new("rooms".into(), &[1i64, 2, 3, 4]),
        ])
        .unwrap()
    }

    #[test]
    fn test_median_ignores_nulls() {
        assert_eq!(column_median(&frame(), "weight").unwrap(), Some(3.0));
        assert_eq!(column_median(&frame(), "rooms").unwrap(), Some(2.5));
    }

    #[test]
    fn test_fill_numeric_only_touches_nulls() {
        let mut df = frame();
        let filled = fill_numeric(&mut df, "weight", 3.0).unwrap();
        assert_eq!(filled, 1);
        let values: Vec<Option<f64>> = df.column("weight").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1.0), Some(3.0), Some(3.0), Some(10.0)]);
    }

    #[test]
    fn test_fill_numeric_without_nulls_keeps_dtype() {
        let mut df = frame();
        assert_eq!(fill_numeric(&mut df, "rooms", 0.0).unwrap(), 0);
        assert_eq!(df.column("rooms").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_nan_is_missing() {
        let mut df = DataFrame::new(vec![Column::new(
            "area".into(),
            &[Some(50.0), Some(f64::NAN), None, Some(70.0), Some(80.0)],
        )])
        .unwrap();
        assert_eq!(missing_count(df.column("area").unwrap()).unwrap(), 2);
        assert_eq!(column_median(&df, "area").unwrap(), Some(70.0));

        assert_eq!(fill_numeric(&mut df, "area", 70.0).unwrap(), 2);
        let values: Vec<Option<f64>> = df.column("area").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(50.0), Some(70.0), Some(70.0), Some(70.0), Some(80.0)]);
    }

    #[test]
    fn test_all_nan_has_no_median() {
        let df = DataFrame::new(vec![Column::new("area".into(), &[f64::NAN, f64::NAN])]).unwrap();
        assert_eq!(column_median(&df, "area").unwrap(), None);
    }

    #[test]
    fn test_fill_text() {
        let mut df = frame();
        assert_eq!(fill_text(&mut df, "note", "No review").unwrap(), 2);
        let note = df.column("note").unwrap();
        assert_eq!(note.null_count(), 0);
        assert_eq!(note.str().unwrap().get(1), Some("No review"));
    }

    #[test]
    fn test_non_numeric_median_rejected() {
        let err = column_median(&frame(), "note").unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }
}
