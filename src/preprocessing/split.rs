//! Seeded train/validation split

use super::config::SplitConfig;
use crate::error::{PipelineError, Result};
use crate::utils::is_numeric_dtype;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};

/// Disjoint train and validation partitions of a cleaned dataset
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub x_train: DataFrame,
    pub x_val: DataFrame,
    pub y_train: Series,
    pub y_val: Series,
    /// Source row of each training row, in partition order
    pub train_indices: Vec<usize>,
    /// Source row of each validation row, in partition order
    pub val_indices: Vec<usize>,
}

impl DataSplit {
    pub fn n_train(&self) -> usize {
        self.train_indices.len()
    }

    pub fn n_val(&self) -> usize {
        self.val_indices.len()
    }
}

/// Partitions rows pseudo-randomly with a fixed seed
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStrategy {
    pub target_column: String,
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self::from(SplitConfig::default())
    }
}

impl From<SplitConfig> for SplitStrategy {
    fn from(config: SplitConfig) -> Self {
        Self {
            target_column: config.target_column,
            test_size: config.test_size,
            random_state: config.random_state,
        }
    }
}

impl SplitStrategy {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Number of validation and training rows for `n` samples
    pub fn partition_sizes(&self, n: usize) -> Result<(usize, usize)> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if n == 0 {
            return Err(PipelineError::DataIntegrity("cannot split an empty dataset".to_string()));
        }
        let n_val = (self.test_size * n as f64).ceil() as usize;
        let n_train = n.saturating_sub(n_val);
        if n_val == 0 || n_train == 0 {
            return Err(PipelineError::DataIntegrity(format!(
                "test_size {} on {} rows leaves an empty partition (train {}, validation {})",
                self.test_size, n, n_train, n_val
            )));
        }
        Ok((n_train, n_val))
    }

    /// Shuffled row indices split into (train, validation)
    pub fn indices(&self, n: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let (_, n_val) = self.partition_sizes(n)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.shuffle(&mut rng);
        let train = permutation.split_off(n_val);
        Ok((train, permutation))
    }

    /// Separate the target and partition the rows
    pub fn split(&self, df: &DataFrame) -> Result<DataSplit> {
        let target = df.column(&self.target_column).map_err(|_| {
            error!(column = %self.target_column, "Target column missing");
            PipelineError::DataIntegrity(format!("target column '{}' not found", self.target_column))
        })?;
        if !is_numeric_dtype(target.dtype()) {
            return Err(PipelineError::DataIntegrity(format!(
                "target column '{}' must be numeric, found {}",
                self.target_column,
                target.dtype()
            )));
        }
        if target.null_count() > 0 {
            error!(column = %self.target_column, nulls = target.null_count(), "Target has missing values");
            return Err(PipelineError::DataIntegrity(format!(
                "target column '{}' has {} missing values",
                self.target_column,
                target.null_count()
            )));
        }

        let (train_indices, val_indices) = self.indices(df.height()).inspect_err(|e| {
            error!(error = %e, "Split failed");
        })?;

        let y = target.as_materialized_series().clone();
        let x = df.drop(&self.target_column)?;

        let take = |indices: &[usize]| -> Result<(DataFrame, Series)> {
            let idx = IdxCa::from_vec("".into(), indices.iter().map(|&i| i as IdxSize).collect());
            Ok((x.take(&idx)?, y.take(&idx)?))
        };
        let (x_train, y_train) = take(&train_indices)?;
        let (x_val, y_val) = take(&val_indices)?;

        info!(
            train = train_indices.len(),
            validation = val_indices.len(),
            seed = self.random_state,
            "Split dataset"
        );

        Ok(DataSplit {
            x_train,
            x_val,
            y_train,
            y_val,
            train_indices,
            val_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn frame(n: usize) -> DataFrame {
        let area: Vec<f64> = (0..n).map(|i| i as f64 * 10.0).collect();
        let price: Vec<f64> = (0..n).map(|i| i as f64 * 3.0 + 1.0).collect();
        df!("Area" => area, "Price" => price).unwrap()
    }

    #[test]
    fn test_eighty_twenty() {
        let split = SplitStrategy::new("Price").split(&frame(100)).unwrap();
        assert_eq!(split.x_train.height(), 80);
        assert_eq!(split.x_val.height(), 20);
        assert_eq!(split.y_train.len(), 80);
        assert_eq!(split.y_val.len(), 20);
        assert!(split.x_train.column("Price").is_err());
    }

    #[test]
    fn test_disjoint_and_complete() {
        let split = SplitStrategy::new("Price").with_test_size(0.33).split(&frame(31)).unwrap();
        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let val: HashSet<usize> = split.val_indices.iter().copied().collect();
        assert!(train.is_disjoint(&val));
        assert_eq!(train.len() + val.len(), 31);
        assert_eq!(split.n_val(), 11);
    }

    #[test]
    fn test_rows_follow_indices() {
        let split = SplitStrategy::new("Price").split(&frame(10)).unwrap();
        let area = split.x_val.column("Area").unwrap().f64().unwrap();
        let price = split.y_val.f64().unwrap();
        for (pos, &row) in split.val_indices.iter().enumerate() {
            assert_eq!(area.get(pos), Some(row as f64 * 10.0));
            assert_eq!(price.get(pos), Some(row as f64 * 3.0 + 1.0));
        }
    }

    #[test]
    fn test_deterministic() {
        let strategy = SplitStrategy::new("Price").with_random_state(7);
        let a = strategy.split(&frame(50)).unwrap();
        let b = strategy.split(&frame(50)).unwrap();
        assert_eq!(a.train_indices, b.train_indices);
        assert_eq!(a.val_indices, b.val_indices);

        let c = SplitStrategy::new("Price").with_random_state(8).split(&frame(50)).unwrap();
        assert_ne!(a.val_indices, c.val_indices);
    }

    #[test]
    fn test_errors() {
        let missing = SplitStrategy::new("review_score").split(&frame(10)).unwrap_err();
        assert!(matches!(missing, PipelineError::DataIntegrity(_)));

        let bad_ratio = SplitStrategy::new("Price").with_test_size(1.0).split(&frame(10)).unwrap_err();
        assert!(matches!(bad_ratio, PipelineError::Config(_)));

        let single = SplitStrategy::new("Price").split(&frame(1)).unwrap_err();
        assert!(matches!(single, PipelineError::DataIntegrity(_)));

        let empty = SplitStrategy::new("Price").split(&frame(0)).unwrap_err();
        assert!(matches!(empty, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn test_null_target() {
        let df = DataFrame::new(vec![
            Column::new("x".into(), &[1.0, 2.0, 3.0]),
            Column::new("y".into(), &[Some(1.0), None, Some(3.0)]),
        ])
        .unwrap();
        assert!(SplitStrategy::new("y").split(&df).is_err());
    }
}
