//! Strategy executor binding one dataset to one data strategy

use super::cleaning::{CleanedDataset, CleaningStrategy};
use super::split::{DataSplit, SplitStrategy};
use crate::error::{PipelineError, Result};
use polars::prelude::*;

/// The operations that can be applied to a dataset
#[derive(Debug, Clone)]
pub enum DataStrategy {
    Preprocess(CleaningStrategy),
    Split(SplitStrategy),
}

impl DataStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            DataStrategy::Preprocess(_) => "preprocess",
            DataStrategy::Split(_) => "split",
        }
    }

    /// Apply the strategy to a dataset
    pub fn apply(&self, data: &DataFrame) -> Result<StrategyOutput> {
        match self {
            DataStrategy::Preprocess(strategy) => strategy.clean(data).map(StrategyOutput::Cleaned),
            DataStrategy::Split(strategy) => strategy.split(data).map(StrategyOutput::Split),
        }
    }
}

/// Result of applying a [`DataStrategy`]
#[derive(Debug, Clone)]
pub enum StrategyOutput {
    Cleaned(CleanedDataset),
    Split(DataSplit),
}

impl StrategyOutput {
    pub fn into_cleaned(self) -> Result<CleanedDataset> {
        match self {
            StrategyOutput::Cleaned(cleaned) => Ok(cleaned),
            StrategyOutput::Split(_) => Err(PipelineError::DataIntegrity(
                "expected a cleaned dataset, got a split".to_string(),
            )),
        }
    }

    pub fn into_split(self) -> Result<DataSplit> {
        match self {
            StrategyOutput::Split(split) => Ok(split),
            StrategyOutput::Cleaned(_) => Err(PipelineError::DataIntegrity(
                "expected a split, got a cleaned dataset".to_string(),
            )),
        }
    }
}

/// Binds a dataset to a strategy and runs it on demand
#[derive(Debug, Clone)]
pub struct DataCleaning {
    data: DataFrame,
    strategy: DataStrategy,
}

impl DataCleaning {
    pub fn new(data: DataFrame, strategy: DataStrategy) -> Self {
        Self { data, strategy }
    }

    pub fn handle_data(&self) -> Result<StrategyOutput> {
        tracing::debug!(strategy = self.strategy.name(), rows = self.data.height(), "Handling data");
        self.strategy.apply(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::CleaningConfig;

    fn raw() -> DataFrame {
        DataFrame::new(vec![
            Column::new("Area".into(), &[Some(50.0), None, Some(70.0), Some(90.0), Some(65.0)]),
            Column::new("Street".into(), &["a", "b", "c", "d", "e"]),
            Column::new("Price".into(), &[100.0, 150.0, 140.0, 180.0, 120.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_clean_then_split() {
        let clean = DataStrategy::Preprocess(CleaningStrategy::new(
            CleaningConfig::new().with_target("Price"),
        ));
        let cleaned = DataCleaning::new(raw(), clean)
            .handle_data()
            .unwrap()
            .into_cleaned()
            .unwrap();
        assert_eq!(cleaned.frame.width(), 2);

        let split = DataCleaning::new(cleaned.frame, DataStrategy::Split(SplitStrategy::new("Price")))
            .handle_data()
            .unwrap()
            .into_split()
            .unwrap();
        assert_eq!(split.n_train() + split.n_val(), 5);
    }

    #[test]
    fn test_wrong_output_kind() {
        let output = DataCleaning::new(raw(), DataStrategy::Split(SplitStrategy::new("Price")))
            .handle_data()
            .unwrap();
        assert!(matches!(output.into_cleaned(), Err(PipelineError::DataIntegrity(_))));
    }

    #[test]
    fn test_stateless_across_calls() {
        let executor = DataCleaning::new(raw(), DataStrategy::Split(SplitStrategy::new("Price")));
        let a = executor.handle_data().unwrap().into_split().unwrap();
        let b = executor.handle_data().unwrap().into_split().unwrap();
        assert_eq!(a.val_indices, b.val_indices);
    }
}
