//! Cleaning and split configuration

use serde::{Deserialize, Serialize};

/// Arithmetic used to derive a feature from existing numeric columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedOp {
    /// `inputs[0] / inputs[1]`; a zero denominator yields a missing value
    Ratio,
    /// Product of two or more inputs
    Product,
}

/// A numeric feature computed from columns already present in the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeature {
    pub name: String,
    pub op: DerivedOp,
    pub inputs: Vec<String>,
}

impl DerivedFeature {
    pub fn ratio(name: impl Into<String>, numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: DerivedOp::Ratio,
            inputs: vec![numerator.into(), denominator.into()],
        }
    }

    pub fn product(name: impl Into<String>, inputs: &[&str]) -> Self {
        Self {
            name: name.into(),
            op: DerivedOp::Product,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuration for the cleaning strategy.
///
/// Steps run in field order: drops, median fills, text fills, derived
/// features, categorical encoding, numeric selection, post drops and finally
/// the catch-all median imputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Identifier or timestamp columns removed before anything else
    pub drop_columns: Vec<String>,
    /// Numeric columns imputed with their median
    pub median_columns: Vec<String>,
    /// Free-text columns whose nulls become `text_sentinel`
    pub text_fill_columns: Vec<String>,
    pub text_sentinel: String,
    pub derived_features: Vec<DerivedFeature>,
    /// Columns label-encoded into integer codes
    pub categorical_columns: Vec<String>,
    /// Columns removed after only numeric columns remain
    pub post_drop_columns: Vec<String>,
    /// Median-impute any other numeric column that still has nulls
    pub impute_remaining_numeric: bool,
    /// Never imputed and never used as a derived feature input
    pub target_column: Option<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            drop_columns: Vec::new(),
            median_columns: Vec::new(),
            text_fill_columns: Vec::new(),
            text_sentinel: "No review".to_string(),
            derived_features: Vec::new(),
            categorical_columns: Vec::new(),
            post_drop_columns: Vec::new(),
            impute_remaining_numeric: true,
            target_column: None,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl CleaningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleaning for the e-commerce order reviews dataset (target `review_score`)
    pub fn order_reviews() -> Self {
        Self {
            drop_columns: strings(&[
                "order_approved_at",
                "order_delivered_carrier_date",
                "order_delivered_customer_date",
                "order_estimated_delivery_date",
                "order_purchase_timestamp",
            ]),
            median_columns: strings(&[
                "product_weight_g",
                "product_length_cm",
                "product_height_cm",
                "product_width_cm",
            ]),
            text_fill_columns: strings(&["review_comment_message"]),
            derived_features: vec![
                DerivedFeature::product(
                    "product_volume_cm3",
                    &["product_length_cm", "product_height_cm", "product_width_cm"],
                ),
                DerivedFeature::ratio("freight_ratio", "freight_value", "price"),
            ],
            post_drop_columns: strings(&["customer_zip_code_prefix", "order_item_id"]),
            target_column: Some("review_score".to_string()),
            ..Self::default()
        }
    }

    pub fn with_drop_columns(mut self, columns: &[&str]) -> Self {
        self.drop_columns = strings(columns);
        self
    }

    pub fn with_median_columns(mut self, columns: &[&str]) -> Self {
        self.median_columns = strings(columns);
        self
    }

    pub fn with_text_fill(mut self, columns: &[&str], sentinel: impl Into<String>) -> Self {
        self.text_fill_columns = strings(columns);
        self.text_sentinel = sentinel.into();
        self
    }

    pub fn with_derived_feature(mut self, feature: DerivedFeature) -> Self {
        self.derived_features.push(feature);
        self
    }

    pub fn with_categorical_columns(mut self, columns: &[&str]) -> Self {
        self.categorical_columns = strings(columns);
        self
    }

    pub fn with_post_drop_columns(mut self, columns: &[&str]) -> Self {
        self.post_drop_columns = strings(columns);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = Some(target.into());
        self
    }

    pub fn with_impute_remaining(mut self, enabled: bool) -> Self {
        self.impute_remaining_numeric = enabled;
        self
    }
}

/// Configuration for the train/validation split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub target_column: String,
    /// Fraction of rows assigned to validation
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            target_column: "review_score".to_string(),
            test_size: 0.2,
            random_state: 42,
        }
    }
}
