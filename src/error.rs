//! Error types for the B-Connect model selection pipeline

use thiserror::Error;

/// Result type alias for B-Connect operations
pub type Result<T> = std::result::Result<T, BConnectError>;

/// Main error type for the pipeline and its collaborators
#[derive(Error, Debug)]
pub enum BConnectError {
    #[error("Invalid test fraction: {0} (must lie strictly between 0 and 1)")]
    InvalidFraction(f64),

    #[error("Not enough rows to split: {rows} row(s), a test fraction of {test_fraction} needs at least {min_rows}")]
    InsufficientRows {
        rows: usize,
        test_fraction: f64,
        min_rows: usize,
    },

    #[error("Training error for model '{model}': {reason}")]
    TrainingError { model: String, reason: String },

    #[error("No model could be trained ({} failure(s))", .failures.len())]
    NoModelTrained { failures: Vec<(String, String)> },

    #[error("Missing selection: {0}")]
    MissingSelection(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Column '{column}' is not numeric (dtype {dtype})")]
    NonNumericColumn { column: String, dtype: String },

    #[error("Column '{column}' has {count} missing value(s)")]
    MissingValues { column: String, count: usize },

    #[error("Feature '{0}' is selected more than once")]
    DuplicateFeature(String),

    #[error("Target '{0}' is also selected as a feature")]
    TargetInFeatures(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl BConnectError {
    /// Wrap any error raised by a model into that model's training error
    pub fn training(model: impl Into<String>, reason: impl ToString) -> Self {
        BConnectError::TrainingError {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for BConnectError {
    fn from(err: polars::error::PolarsError) -> Self {
        BConnectError::DataError(err.to_string())
    }
}

impl From<calamine::Error> for BConnectError {
    fn from(err: calamine::Error) -> Self {
        BConnectError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for BConnectError {
    fn from(err: serde_json::Error) -> Self {
        BConnectError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for BConnectError {
    fn from(err: ndarray::ShapeError) -> Self {
        BConnectError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
