//! B-Connect - student score prediction
//!
//! Loads a table of student records, lets the user pick feature columns and a
//! target, compares twelve regressors on a seeded holdout split, refits the
//! best one on every row and predicts a single new student.
//!
//! # Modules
//!
//! - [`data`] - Dataset loading and numeric column extraction
//! - [`training`] - Regressors, splitting, registry, evaluation and refit
//! - [`pipeline`] - Selection, query and the end-to-end run
//! - [`config`] - Split defaults and session configuration
//! - [`cli`] - Command-line interface and interactive dashboard

// Core error handling
pub mod error;

// Data and models
pub mod data;
pub mod training;

// Orchestration
pub mod config;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{BConnectError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{BConnectError, Result};

    // Data
    pub use crate::data::{Dataset, DatasetSummary, LoadOptions, TargetStats};

    // Training
    pub use crate::training::{
        evaluate_all, predict_for, train_test_split, EvaluationReport, Evaluator,
        EvaluatorConfig, ModelOutcome, ModelRegistry, ModelScore, RegressionMetrics, Regressor,
        SplitConfig, TrainTestSplit,
    };

    // Pipeline
    pub use crate::config::PipelineConfig;
    pub use crate::pipeline::{
        evaluate_selection, run_pipeline, FeatureQuery, ModelSelectionPipeline, PipelineOutcome,
        Selection,
    };
}
