//! Dataset access
//!
//! Loads a tabular file once and hands the pipeline strictly validated
//! numeric columns.

mod dataset;

pub use dataset::{Dataset, DatasetSummary, LoadOptions, TargetStats};
