//! Pipeline configuration

use serde::{Deserialize, Serialize};

use crate::data::LoadOptions;
use crate::error::{BConnectError, Result};
use crate::training::{EvaluatorConfig, SplitConfig};

/// Lowest test percentage offered on the dashboard
pub const MIN_TEST_PERCENT: u32 = 10;
/// Highest test percentage offered on the dashboard
pub const MAX_TEST_PERCENT: u32 = 50;
/// Highest seed offered on the dashboard
pub const MAX_SEED: u64 = 100;

/// Split defaults and evaluation switches for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fraction of rows held out for scoring
    pub test_fraction: f64,
    /// Shuffle seed for the holdout split
    pub seed: u64,
    /// Evaluate models on the rayon pool
    pub parallel: bool,
    /// Conventional target column offered first
    pub default_target: String,
    /// The dataset's first column holds row labels, not a feature
    pub index_column: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 32,
            parallel: true,
            default_target: "moyenne".to_string(),
            index_column: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_index_column(mut self, index_column: bool) -> Self {
        self.index_column = index_column;
        self
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::default().with_index_column(self.index_column)
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig::new(self.test_fraction, self.seed)
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig::default().with_parallel(self.parallel)
    }

    /// Test fraction as a whole percentage
    pub fn test_percent(&self) -> u32 {
        (self.test_fraction * 100.0).round() as u32
    }

    pub fn validate(&self) -> Result<()> {
        self.split_config().validate()?;
        if self.default_target.is_empty() {
            return Err(BConnectError::ConfigError(
                "default_target must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate a configuration file
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
