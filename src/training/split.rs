//! Seeded holdout split

use crate::error::{BConnectError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Holdout parameters: fraction of rows held out and the shuffle seed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 32,
        }
    }
}

impl SplitConfig {
    pub fn new(test_fraction: f64, seed: u64) -> Self {
        Self { test_fraction, seed }
    }

    /// Build from a whole-number percentage, as entered on the dashboard
    pub fn from_percent(percent: u32, seed: u64) -> Self {
        Self::new(percent as f64 / 100.0, seed)
    }

    /// Reject fractions outside the open interval (0, 1), NaN included
    pub fn validate(&self) -> Result<()> {
        if self.test_fraction > 0.0 && self.test_fraction < 1.0 {
            Ok(())
        } else {
            Err(BConnectError::InvalidFraction(self.test_fraction))
        }
    }

    /// Number of test rows for a dataset of `n_rows`
    pub fn test_size(&self, n_rows: usize) -> usize {
        // guard against 0.2 * 100 landing a hair above 20
        (self.test_fraction * n_rows as f64 - 1e-9).ceil().max(0.0) as usize
    }

    /// Fewest rows that leave both partitions non-empty at this fraction
    pub fn min_rows(&self) -> usize {
        ((1.0 - 1e-9) / (1.0 - self.test_fraction)).ceil().max(2.0) as usize
    }
}

/// Disjoint train/test partitions of one dataset
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.train_indices.len()
    }

    pub fn n_test(&self) -> usize {
        self.test_indices.len()
    }
}

/// Shuffle row indices with a seeded `ChaCha8Rng` and hold out the first `ceil(f * n)`.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &SplitConfig,
) -> Result<TrainTestSplit> {
    config.validate()?;

    let n_rows = x.nrows();
    if n_rows != y.len() {
        return Err(BConnectError::ShapeError {
            expected: format!("y length = {}", n_rows),
            actual: format!("y length = {}", y.len()),
        });
    }

    let n_test = config.test_size(n_rows);
    if n_test == 0 || n_test >= n_rows {
        return Err(BConnectError::InsufficientRows {
            rows: n_rows,
            test_fraction: config.test_fraction,
            min_rows: config.min_rows(),
        });
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(n_test);
    let test_indices = indices;

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_indices),
        x_test: x.select(Axis(0), &test_indices),
        y_train: y.select(Axis(0), &train_indices),
        y_test: y.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}
