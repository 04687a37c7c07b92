//! Random Forest regressor

use crate::error::{BConnectError, Result};
use super::decision_tree::DecisionTreeRegressor;
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of regression trees, each grown on a bootstrap sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<DecisionTreeRegressor>,
    /// Number of trees
    pub n_estimators: usize,
    /// Seed of the first tree's bootstrap; tree `i` uses `random_state + i`
    pub random_state: u64,
    n_features: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            random_state: 42,
            n_features: 0,
        }
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(BConnectError::InvalidInput(
                "Random forest needs at least one tree".to_string(),
            ));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let base_seed = self.random_state;

        let trees: Result<Vec<DecisionTreeRegressor>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTreeRegressor> {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTreeRegressor::new();
                tree.fit(&x_boot, &y_boot)?;

                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(self)
    }

    /// Average of the per-tree predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(BConnectError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        let mut sum = Array1::zeros(x.nrows());
        for pred in &per_tree {
            sum += pred;
        }
        Ok(sum / self.trees.len() as f64)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl_regressor!(RandomForestRegressor);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::r2_score;
    use ndarray::array;

    fn quadratic() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i as f64) * 0.5 + j as f64);
        let y = x.column(0).mapv(|v| v * v);
        (x, y)
    }

    #[test]
    fn test_regressor_fits_signal() {
        let (x, y) = quadratic();
        let mut rf = RandomForestRegressor::new(20).with_random_state(7);
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 20);
        let preds = rf.predict(&x).unwrap();
        assert!(r2_score(&y, &preds) > 0.9);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = quadratic();
        let mut a = RandomForestRegressor::new(10).with_random_state(3);
        let mut b = RandomForestRegressor::new(10).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_seed_changes_the_bootstrap() {
        let (x, y) = quadratic();
        let mut a = RandomForestRegressor::new(5).with_random_state(1);
        let mut b = RandomForestRegressor::new(5).with_random_state(2);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_ne!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_before_fit() {
        let rf = RandomForestRegressor::default();
        assert!(matches!(
            rf.predict(&array![[1.0]]),
            Err(BConnectError::ModelNotFitted)
        ));
    }
}
