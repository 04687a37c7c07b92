//! AdaBoost.R2 regression
//!
//! Each round resamples the training set in proportion to the sample weights,
//! fits a shallow regression tree, and re-weights samples by their normalized
//! absolute error. Predictions are the weighted median of the ensemble.

use crate::error::{BConnectError, Result};
use super::decision_tree::DecisionTreeRegressor;
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// AdaBoost.R2 regressor with linear loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Depth of each base tree
    pub max_depth: usize,
    pub random_state: u64,
    estimators: Vec<DecisionTreeRegressor>,
    estimator_weights: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostRegressor {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            max_depth: 3,
            random_state: 42,
            estimators: Vec::new(),
            estimator_weights: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 || self.learning_rate <= 0.0 {
            return Err(BConnectError::InvalidInput(
                "AdaBoost needs n_estimators > 0 and learning_rate > 0".to_string(),
            ));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.estimators.clear();
        self.estimator_weights.clear();

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut weights = Array1::from_elem(n_samples, 1.0 / n_samples as f64);

        for round in 0..self.n_estimators {
            let sample = weighted_resample(&weights, &mut rng);
            let mut tree = DecisionTreeRegressor::new().with_max_depth(self.max_depth);
            tree.fit(&x.select(Axis(0), &sample), &y.select(Axis(0), &sample))?;

            let predictions = tree.predict(x)?;
            let mut errors: Array1<f64> = (&predictions - y).mapv(f64::abs);
            let max_error = errors.fold(0.0f64, |m, &e| m.max(e));
            if max_error > 0.0 {
                errors /= max_error;
            }
            let estimator_error = weights.dot(&errors);

            if estimator_error <= 0.0 {
                // perfect fit, nothing left to boost
                self.estimators.push(tree);
                self.estimator_weights.push(1.0);
                break;
            }
            if estimator_error >= 0.5 {
                if self.estimators.is_empty() {
                    self.estimators.push(tree);
                    self.estimator_weights.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            self.estimators.push(tree);
            self.estimator_weights.push(self.learning_rate * (1.0 / beta).ln());

            if round + 1 < self.n_estimators {
                for (w, e) in weights.iter_mut().zip(errors.iter()) {
                    *w *= beta.powf((1.0 - e) * self.learning_rate);
                }
                let total = weights.sum();
                if total <= 0.0 {
                    break;
                }
                weights /= total;
            }
        }

        Ok(self)
    }

    /// Weighted median of the per-estimator predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(BConnectError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let per_estimator: Vec<Array1<f64>> = self
            .estimators
            .iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        let half = 0.5 * self.estimator_weights.iter().sum::<f64>();
        let predictions = (0..x.nrows())
            .map(|i| {
                let mut votes: Vec<(f64, f64)> = per_estimator
                    .iter()
                    .zip(self.estimator_weights.iter())
                    .map(|(p, &w)| (p[i], w))
                    .collect();
                votes.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut cumulative = 0.0;
                for &(value, w) in &votes {
                    cumulative += w;
                    if cumulative >= half {
                        return value;
                    }
                }
                votes.last().map_or(0.0, |v| v.0)
            })
            .collect();

        Ok(predictions)
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }
}

/// Draw `n` indices with replacement, proportional to `weights`
fn weighted_resample(weights: &Array1<f64>, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let n = weights.len();
    let mut cdf = Vec::with_capacity(n);
    let mut acc = 0.0;
    for &w in weights {
        acc += w;
        cdf.push(acc);
    }
    (0..n)
        .map(|_| {
            let u = rng.gen::<f64>() * acc;
            cdf.partition_point(|&c| c <= u).min(n - 1)
        })
        .collect()
}

impl_regressor!(AdaBoostRegressor);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::r2_score;
    use ndarray::array;

    #[test]
    fn test_adaboost_regressor_fits() {
        let x = Array2::from_shape_fn((80, 2), |(i, j)| ((i * (j + 1) * 7) % 23) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] * 1.5 + r[1]).collect();

        let mut model = AdaBoostRegressor::default();
        model.fit(&x, &y).unwrap();
        assert!(model.n_estimators_fitted() >= 1);

        let preds = model.predict(&x).unwrap();
        assert!(r2_score(&y, &preds) > 0.8);
    }

    #[test]
    fn test_perfect_first_round_stops_early() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 1.0, 1.0, 1.0];
        let mut model = AdaBoostRegressor::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_estimators_fitted(), 1);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_weighted_resample_follows_weights() {
        let weights = array![0.0, 1.0, 0.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let sample = weighted_resample(&weights, &mut rng);
        assert!(sample.iter().all(|&i| i == 1));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = AdaBoostRegressor::default();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
