//! Epsilon-insensitive Support Vector Regression with an RBF kernel
//!
//! Solves the dual with the bias folded into the kernel (`K + 1`), which drops
//! the equality constraint and leaves a box-constrained problem that plain
//! coordinate descent handles: for `β = α - α*`,
//!
//! `min ½ βᵀ(K + 1)β - yᵀβ + ε‖β‖₁` subject to `-C ≤ βᵢ ≤ C`.

use crate::error::{BConnectError, Result};
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training will return an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// SVR configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVRConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Epsilon tube width
    pub epsilon: f64,
    /// Stop when no coefficient moves by more than this
    pub tol: f64,
    /// Maximum number of passes over the samples
    pub max_iter: usize,
}

impl Default for SVRConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            tol: 1e-4,
            max_iter: 1000,
        }
    }
}

/// Support Vector Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVRConfig,
    support_vectors: Option<Array2<f64>>,
    /// Dual coefficients α - α* of the support vectors
    dual_coef: Option<Array1<f64>>,
    /// RBF coefficient, `1 / (n_features * var(X))` of the training data
    gamma: f64,
}

impl Default for SVMRegressor {
    fn default() -> Self {
        Self::new(SVRConfig::default())
    }
}

impl SVMRegressor {
    pub fn new(config: SVRConfig) -> Self {
        Self {
            config,
            support_vectors: None,
            dual_coef: None,
            gamma: 1.0,
        }
    }

    /// Fit the regressor by dual coordinate descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(BConnectError::InvalidInput(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVR kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        if self.config.c <= 0.0 || self.config.epsilon < 0.0 {
            return Err(BConnectError::InvalidInput(
                "SVR requires C > 0 and epsilon >= 0".to_string(),
            ));
        }

        let var = x.var(0.0);
        self.gamma = if var > 0.0 { 1.0 / (x.ncols() as f64 * var) } else { 1.0 };

        let q = self.compute_kernel_matrix(x);
        let c = self.config.c;
        let eps = self.config.epsilon;

        let mut beta = Array1::<f64>::zeros(n);
        // f = Q β
        let mut f = Array1::<f64>::zeros(n);

        for _ in 0..self.config.max_iter {
            let mut max_change = 0.0f64;

            for i in 0..n {
                let q_ii = q[[i, i]];
                if q_ii <= 0.0 {
                    continue;
                }
                let residual = y[i] - (f[i] - q_ii * beta[i]);
                let shrunk = if residual > eps {
                    residual - eps
                } else if residual < -eps {
                    residual + eps
                } else {
                    0.0
                };
                let new_beta = (shrunk / q_ii).clamp(-c, c);
                let delta = new_beta - beta[i];
                if delta != 0.0 {
                    f.scaled_add(delta, &q.row(i));
                    beta[i] = new_beta;
                    max_change = max_change.max(delta.abs());
                }
            }

            if max_change < self.config.tol {
                break;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| beta[i].abs() > 1e-12).collect();
        self.support_vectors = Some(x.select(ndarray::Axis(0), &support));
        self.dual_coef = Some(support.iter().map(|&i| beta[i]).collect());

        Ok(())
    }

    /// Gram matrix with the bias column folded in
    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| (0..n).map(move |j| (i, j)))
            .map(|(i, j)| self.kernel(x.row(i), x.row(j)) + 1.0)
            .collect();
        Array2::from_shape_vec((n, n), rows).unwrap_or_else(|_| Array2::zeros((n, n)))
    }

    /// Gaussian kernel `exp(-γ‖x1 - x2‖²)`
    fn kernel(&self, x1: ArrayView1<f64>, x2: ArrayView1<f64>) -> f64 {
        let norm_sq: f64 = x1.iter().zip(x2.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
        (-self.gamma * norm_sq).exp()
    }

    /// Predict target values
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (sv, coef) = match (&self.support_vectors, &self.dual_coef) {
            (Some(sv), Some(coef)) => (sv, coef),
            _ => return Err(BConnectError::ModelNotFitted),
        };
        check_predict_input(x, sv.ncols())?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                sv.rows()
                    .into_iter()
                    .zip(coef.iter())
                    .map(|(s, &b)| b * (self.kernel(x.row(i), s) + 1.0))
                    .sum()
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    /// Get number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.as_ref().map(|sv| sv.nrows()).unwrap_or(0)
    }
}

impl_regressor!(SVMRegressor);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::r2_score;

    #[test]
    fn test_gamma_scales_with_feature_variance() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let mut svr = SVMRegressor::default();
        svr.fit(&x, &y).unwrap();
        // var([0, 1, 2, 3, 4]) = 2
        assert!((svr.gamma - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_svm_regressor_rbf_fits_curve() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64 / 8.0);
        let y = x.column(0).mapv(f64::sin);

        let mut svr = SVMRegressor::new(SVRConfig {
            c: 10.0,
            epsilon: 0.01,
            ..Default::default()
        });
        svr.fit(&x, &y).unwrap();
        let preds = svr.predict(&x).unwrap();
        assert!(r2_score(&y, &preds) > 0.9);
    }

    #[test]
    fn test_wide_tube_has_no_support_vectors() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(5, 0.05);
        let mut svr = SVMRegressor::default();
        svr.fit(&x, &y).unwrap();
        assert_eq!(svr.n_support_vectors(), 0);
        assert!(svr.predict(&x).unwrap().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_predict_before_fit() {
        let svr = SVMRegressor::default();
        assert!(matches!(
            svr.predict(&Array2::zeros((1, 1))),
            Err(BConnectError::ModelNotFitted)
        ));
    }
}
