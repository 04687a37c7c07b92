//! Linear model implementations: OLS, Ridge, Lasso and Elastic Net

use crate::error::{BConnectError, Result};
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a tiny ridge on the diagonal if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve_inner(a, b).or_else(|| {
        let n = a.nrows();
        let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += ridge.max(1e-12);
        }
        cholesky_solve_inner(&a_reg, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Gauss-Jordan solve with partial pivoting, used when Cholesky fails.
fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut aug = Array2::zeros((n, n + 1));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = a[[i, j]];
        }
        aug[[i, n]] = b[i];
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| {
            aug[[r1, col]]
                .abs()
                .partial_cmp(&aug[[r2, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if aug[[pivot_row, col]].abs() < 1e-10 {
            return None;
        }
        if pivot_row != col {
            for j in 0..=n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = aug[[col, col]];
        for j in 0..=n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..=n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.column(n).to_owned())
}

/// Centre `x` and `y`; the intercept is recovered from the means after solving.
fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = x - &x_mean.clone().insert_axis(Axis(0));
    let y_centered = y - y_mean;
    (x_centered, y_centered, x_mean, y_mean)
}

/// Solve (X^T X + alpha*I) w = X^T y
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    for i in 0..x.ncols() {
        xtx[[i, i]] += alpha;
    }
    let xty = x.t().dot(y);

    cholesky_solve(&xtx, &xty)
        .or_else(|| gauss_jordan_solve(&xtx, &xty))
        .ok_or_else(|| {
            BConnectError::ComputationError(
                "Matrix is singular, cannot solve least squares".to_string(),
            )
        })
}

/// Soft-threshold operator for the L1 proximal step
fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

/// Coordinate descent for `(1/2n)||y - Xw||² + l1·||w||₁ + (l2/2)·||w||²`,
/// with penalties already scaled by n.
fn coordinate_descent(
    x_c: &Array2<f64>,
    y_c: &Array1<f64>,
    l1_penalty: f64,
    l2_penalty: f64,
    max_iter: usize,
    tol: f64,
) -> Array1<f64> {
    let n_features = x_c.ncols();
    let col_norms: Vec<f64> = (0..n_features)
        .map(|j| x_c.column(j).mapv(|v| v * v).sum())
        .collect();

    let mut w = Array1::zeros(n_features);
    let mut r = y_c.clone();

    for _iter in 0..max_iter {
        let mut max_delta = 0.0f64;
        let mut max_w = 0.0f64;

        for j in 0..n_features {
            let denom = col_norms[j] + l2_penalty;
            if denom < 1e-15 {
                w[j] = 0.0;
                continue;
            }
            let old_wj = w[j];
            let rho = x_c.column(j).dot(&r) + col_norms[j] * old_wj;
            w[j] = soft_threshold(rho, l1_penalty) / denom;

            let delta = old_wj - w[j];
            if delta != 0.0 {
                r.scaled_add(delta, &x_c.column(j));
            }
            max_delta = max_delta.max(delta.abs());
            max_w = max_w.max(w[j].abs());
        }

        if max_w == 0.0 || max_delta / max_w < tol {
            break;
        }
    }

    w
}

/// Coefficients and intercept of a fitted linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit on centred data with `solve`, then recover the intercept from the means
    fn centered<F>(x: &Array2<f64>, y: &Array1<f64>, solve: F) -> Result<Self>
    where
        F: FnOnce(&Array2<f64>, &Array1<f64>) -> Result<Array1<f64>>,
    {
        check_fit_input(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y);
        let coefficients = solve(&x_c, &y_c)?;
        let intercept = y_mean - coefficients.dot(&x_mean);
        Ok(Self { coefficients, intercept })
    }

    fn predict(fit: Option<&Self>, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fit = fit.ok_or(BConnectError::ModelNotFitted)?;
        check_predict_input(x, fit.coefficients.len())?;
        Ok(x.dot(&fit.coefficients) + fit.intercept)
    }
}

/// Ordinary least squares linear regression
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fitted: Option<LinearFit>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.fitted = Some(LinearFit::centered(x, y, |x_c, y_c| {
            solve_normal_equations(x_c, y_c, 0.0)
        })?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearFit::predict(self.fitted.as_ref(), x)
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub fitted: Option<LinearFit>,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self { fitted: None, alpha }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if self.alpha < 0.0 {
            return Err(BConnectError::InvalidInput(format!(
                "Ridge alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        let alpha = self.alpha;
        self.fitted = Some(LinearFit::centered(x, y, |x_c, y_c| {
            solve_normal_equations(x_c, y_c, alpha)
        })?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearFit::predict(self.fitted.as_ref(), x)
    }
}

const CD_MAX_ITER: usize = 1000;
const CD_TOL: f64 = 1e-4;

/// Lasso Regression (L1-regularized via coordinate descent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub fitted: Option<LinearFit>,
    /// L1 regularization strength
    pub alpha: f64,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self { fitted: None, alpha }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let l1 = self.alpha * x.nrows() as f64;
        self.fitted = Some(LinearFit::centered(x, y, |x_c, y_c| {
            Ok(coordinate_descent(x_c, y_c, l1, 0.0, CD_MAX_ITER, CD_TOL))
        })?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearFit::predict(self.fitted.as_ref(), x)
    }
}

/// Elastic Net Regression (L1 + L2 regularization via coordinate descent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNetRegression {
    pub fitted: Option<LinearFit>,
    /// Overall regularization strength
    pub alpha: f64,
    /// L1 ratio (0.0 = pure L2/Ridge, 1.0 = pure L1/Lasso)
    pub l1_ratio: f64,
}

impl Default for ElasticNetRegression {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl ElasticNetRegression {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            fitted: None,
            alpha,
            l1_ratio: l1_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n = x.nrows() as f64;
        let l1 = self.alpha * self.l1_ratio * n;
        let l2 = self.alpha * (1.0 - self.l1_ratio) * n;
        self.fitted = Some(LinearFit::centered(x, y, |x_c, y_c| {
            Ok(coordinate_descent(x_c, y_c, l1, l2, CD_MAX_ITER, CD_TOL))
        })?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearFit::predict(self.fitted.as_ref(), x)
    }
}

impl_regressor!(LinearRegression, RidgeRegression, LassoRegression, ElasticNetRegression);
