//! Regressor trait and evaluation metrics

use crate::error::{BConnectError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Capability shared by every estimator in the registry.
///
/// The evaluator and the refit service only ever talk to models through this
/// trait, so a new algorithm family needs nothing more than an implementation
/// and a registry entry.
pub trait Regressor: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Forward the [`Regressor`] trait to a model's inherent `fit`/`predict`.
macro_rules! impl_regressor {
    ($($model:ty),+ $(,)?) => {
        $(
            impl $crate::training::Regressor for $model {
                fn fit(
                    &mut self,
                    x: &::ndarray::Array2<f64>,
                    y: &::ndarray::Array1<f64>,
                ) -> $crate::error::Result<()> {
                    <$model>::fit(self, x, y)?;
                    Ok(())
                }

                fn predict(
                    &self,
                    x: &::ndarray::Array2<f64>,
                ) -> $crate::error::Result<::ndarray::Array1<f64>> {
                    <$model>::predict(self, x)
                }
            }
        )+
    };
}
pub(crate) use impl_regressor;

/// Validate a training set before any estimator touches it.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    let n_samples = x.nrows();

    if n_samples != y.len() {
        return Err(BConnectError::ShapeError {
            expected: format!("y length = {}", n_samples),
            actual: format!("y length = {}", y.len()),
        });
    }
    if n_samples == 0 || x.ncols() == 0 {
        return Err(BConnectError::InvalidInput(format!(
            "Empty training set ({} rows x {} features)",
            n_samples,
            x.ncols()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(BConnectError::InvalidInput(
            "Training data contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Validate the feature count of a prediction input.
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(BConnectError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Coefficient of determination.
///
/// A constant `y_true` scores 1.0 for a perfect prediction and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let y_mean = y_true.sum() / n;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Regression metrics measured on a holdout partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// R-squared
    pub r2: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Number of scored samples
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Compute regression metrics
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let n_samples = y_true.len();
        let n = n_samples.max(1) as f64;

        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        Self {
            r2: r2_score(y_true, y_pred),
            mse,
            rmse: mse.sqrt(),
            mae,
            n_samples,
        }
    }
}
