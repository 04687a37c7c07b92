//! Refit the selected model on all rows and score one query

use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::error::{BConnectError, Result};
use crate::pipeline::FeatureQuery;
use super::registry::ModelRegistry;

/// Fit a fresh `best_name` instance on the full data and predict `query`.
pub fn predict_for(
    best_name: &str,
    registry: &ModelRegistry,
    full_x: &Array2<f64>,
    full_y: &Array1<f64>,
    query: &FeatureQuery,
) -> Result<f64> {
    let mut model = registry.create(best_name)?;

    let values = query.values();
    if values.len() != full_x.ncols() {
        return Err(BConnectError::ShapeError {
            expected: format!("{} feature values", full_x.ncols()),
            actual: format!("{} feature values", values.len()),
        });
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(BConnectError::InvalidInput(format!(
            "Query value #{} is not a finite number",
            pos + 1
        )));
    }

    model
        .fit(full_x, full_y)
        .map_err(|e| BConnectError::training(best_name, e))?;

    let row = Array1::from(values.to_vec()).insert_axis(Axis(0));
    let prediction = model
        .predict(&row)
        .map_err(|e| BConnectError::training(best_name, e))?
        .get(0)
        .copied()
        .ok_or_else(|| BConnectError::ComputationError(format!("{} returned no prediction", best_name)))?;

    if !prediction.is_finite() {
        return Err(BConnectError::ComputationError(format!(
            "{} produced a non-finite prediction",
            best_name
        )));
    }

    info!(model = %best_name, n_rows = full_x.nrows(), prediction, "Refitted on full data");
    Ok(prediction)
}
