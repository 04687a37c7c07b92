//! Holdout evaluation of every registered model
//!
//! Each registry entry is built fresh, fitted on the train partition and
//! scored on the test partition. A model that fails is recorded and skipped;
//! the best model is the first one, in registry order, with the highest R².

use std::time::Instant;

use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BConnectError, Result};
use super::models::RegressionMetrics;
use super::registry::{ModelEntry, ModelRegistry};
use super::split::TrainTestSplit;

/// Evaluator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Fit and score models on the rayon pool
    pub parallel: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl EvaluatorConfig {
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Holdout score of one successfully trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub name: String,
    pub metrics: RegressionMetrics,
    pub fit_time_secs: f64,
}

impl ModelScore {
    /// R² on the test partition
    pub fn score(&self) -> f64 {
        self.metrics.r2
    }
}

/// What happened to one registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Trained(ModelScore),
    Failed { name: String, reason: String },
}

impl ModelOutcome {
    pub fn name(&self) -> &str {
        match self {
            ModelOutcome::Trained(score) => &score.name,
            ModelOutcome::Failed { name, .. } => name,
        }
    }

    pub fn as_score(&self) -> Option<&ModelScore> {
        match self {
            ModelOutcome::Trained(score) => Some(score),
            ModelOutcome::Failed { .. } => None,
        }
    }
}

/// Outcomes in registry order plus the winner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub outcomes: Vec<ModelOutcome>,
    pub best_name: String,
    pub best_score: f64,
}

impl EvaluationReport {
    /// Trained models by descending R²; equal scores keep registry order
    pub fn ranking(&self) -> Vec<&ModelScore> {
        let mut scores: Vec<&ModelScore> =
            self.outcomes.iter().filter_map(ModelOutcome::as_score).collect();
        scores.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scores
    }

    /// (name, reason) of every model that failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ModelOutcome::Failed { name, reason } => Some((name.as_str(), reason.as_str())),
                ModelOutcome::Trained(_) => None,
            })
            .collect()
    }

    pub fn best(&self) -> Option<&ModelScore> {
        self.outcomes
            .iter()
            .filter_map(ModelOutcome::as_score)
            .find(|s| s.name == self.best_name)
    }
}

/// Trains and scores a registry against one split
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, split: &TrainTestSplit, registry: &ModelRegistry) -> Result<EvaluationReport> {
        info!(
            models = registry.len(),
            n_train = split.n_train(),
            n_test = split.n_test(),
            parallel = self.config.parallel,
            "Evaluating models"
        );

        let entries = registry.list_models();
        let outcomes: Vec<ModelOutcome> = if self.config.parallel {
            entries.par_iter().map(|entry| evaluate_one(entry, split)).collect()
        } else {
            entries.iter().map(|entry| evaluate_one(entry, split)).collect()
        };

        let mut best: Option<(&str, f64)> = None;
        for score in outcomes.iter().filter_map(ModelOutcome::as_score) {
            if best.map_or(true, |(_, best_score)| score.score() > best_score) {
                best = Some((&score.name, score.score()));
            }
        }

        match best {
            Some((name, score)) => {
                info!(best = %name, r2 = score, "Best model selected");
                let (best_name, best_score) = (name.to_string(), score);
                Ok(EvaluationReport {
                    outcomes,
                    best_name,
                    best_score,
                })
            }
            None => {
                // no Trained outcome is left at this point
                let failures = outcomes
                    .into_iter()
                    .filter_map(|o| match o {
                        ModelOutcome::Failed { name, reason } => Some((name, reason)),
                        ModelOutcome::Trained(_) => None,
                    })
                    .collect();
                Err(BConnectError::NoModelTrained { failures })
            }
        }
    }
}

/// Evaluate every registry entry on `split` with the default configuration
pub fn evaluate_all(split: &TrainTestSplit, registry: &ModelRegistry) -> Result<EvaluationReport> {
    Evaluator::default().evaluate(split, registry)
}

fn evaluate_one(entry: &ModelEntry, split: &TrainTestSplit) -> ModelOutcome {
    let start = Instant::now();
    match fit_and_predict(entry, split) {
        Ok(y_pred) => {
            let metrics = RegressionMetrics::compute(&split.y_test, &y_pred);
            let fit_time_secs = start.elapsed().as_secs_f64();
            debug!(model = %entry.name, r2 = metrics.r2, rmse = metrics.rmse, fit_time_secs, "Model scored");
            ModelOutcome::Trained(ModelScore {
                name: entry.name.clone(),
                metrics,
                fit_time_secs,
            })
        }
        Err(err) => {
            warn!(model = %entry.name, error = %err, "Model excluded from comparison");
            ModelOutcome::Failed {
                name: entry.name.clone(),
                reason: err.to_string(),
            }
        }
    }
}

fn fit_and_predict(entry: &ModelEntry, split: &TrainTestSplit) -> Result<Array1<f64>> {
    let mut model = entry.build();
    model
        .fit(&split.x_train, &split.y_train)
        .map_err(|e| BConnectError::training(&entry.name, e))?;
    let y_pred = model
        .predict(&split.x_test)
        .map_err(|e| BConnectError::training(&entry.name, e))?;

    if y_pred.len() != split.n_test() {
        return Err(BConnectError::training(
            &entry.name,
            format!("expected {} predictions, got {}", split.n_test(), y_pred.len()),
        ));
    }
    if y_pred.iter().any(|v| !v.is_finite()) {
        return Err(BConnectError::training(&entry.name, "non-finite prediction"));
    }
    Ok(y_pred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::Regressor;
    use crate::training::split::{train_test_split, SplitConfig};
    use ndarray::Array2;

    /// Predicts a fixed constant
    struct Constant(f64);

    impl Regressor for Constant {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            Ok(())
        }
        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.0))
        }
    }

    struct Broken;

    impl Regressor for Broken {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            Err(BConnectError::ComputationError("boom".into()))
        }
        fn predict(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
            Err(BConnectError::ModelNotFitted)
        }
    }

    fn split() -> TrainTestSplit {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(20, |i| 3.0 * i as f64 + 1.0);
        train_test_split(&x, &y, &SplitConfig::default()).unwrap()
    }

    #[test]
    fn test_failing_model_is_isolated() {
        let registry = ModelRegistry::new()
            .register("broken", || Box::new(Broken))
            .and_then(|r| r.register("zero", || Box::new(Constant(0.0))))
            .unwrap();

        let report = Evaluator::new(EvaluatorConfig::sequential())
            .evaluate(&split(), &registry)
            .unwrap();
        assert_eq!(report.best_name, "zero");
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].0, "broken");
    }

    #[test]
    fn test_nan_predictions_count_as_failure() {
        let registry = ModelRegistry::new()
            .register("nan", || Box::new(Constant(f64::NAN)))
            .unwrap();
        let err = evaluate_all(&split(), &registry).unwrap_err();
        assert!(matches!(err, BConnectError::NoModelTrained { ref failures } if failures.len() == 1));
    }

    #[test]
    fn test_all_failures_are_reported_in_registry_order() {
        let registry = ModelRegistry::new()
            .register("nan", || Box::new(Constant(f64::NAN)))
            .and_then(|r| r.register("broken", || Box::new(Broken)))
            .unwrap();
        match evaluate_all(&split(), &registry) {
            Err(BConnectError::NoModelTrained { failures }) => {
                let names: Vec<&str> = failures.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["nan", "broken"]);
                assert!(failures[1].1.contains("boom"));
            }
            other => panic!("expected NoModelTrained, got {:?}", other.map(|r| r.best_name)),
        }
    }

    #[test]
    fn test_empty_registry_trains_nothing() {
        let err = evaluate_all(&split(), &ModelRegistry::new()).unwrap_err();
        assert!(matches!(err, BConnectError::NoModelTrained { ref failures } if failures.is_empty()));
    }

    #[test]
    fn test_ranking_is_stable() {
        let registry = ModelRegistry::new()
            .register("first", || Box::new(Constant(5.0)))
            .and_then(|r| r.register("linear", || Box::new(crate::training::LinearRegression::new())))
            .and_then(|r| r.register("second", || Box::new(Constant(5.0))))
            .unwrap();

        let report = evaluate_all(&split(), &registry).unwrap();
        let names: Vec<&str> = report.ranking().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["linear", "first", "second"]);
        assert_eq!(report.best().unwrap().name, "linear");
    }
}
