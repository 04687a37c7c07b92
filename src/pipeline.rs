//! End-to-end model selection: extract, split, evaluate, refit, predict
//!
//! Every interaction re-runs [`run_pipeline`] from scratch; nothing is cached
//! between runs apart from the immutable [`Dataset`].

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::Dataset;
use crate::error::{BConnectError, Result};
use crate::training::{
    predict_for, train_test_split, EvaluationReport, Evaluator, EvaluatorConfig, ModelRegistry,
    ModelScore, SplitConfig,
};

/// Ordered, distinct feature names plus one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    features: Vec<String>,
    target: String,
}

impl Selection {
    pub fn new(features: Vec<String>, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if features.is_empty() {
            return Err(BConnectError::MissingSelection(
                "select at least one feature".to_string(),
            ));
        }
        if target.is_empty() {
            return Err(BConnectError::MissingSelection("select a target".to_string()));
        }
        for (i, name) in features.iter().enumerate() {
            if features[..i].contains(name) {
                return Err(BConnectError::DuplicateFeature(name.clone()));
            }
        }
        if features.contains(&target) {
            return Err(BConnectError::TargetInFeatures(target));
        }
        Ok(Self { features, target })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// One value per selected feature, in feature order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuery {
    values: Vec<f64>,
}

impl FeatureQuery {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Look up every feature by name; a missing name is an error
    pub fn from_map(selection: &Selection, values: &HashMap<String, f64>) -> Result<Self> {
        selection
            .features()
            .iter()
            .map(|f| {
                values
                    .get(f)
                    .copied()
                    .ok_or_else(|| BConnectError::InvalidInput(format!("no value for feature '{}'", f)))
            })
            .collect::<Result<Vec<f64>>>()
            .map(Self::new)
    }

    /// Dashboard behavior: features the user left blank count as 0.0
    pub fn from_map_or_default(selection: &Selection, values: &HashMap<String, f64>) -> Self {
        Self::new(
            selection
                .features()
                .iter()
                .map(|f| values.get(f).copied().unwrap_or(0.0))
                .collect(),
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Result of one full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub report: EvaluationReport,
    pub best_name: String,
    pub best_score: f64,
    pub prediction: f64,
}

impl PipelineOutcome {
    pub fn ranking(&self) -> Vec<&ModelScore> {
        self.report.ranking()
    }
}

/// Extract, split, evaluate every registered model, refit the winner on all rows and predict `query`.
pub fn run_pipeline(
    dataset: &Dataset,
    selection: &Selection,
    split: &SplitConfig,
    query: &FeatureQuery,
    registry: &ModelRegistry,
    evaluator: &EvaluatorConfig,
) -> Result<PipelineOutcome> {
    let (x, y) = extract(dataset, selection)?;
    let report = evaluate_arrays(&x, &y, selection, split, registry, evaluator)?;
    let prediction = predict_for(&report.best_name, registry, &x, &y, query)?;

    Ok(PipelineOutcome {
        best_name: report.best_name.clone(),
        best_score: report.best_score,
        prediction,
        report,
    })
}

/// The evaluation half of [`run_pipeline`], without the refit
pub fn evaluate_selection(
    dataset: &Dataset,
    selection: &Selection,
    split: &SplitConfig,
    registry: &ModelRegistry,
    evaluator: &EvaluatorConfig,
) -> Result<EvaluationReport> {
    let (x, y) = extract(dataset, selection)?;
    evaluate_arrays(&x, &y, selection, split, registry, evaluator)
}

fn extract(dataset: &Dataset, selection: &Selection) -> Result<(Array2<f64>, Array1<f64>)> {
    let x = dataset.feature_matrix(selection.features())?;
    let y = dataset.column_f64(selection.target())?;
    Ok((x, y))
}

fn evaluate_arrays(
    x: &Array2<f64>,
    y: &Array1<f64>,
    selection: &Selection,
    split: &SplitConfig,
    registry: &ModelRegistry,
    evaluator: &EvaluatorConfig,
) -> Result<EvaluationReport> {
    split.validate()?;
    info!(
        features = ?selection.features(),
        target = %selection.target(),
        test_fraction = split.test_fraction,
        seed = split.seed,
        "Running model selection"
    );

    let split = train_test_split(x, y, split)?;
    Evaluator::new(*evaluator).evaluate(&split, registry)
}

/// Registry plus configuration, re-run on every interaction
#[derive(Debug, Clone)]
pub struct ModelSelectionPipeline {
    registry: ModelRegistry,
    config: PipelineConfig,
}

impl Default for ModelSelectionPipeline {
    fn default() -> Self {
        Self::new(ModelRegistry::default_catalog(), PipelineConfig::default())
    }
}

impl ModelSelectionPipeline {
    pub fn new(registry: ModelRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Override the split for subsequent runs
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.config.test_fraction = split.test_fraction;
        self.config.seed = split.seed;
        self
    }

    pub fn rank(&self, dataset: &Dataset, selection: &Selection) -> Result<EvaluationReport> {
        evaluate_selection(
            dataset,
            selection,
            &self.config.split_config(),
            &self.registry,
            &self.config.evaluator_config(),
        )
    }

    pub fn run(
        &self,
        dataset: &Dataset,
        selection: &Selection,
        query: &FeatureQuery,
    ) -> Result<PipelineOutcome> {
        run_pipeline(
            dataset,
            selection,
            &self.config.split_config(),
            query,
            &self.registry,
            &self.config.evaluator_config(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selection_requires_features_and_target() {
        assert!(matches!(
            Selection::new(vec![], "moyenne"),
            Err(BConnectError::MissingSelection(_))
        ));
        assert!(matches!(
            Selection::new(names(&["a"]), ""),
            Err(BConnectError::MissingSelection(_))
        ));
    }

    #[test]
    fn test_selection_rejects_duplicates_and_overlap() {
        assert!(matches!(
            Selection::new(names(&["a", "b", "a"]), "y"),
            Err(BConnectError::DuplicateFeature(ref f)) if f == "a"
        ));
        assert!(matches!(
            Selection::new(names(&["a", "y"]), "y"),
            Err(BConnectError::TargetInFeatures(_))
        ));
    }

    #[test]
    fn test_query_from_map() {
        let selection = Selection::new(names(&["hours", "attendance"]), "moyenne").unwrap();
        let mut values = HashMap::new();
        values.insert("attendance".to_string(), 0.9);

        let query = FeatureQuery::from_map_or_default(&selection, &values);
        assert_eq!(query.values(), &[0.0, 0.9]);

        assert!(FeatureQuery::from_map(&selection, &values).is_err());
        values.insert("hours".to_string(), 5.0);
        assert_eq!(
            FeatureQuery::from_map(&selection, &values).unwrap().values(),
            &[5.0, 0.9]
        );
    }
}
