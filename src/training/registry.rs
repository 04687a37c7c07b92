//! Ordered catalog of named regressor factories

use std::fmt;
use std::sync::Arc;

use crate::error::{BConnectError, Result};
use super::adaboost::AdaBoostRegressor;
use super::decision_tree::DecisionTreeRegressor;
use super::gradient_boosting::GradientBoostingRegressor;
use super::knn::KNNRegressor;
use super::lightgbm::LightGBMRegressor;
use super::linear_models::{
    ElasticNetRegression, LassoRegression, LinearRegression, RidgeRegression,
};
use super::models::Regressor;
use super::random_forest::RandomForestRegressor;
use super::svm::SVMRegressor;
use super::xgboost::XGBoostRegressor;

/// Builds a fresh, untrained estimator
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn Regressor> + Send + Sync>;

fn factory<F>(f: F) -> ModelFactory
where
    F: Fn() -> Box<dyn Regressor> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A named factory; the registry position is the tie-break rank
#[derive(Clone)]
pub struct ModelEntry {
    pub name: String,
    factory: ModelFactory,
}

impl ModelEntry {
    /// Build a fresh, untrained instance
    pub fn build(&self) -> Box<dyn Regressor> {
        (self.factory)()
    }
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry").field("name", &self.name).finish()
    }
}

/// Insertion-ordered set of model factories keyed by unique name
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The twelve regressors offered by the dashboard, in comparison order
    pub fn default_catalog() -> Self {
        let entries: Vec<(&str, ModelFactory)> = vec![
            ("Linear Regression", factory(|| Box::new(LinearRegression::new()))),
            ("Random Forest", factory(|| Box::new(RandomForestRegressor::default()))),
            ("Ridge", factory(|| Box::new(RidgeRegression::new(1.0)))),
            ("Lasso", factory(|| Box::new(LassoRegression::new(1.0)))),
            ("Elastic Net", factory(|| Box::new(ElasticNetRegression::new(1.0, 0.5)))),
            ("Support Vector Regression", factory(|| Box::new(SVMRegressor::default()))),
            ("Decision Tree", factory(|| Box::new(DecisionTreeRegressor::new()))),
            ("K-Nearest Neighbors", factory(|| Box::new(KNNRegressor::with_k(5)))),
            ("Gradient Boosting", factory(|| Box::new(GradientBoostingRegressor::default()))),
            ("AdaBoost", factory(|| Box::new(AdaBoostRegressor::default()))),
            ("XGBoost", factory(|| Box::new(XGBoostRegressor::default()))),
            ("LightGBM", factory(|| Box::new(LightGBMRegressor::default()))),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|(name, factory)| ModelEntry {
                    name: name.to_string(),
                    factory,
                })
                .collect(),
        }
    }

    /// Append a model; names must be unique
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self>
    where
        F: Fn() -> Box<dyn Regressor> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(BConnectError::ConfigError(format!(
                "Model '{}' is already registered",
                name
            )));
        }
        self.entries.push(ModelEntry {
            name,
            factory: self::factory(factory),
        });
        Ok(self)
    }

    pub fn list_models(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Build a fresh instance of the named model
    pub fn create(&self, name: &str) -> Result<Box<dyn Regressor>> {
        self.get(name)
            .map(ModelEntry::build)
            .ok_or_else(|| BConnectError::UnknownModel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
