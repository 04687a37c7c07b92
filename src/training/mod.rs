//! Regression models and the selection machinery around them
//!
//! Provides:
//! - Linear models (OLS, Ridge, Lasso, ElasticNet)
//! - Decision trees and Random Forests
//! - Gradient boosting, XGBoost, LightGBM
//! - K-Nearest Neighbors
//! - Support Vector Regression
//! - AdaBoost
//! - Seeded train/test splitting, the model registry, holdout evaluation and refit

mod models;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod gradient_boosting;
pub mod knn;
pub mod svm;
pub mod adaboost;
pub mod xgboost;
pub mod lightgbm;
pub mod split;
pub mod registry;
pub mod evaluator;
pub mod refit;

pub use models::{r2_score, RegressionMetrics, Regressor};
pub use linear_models::{LinearFit, LinearRegression, RidgeRegression, LassoRegression, ElasticNetRegression};
pub use decision_tree::{DecisionTreeRegressor, TreeNode};
pub use random_forest::RandomForestRegressor;
pub use gradient_boosting::{GradientBoostingRegressor, GradientBoostingConfig};
pub use knn::{KNNRegressor, KNNConfig, WeightScheme};
pub use svm::{SVMRegressor, SVRConfig};
pub use adaboost::AdaBoostRegressor;
pub use xgboost::{XGBoostRegressor, XGBoostConfig};
pub use lightgbm::{LightGBMRegressor, LightGBMConfig, BoostingType};
pub use split::{train_test_split, SplitConfig, TrainTestSplit};
pub use registry::{ModelEntry, ModelFactory, ModelRegistry};
pub use evaluator::{
    evaluate_all, EvaluationReport, Evaluator, EvaluatorConfig, ModelOutcome, ModelScore,
};
pub use refit::predict_for;
