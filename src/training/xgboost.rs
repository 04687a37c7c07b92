//! XGBoost-style gradient boosting with second-order approximation
//!
//! Key differences from plain gradient boosting:
//! - Uses both gradient (first derivative) and hessian (second derivative) of loss
//! - Regularized leaf weights: w* = -G / (H + lambda)
//! - Gain-based split scoring: Gain = 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)] - γ
//! - Built-in L1 (alpha) and L2 (lambda) regularization
//! - Minimum child weight constraint

use crate::error::{BConnectError, Result};
use super::decision_tree::TreeNode;
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
pub(crate) fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g_adj = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g_adj / (h_sum + lambda)
}

/// Structure score of a node, `G² / (H + λ)`
pub(crate) fn node_score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

/// Best split on one feature: (feature, threshold, gain)
type XgbSplit = (usize, f64, f64);

/// Exact greedy split search over one feature
fn find_best_split_for_feature(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    config: &XGBoostConfig,
) -> Option<XgbSplit> {
    let mut sorted: Vec<usize> = indices.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let g_total: f64 = sorted.iter().map(|&i| grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| hess[i]).sum();
    let lambda = config.reg_lambda;
    let parent = node_score(g_total, h_total, lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<XgbSplit> = None;

    for pos in 0..sorted.len().saturating_sub(1) {
        let idx = sorted[pos];
        let next = sorted[pos + 1];
        g_left += grad[idx];
        h_left += hess[idx];

        if x[[next, feature]] <= x[[idx, feature]] {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (node_score(g_left, h_left, lambda) + node_score(g_right, h_right, lambda) - parent)
            - config.gamma;

        if best.map_or(true, |b| gain > b.2) {
            let threshold = (x[[idx, feature]] + x[[next, feature]]) / 2.0;
            best = Some((feature, threshold, gain));
        }
    }

    best
}

/// Depth-wise tree growth on gradient statistics
fn build_xgb_tree(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: Vec<usize>,
    feature_indices: &[usize],
    depth: usize,
    config: &XGBoostConfig,
) -> TreeNode {
    let n_samples = indices.len();
    let g_sum: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| hess[i]).sum();
    let leaf = TreeNode::Leaf {
        value: compute_leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha),
        n_samples,
    };

    if depth >= config.max_depth || n_samples < 2 {
        return leaf;
    }

    let candidates: Vec<Option<XgbSplit>> = feature_indices
        .par_iter()
        .map(|&f| find_best_split_for_feature(x, grad, hess, &indices, f, config))
        .collect();
    let best = candidates
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<XgbSplit>, cand| match acc {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        });

    match best {
        Some((feature_idx, threshold, gain)) if gain > 0.0 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| x[[i, feature_idx]] <= threshold);

            let left = build_xgb_tree(x, grad, hess, left_idx, feature_indices, depth + 1, config);
            let right = build_xgb_tree(x, grad, hess, right_idx, feature_indices, depth + 1, config);

            TreeNode::Split {
                feature_idx,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
                n_samples,
            }
        }
        _ => leaf,
    }
}

/// Random subset of `0..n` of size `ceil(n * ratio)`
fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    if ratio < 1.0 {
        idx.shuffle(rng);
        idx.truncate(((n as f64 * ratio).ceil() as usize).max(1));
        idx.sort_unstable();
    }
    idx
}

/// XGBoost Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    config: XGBoostConfig,
    trees: Vec<TreeNode>,
    base_score: f64,
    n_features: usize,
}

impl Default for XGBoostRegressor {
    fn default() -> Self {
        Self::new(XGBoostConfig::default())
    }
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.base_score = y.mean().unwrap_or(0.0);
        self.trees.clear();

        let mut preds = Array1::from_elem(n_samples, self.base_score);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        // squared error: hess is constant 1
        let hess = Array1::from_elem(n_samples, 1.0);

        for _ in 0..self.config.n_estimators {
            let grad: Array1<f64> = &preds - y;

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, self.n_features, self.config.colsample_bytree);

            let tree = build_xgb_tree(x, &grad, &hess, row_indices, &col_indices, 0, &self.config);

            for (pred, row) in preds.iter_mut().zip(x.rows()) {
                *pred += self.config.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }

        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(BConnectError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.config.learning_rate * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl_regressor!(XGBoostRegressor);
