//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Differences from the depth-wise booster in [`super::xgboost`]:
//! - Leaf-wise (best-first) growth bounded by `max_leaves`
//! - `min_child_samples` instead of a hessian bound
//! - Optional Gradient-based One-Side Sampling (GOSS)

use crate::error::{BConnectError, Result};
use super::decision_tree::TreeNode;
use super::models::{check_fit_input, check_predict_input, impl_regressor};
use super::xgboost::{compute_leaf_weight, node_score};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Row sampling strategy per boosting round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoostingType {
    /// Every row, every round
    Gbdt,
    /// Keep the largest gradients, sample the rest and re-weight them
    Goss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub colsample_bytree: f64,
    pub boosting_type: BoostingType,
    /// GOSS: fraction of rows kept by gradient magnitude
    pub top_rate: f64,
    /// GOSS: fraction of rows sampled from the remainder
    pub other_rate: f64,
    pub random_state: u64,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            colsample_bytree: 1.0,
            boosting_type: BoostingType::Gbdt,
            top_rate: 0.2,
            other_rate: 0.1,
            random_state: 42,
        }
    }
}

struct SplitResult {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Split waiting in the best-first queue
struct PendingSplit {
    node_id: usize,
    split: SplitResult,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    // Higher gain first, then the older node
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .total_cmp(&other.split.gain)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Growth context shared by every node of one tree
struct LeafWiseBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    features: Vec<usize>,
    config: &'a LightGBMConfig,
}

impl LeafWiseBuilder<'_> {
    fn best_split(&self, indices: &[usize]) -> Option<SplitResult> {
        if indices.len() < self.config.min_child_samples.max(1) * 2 {
            return None;
        }
        let per_feature: Vec<Option<SplitResult>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split_for_feature(indices, f))
            .collect();
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<SplitResult>, cand| match acc {
                Some(b) if b.gain >= cand.gain => Some(b),
                _ => Some(cand),
            })
    }

    fn best_split_for_feature(&self, indices: &[usize], feature: usize) -> Option<SplitResult> {
        let x = self.x;
        let lambda = self.config.reg_lambda;
        let min_child = self.config.min_child_samples.max(1);

        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let total_g: f64 = sorted.iter().map(|&i| self.grad[i]).sum();
        let total_h: f64 = sorted.iter().map(|&i| self.hess[i]).sum();
        let parent = node_score(total_g, total_h, lambda);

        let mut left_g = 0.0;
        let mut left_h = 0.0;
        let mut best: Option<(usize, f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            let (cur, next) = (sorted[pos], sorted[pos + 1]);
            left_g += self.grad[cur];
            left_h += self.hess[cur];

            let n_left = pos + 1;
            if n_left < min_child || sorted.len() - n_left < min_child {
                continue;
            }
            if x[[next, feature]] <= x[[cur, feature]] {
                continue;
            }

            let gain = node_score(left_g, left_h, lambda)
                + node_score(total_g - left_g, total_h - left_h, lambda)
                - parent;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                best = Some((n_left, (x[[cur, feature]] + x[[next, feature]]) / 2.0, gain));
            }
        }

        best.map(|(n_left, threshold, gain)| {
            let right = sorted.split_off(n_left);
            SplitResult {
                feature,
                threshold,
                gain,
                left: sorted,
                right,
            }
        })
    }

    fn leaf(&self, indices: &[usize]) -> TreeNode {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        TreeNode::Leaf {
            value: compute_leaf_weight(g, h, self.config.reg_lambda, self.config.reg_alpha),
            n_samples: indices.len(),
        }
    }

    /// Best-first growth until `max_leaves` or no positive gain remains
    fn build(&self, indices: Vec<usize>) -> TreeNode {
        let max_depth = self.config.max_depth.unwrap_or(usize::MAX);
        let mut heap = BinaryHeap::new();
        if let Some(split) = self.best_split(&indices) {
            heap.push(PendingSplit { node_id: 0, split });
        }
        let mut nodes = vec![NodeSlot::Leaf(indices)];
        let mut depths = vec![0usize];
        let mut n_leaves = 1;

        while n_leaves < self.config.max_leaves.max(2) {
            let Some(PendingSplit { node_id, split }) = heap.pop() else {
                break;
            };
            let depth = depths[node_id] + 1;
            let n_samples = split.left.len() + split.right.len();
            let (left_id, right_id) = (nodes.len(), nodes.len() + 1);

            for (child_id, child) in [(left_id, &split.left), (right_id, &split.right)] {
                if depth < max_depth {
                    if let Some(child_split) = self.best_split(child) {
                        heap.push(PendingSplit { node_id: child_id, split: child_split });
                    }
                }
            }

            nodes.push(NodeSlot::Leaf(split.left));
            nodes.push(NodeSlot::Leaf(split.right));
            depths.extend([depth, depth]);
            nodes[node_id] = NodeSlot::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_id,
                right: right_id,
                n_samples,
            };
            n_leaves += 1;
        }

        self.assemble(&nodes, 0)
    }

    fn assemble(&self, nodes: &[NodeSlot], idx: usize) -> TreeNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => self.leaf(indices),
            NodeSlot::Split { feature, threshold, left, right, n_samples } => TreeNode::Split {
                feature_idx: *feature,
                threshold: *threshold,
                left: Box::new(self.assemble(nodes, *left)),
                right: Box::new(self.assemble(nodes, *right)),
                n_samples: *n_samples,
            },
        }
    }
}

/// GOSS row selection; sampled small-gradient rows get weight `(1 - a) / b`
fn goss_sample(
    gradients: &[f64],
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<usize>, Vec<f64>) {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| gradients[b].abs().total_cmp(&gradients[a].abs()));

    let mut weights = vec![0.0; n];
    let mut selected: Vec<usize> = order[..n_top].to_vec();
    for &i in &selected {
        weights[i] = 1.0;
    }

    let mut rest = order[n_top..].to_vec();
    rest.shuffle(rng);
    let amplify = if other_rate > 0.0 { (1.0 - top_rate) / other_rate } else { 1.0 };
    for &i in rest.iter().take(n_other) {
        weights[i] = amplify;
        selected.push(i);
    }
    selected.sort_unstable();
    (selected, weights)
}

/// LightGBM Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMRegressor {
    pub config: LightGBMConfig,
    trees: Vec<TreeNode>,
    base_prediction: f64,
    n_features: usize,
}

impl Default for LightGBMRegressor {
    fn default() -> Self {
        Self::new(LightGBMConfig::default())
    }
}

impl LightGBMRegressor {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.boosting_type == BoostingType::Goss
            && self.config.top_rate + self.config.other_rate > 1.0
        {
            return Err(BConnectError::InvalidInput(
                "GOSS requires top_rate + other_rate <= 1".to_string(),
            ));
        }

        let n = x.nrows();
        self.n_features = x.ncols();
        self.base_prediction = y.mean().unwrap_or(0.0);
        self.trees.clear();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let mut predictions = Array1::from_elem(n, self.base_prediction);

        for _ in 0..self.config.n_estimators {
            let mut gradients: Vec<f64> =
                predictions.iter().zip(y.iter()).map(|(&p, &yi)| p - yi).collect();
            let mut hessians = vec![1.0; n];

            let rows = match self.config.boosting_type {
                BoostingType::Gbdt => (0..n).collect(),
                BoostingType::Goss => {
                    let (rows, weights) =
                        goss_sample(&gradients, self.config.top_rate, self.config.other_rate, &mut rng);
                    for i in 0..n {
                        gradients[i] *= weights[i];
                        hessians[i] *= weights[i];
                    }
                    rows
                }
            };

            let n_cols = ((self.n_features as f64 * self.config.colsample_bytree).ceil() as usize)
                .clamp(1, self.n_features);
            let mut features: Vec<usize> = (0..self.n_features).collect();
            if n_cols < self.n_features {
                features.shuffle(&mut rng);
                features.truncate(n_cols);
                features.sort_unstable();
            }

            let builder = LeafWiseBuilder {
                x,
                grad: &gradients,
                hess: &hessians,
                features,
                config: &self.config,
            };
            let tree = builder.build(rows);

            for (pred, row) in predictions.iter_mut().zip(x.rows()) {
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

        let lr = self.config.learning_rate;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                self.base_prediction + self.trees.iter().map(|t| lr * t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl_regressor!(LightGBMRegressor);
