//! Gradient boosted decision trees for binary classification.
//!
//! Trees are stored as flat node arrays with the root at index 0. Split nodes
//! send a row left when `x[feature] <= threshold`. Children always sit at a
//! higher index than their parent, which `Tree::validate` checks, so
//! traversal of a validated tree always terminates.
//!
//! Training uses second-order (Newton) boosting on the log-loss with exact
//! greedy split search, L2-regularized leaf weights, row bagging, per-tree
//! feature sampling and early stopping on validation ROC-AUC.

use rand::seq::index::sample;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::metrics::roc_auc;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GbdtError {
    #[error("Training set is empty")]
    EmptyDataset,

    #[error("Got {rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("Row width {found} does not match {expected} features")]
    InconsistentRowWidth { expected: usize, found: usize },

    #[error("Invalid boosting parameters: {0}")]
    InvalidParams(String),

    #[error("Training diverged at round {round}")]
    Diverged { round: usize },

    #[error("Split on feature {feature} but only {available} features are present")]
    FeatureOutOfRange { feature: usize, available: usize },

    #[error("Model expects {expected} features, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("Malformed tree: {0}")]
    MalformedTree(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        /// Loss reduction achieved by this split, used for importance
        gain: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl Node {
    pub fn split(feature: usize, threshold: f64, gain: f64, left: usize, right: usize) -> Self {
        Node::Split {
            feature,
            threshold,
            gain,
            left,
            right,
        }
    }

    pub fn leaf(value: f64) -> Self {
        Node::Leaf { value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Walk from the root to a leaf and return its value
    pub fn evaluate(&self, features: &[f64]) -> Result<f64, GbdtError> {
        let mut index = 0;

        // A well-formed tree reaches a leaf in at most `nodes.len()` steps
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return Ok(*value),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                }) => {
                    let value = features.get(*feature).ok_or(GbdtError::FeatureOutOfRange {
                        feature: *feature,
                        available: features.len(),
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(GbdtError::MalformedTree(format!(
                        "node {} does not exist",
                        index
                    )))
                }
            }
        }

        Err(GbdtError::MalformedTree("traversal did not reach a leaf".to_string()))
    }

    pub fn validate(&self, num_features: usize) -> Result<(), GbdtError> {
        if self.nodes.is_empty() {
            return Err(GbdtError::MalformedTree("tree has no nodes".to_string()));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(GbdtError::MalformedTree(format!(
                            "leaf {} has non-finite value",
                            index
                        )));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= num_features {
                        return Err(GbdtError::FeatureOutOfRange {
                            feature: *feature,
                            available: num_features,
                        });
                    }
                    if !threshold.is_finite() {
                        return Err(GbdtError::MalformedTree(format!(
                            "split {} has non-finite threshold",
                            index
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(GbdtError::MalformedTree(format!(
                                "split {} points to invalid child {}",
                                index, child
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Trained ensemble: `sigmoid(base_score + sum(tree outputs))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedModel {
    pub base_score: f64,
    pub num_features: usize,
    pub trees: Vec<Tree>,
}

impl BoostedModel {
    pub fn raw_score(&self, features: &[f64]) -> Result<f64, GbdtError> {
        if features.len() != self.num_features {
            return Err(GbdtError::FeatureCountMismatch {
                expected: self.num_features,
                found: features.len(),
            });
        }

        self.trees
            .iter()
            .try_fold(self.base_score, |acc, tree| Ok(acc + tree.evaluate(features)?))
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, GbdtError> {
        self.raw_score(features).map(sigmoid)
    }

    /// Total split gain per feature index
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut gains = vec![0.0; self.num_features];
        for node in self.trees.iter().flat_map(|tree| tree.nodes.iter()) {
            if let Node::Split { feature, gain, .. } = node {
                if let Some(total) = gains.get_mut(*feature) {
                    *total += gain;
                }
            }
        }
        gains
    }

    pub fn validate(&self) -> Result<(), GbdtError> {
        if !self.base_score.is_finite() {
            return Err(GbdtError::MalformedTree("non-finite base score".to_string()));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.num_features))
    }
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoostingParams {
    pub num_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub lambda_l2: f64,
    pub min_split_gain: f64,
    pub feature_fraction: f64,
    pub bagging_fraction: f64,
    pub bagging_freq: usize,
    /// Stop after this many rounds without validation improvement; 0 disables
    pub early_stopping_rounds: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            num_rounds: 200,
            learning_rate: 0.05,
            max_depth: 6,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            lambda_l2: 1.0,
            min_split_gain: 0.0,
            feature_fraction: 0.9,
            bagging_fraction: 0.8,
            bagging_freq: 5,
            early_stopping_rounds: 20,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), GbdtError> {
        let unit = |v: f64| v > 0.0 && v <= 1.0;

        if self.num_rounds == 0 {
            return Err(GbdtError::InvalidParams("num_rounds must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GbdtError::InvalidParams("learning_rate must be positive".into()));
        }
        if self.min_child_samples == 0 {
            return Err(GbdtError::InvalidParams("min_child_samples must be positive".into()));
        }
        if !(self.lambda_l2 >= 0.0 && self.min_child_weight >= 0.0 && self.min_split_gain >= 0.0) {
            return Err(GbdtError::InvalidParams("regularization terms must be non-negative".into()));
        }
        if !unit(self.feature_fraction) || !unit(self.bagging_fraction) {
            return Err(GbdtError::InvalidParams("sampling fractions must be in (0, 1]".into()));
        }
        Ok(())
    }
}

/// Outcome of a boosting run
#[derive(Debug, Clone)]
pub struct FitReport {
    pub model: BoostedModel,
    pub rounds_run: usize,
    /// Number of trees kept (the best validation round when monitored)
    pub best_round: usize,
    pub best_validation_auc: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct GrowContext<'a, X> {
    rows: &'a [X],
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a BoostingParams,
}

impl<X: AsRef<[f64]> + Sync> GrowContext<'_, X> {
    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda_l2) * self.params.learning_rate
    }

    fn structure_score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda_l2)
    }

    fn grow(&self, indices: Vec<usize>, depth: usize, nodes: &mut Vec<Node>) -> usize {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();

        let id = nodes.len();
        nodes.push(Node::leaf(self.leaf_value(g, h)));

        if depth >= self.params.max_depth || indices.len() < 2 * self.params.min_child_samples {
            return id;
        }

        let Some(best) = self.best_split(&indices, g, h) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i].as_ref()[best.feature] <= best.threshold);

        let left = self.grow(left_rows, depth + 1, nodes);
        let right = self.grow(right_rows, depth + 1, nodes);
        nodes[id] = Node::split(best.feature, best.threshold, best.gain, left, right);

        id
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&feature| self.best_split_for_feature(indices, feature, g, h))
            .collect();

        // Sequential reduce keeps ties on the lowest feature index
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                Some(current) if current.gain >= candidate.gain => Some(current),
                _ => Some(candidate),
            })
    }

    fn best_split_for_feature(
        &self,
        indices: &[usize],
        feature: usize,
        g: f64,
        h: f64,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (self.rows[i].as_ref()[feature], i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let n = order.len();
        let parent = self.structure_score(g, h);
        let min_samples = self.params.min_child_samples;
        let min_weight = self.params.min_child_weight;

        let mut best: Option<SplitCandidate> = None;
        let mut gl = 0.0;
        let mut hl = 0.0;

        for k in 0..n.saturating_sub(1) {
            let (value, row) = order[k];
            gl += self.grad[row];
            hl += self.hess[row];

            let next_value = order[k + 1].0;
            if value == next_value {
                continue;
            }

            let left_count = k + 1;
            let right_count = n - left_count;
            if left_count < min_samples {
                continue;
            }
            if right_count < min_samples {
                break;
            }

            let gr = g - gl;
            let hr = h - hl;
            if hl < min_weight || hr < min_weight {
                continue;
            }

            let gain = 0.5 * (self.structure_score(gl, hl) + self.structure_score(gr, hr) - parent);
            if gain > self.params.min_split_gain && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next_value) / 2.0,
                    gain,
                });
            }
        }

        best
    }
}

fn sample_sorted<R: Rng>(rng: &mut R, population: usize, fraction: f64) -> Vec<usize> {
    let amount = ((population as f64) * fraction).round().clamp(1.0, population as f64) as usize;
    let mut picked = sample(rng, population, amount).into_vec();
    picked.sort_unstable();
    picked
}

fn check_shape<X: AsRef<[f64]>>(rows: &[X], labels: &[bool], width: usize) -> Result<(), GbdtError> {
    if rows.len() != labels.len() {
        return Err(GbdtError::LengthMismatch {
            rows: rows.len(),
            labels: labels.len(),
        });
    }
    if let Some(row) = rows.iter().find(|row| row.as_ref().len() != width) {
        return Err(GbdtError::InconsistentRowWidth {
            expected: width,
            found: row.as_ref().len(),
        });
    }
    Ok(())
}

/// Fit a boosted ensemble on `train`, monitoring ROC-AUC on `validation`
pub fn fit<X, R>(
    params: &BoostingParams,
    train: (&[X], &[bool]),
    validation: Option<(&[X], &[bool])>,
    rng: &mut R,
) -> Result<FitReport, GbdtError>
where
    X: AsRef<[f64]> + Sync,
    R: Rng,
{
    params.validate()?;

    let (rows, labels) = train;
    let Some(first) = rows.first() else {
        return Err(GbdtError::EmptyDataset);
    };
    let num_features = first.as_ref().len();
    if num_features == 0 {
        return Err(GbdtError::InvalidParams("rows have no features".into()));
    }
    check_shape(rows, labels, num_features)?;
    if let Some((valid_rows, valid_labels)) = validation {
        check_shape(valid_rows, valid_labels, num_features)?;
    }

    let n = rows.len();
    let positives = labels.iter().filter(|&&y| y).count();
    let prior = (positives as f64 / n as f64).clamp(1e-6, 1.0 - 1e-6);
    let base_score = (prior / (1.0 - prior)).ln();

    let mut train_raw = vec![base_score; n];
    let mut valid_raw = validation.map(|(valid_rows, _)| vec![base_score; valid_rows.len()]);
    let mut grad = vec![0.0; n];
    let mut hess = vec![0.0; n];
    let mut bag: Vec<usize> = (0..n).collect();

    let mut trees = Vec::with_capacity(params.num_rounds);
    let mut best_round = 0;
    let mut best_auc: Option<f64> = None;
    let mut rounds_since_best = 0;

    for round in 0..params.num_rounds {
        if params.bagging_fraction < 1.0 && params.bagging_freq > 0 && round % params.bagging_freq == 0 {
            bag = sample_sorted(rng, n, params.bagging_fraction);
        }

        for i in 0..n {
            let p = sigmoid(train_raw[i]);
            let y = if labels[i] { 1.0 } else { 0.0 };
            grad[i] = p - y;
            hess[i] = (p * (1.0 - p)).max(1e-16);
        }

        let features = sample_sorted(rng, num_features, params.feature_fraction);
        let ctx = GrowContext {
            rows,
            grad: &grad,
            hess: &hess,
            features: &features,
            params,
        };

        let mut nodes = Vec::new();
        ctx.grow(bag.clone(), 0, &mut nodes);
        let tree = Tree::new(nodes);

        for (raw, row) in train_raw.iter_mut().zip(rows) {
            *raw += tree.evaluate(row.as_ref())?;
            if !raw.is_finite() {
                return Err(GbdtError::Diverged { round });
            }
        }

        if let (Some((valid_rows, valid_labels)), Some(valid_raw)) = (validation, valid_raw.as_mut()) {
            for (raw, row) in valid_raw.iter_mut().zip(valid_rows) {
                *raw += tree.evaluate(row.as_ref())?;
            }

            // Single-class validation sets give no AUC; boosting then runs all rounds
            if let Some(auc) = roc_auc(valid_labels, valid_raw.as_slice()).filter(|auc| auc.is_finite()) {
                if best_auc.map_or(true, |best| auc > best) {
                    best_auc = Some(auc);
                    best_round = round + 1;
                    rounds_since_best = 0;
                } else {
                    rounds_since_best += 1;
                }
            }
        }

        trees.push(tree);

        if round % 50 == 0 {
            tracing::debug!(
                "Boosting round {}: best validation AUC {:?} at round {}",
                round,
                best_auc,
                best_round
            );
        }

        if params.early_stopping_rounds > 0 && rounds_since_best >= params.early_stopping_rounds {
            tracing::info!(
                "Early stopping at round {}, best round {} (validation AUC {:?})",
                round + 1,
                best_round,
                best_auc
            );
            break;
        }
    }

    let rounds_run = trees.len();
    if best_auc.is_some() {
        trees.truncate(best_round);
    } else {
        best_round = rounds_run;
    }

    Ok(FitReport {
        model: BoostedModel {
            base_score,
            num_features,
            trees,
        },
        rounds_run,
        best_round,
        best_validation_auc: best_auc,
    })
}
