use crate::error::PredictorError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const MIN_HESSIAN: f64 = 1e-6;
const EPSILON: f64 = 1e-15;

/// Booster hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled for each round
    pub subsample: f64,
    /// Fraction of features sampled for each tree
    pub colsample_bytree: f64,
    /// Minimum loss reduction required to split
    pub gamma: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// L2 regularisation on leaf weights
    pub lambda: f64,
    pub seed: u64,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample_bytree: 0.8,
            gamma: 0.2,
            min_child_weight: 3.0,
            lambda: 1.0,
            seed: crate::config::DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    Multiclass { num_class: usize },
    Binary,
}

impl Objective {
    fn trees_per_round(&self) -> usize {
        match self {
            Objective::Multiclass { num_class } => *num_class,
            Objective::Binary => 1,
        }
    }

    pub fn num_class(&self) -> usize {
        match self {
            Objective::Multiclass { num_class } => *num_class,
            Objective::Binary => 2,
        }
    }

    /// Turn raw margins into class probabilities
    fn transform(&self, margins: &[f64]) -> Vec<f64> {
        match self {
            Objective::Binary => {
                let p = sigmoid(margins[0]);
                vec![1.0 - p, p]
            }
            Objective::Multiclass { .. } => softmax(margins),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// NaN sorts first and always follows the left branch
fn sort_key(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row[*feature];
                    idx = if value.is_nan() || value < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    fn split_features(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            Node::Split { feature, .. } => Some(*feature),
            Node::Leaf { .. } => None,
        })
    }
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

/// Grows one tree on a fixed set of gradients
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    /// Feature ids available to this tree, parallel to the sorted row lists
    features: &'a [usize],
    config: &'a BoosterConfig,
    goes_left: Vec<bool>,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    /// `sorted[j]` holds the node's rows ordered by feature `features[j]`
    fn build(&mut self, sorted: Vec<Vec<usize>>, depth: usize) -> usize {
        let rows = &sorted[0];
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: -g / (h + self.config.lambda) * self.config.learning_rate,
        });

        if depth >= self.config.max_depth || rows.len() < 2 {
            return idx;
        }

        let Some(split) = self.best_split(&sorted, g, h) else {
            return idx;
        };

        for &r in rows {
            let value = self.x[r][split.feature];
            self.goes_left[r] = value.is_nan() || value < split.threshold;
        }
        let (left_sorted, right_sorted): (Vec<_>, Vec<_>) = sorted
            .into_iter()
            .map(|list| {
                list.into_iter()
                    .partition::<Vec<usize>, _>(|&r| self.goes_left[r])
            })
            .unzip();

        let left = self.build(left_sorted, depth + 1);
        let right = self.build(right_sorted, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, sorted: &[Vec<usize>], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.config.lambda;
        let parent = g * g / (h + lambda);
        let mut best: Option<SplitCandidate> = None;

        for (list, &feature) in sorted.iter().zip(self.features) {
            let (mut gl, mut hl) = (0.0, 0.0);
            for pair in list.windows(2) {
                let (r, next) = (pair[0], pair[1]);
                gl += self.grad[r];
                hl += self.hess[r];

                let value = sort_key(self.x[r][feature]);
                let next_value = sort_key(self.x[next][feature]);
                if value == next_value {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < self.config.min_child_weight || hr < self.config.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent)
                    - self.config.gamma;
                if gain > EPSILON && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        threshold: split_point(value, next_value),
                    });
                }
            }
        }

        best
    }
}

/// A threshold strictly above `value` and no higher than `next`
fn split_point(value: f64, next: f64) -> f64 {
    if value == f64::NEG_INFINITY {
        return next;
    }
    let mid = value + (next - value) / 2.0;
    if mid <= value || !mid.is_finite() {
        next
    } else {
        mid
    }
}

/// A trained boosted ensemble. Multiclass models fit one tree per class per
/// round under a softmax; binary models use a logistic link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    config: BoosterConfig,
    objective: Objective,
    feature_names: Vec<String>,
    /// Round-major: tree `i` scores class `i % trees_per_round`
    trees: Vec<RegressionTree>,
}

impl GradientBooster {
    /// Fit on row-major features `x` with class labels `y`
    pub fn fit(
        config: BoosterConfig,
        objective: Objective,
        feature_names: Vec<String>,
        x: &[Vec<f64>],
        y: &[usize],
    ) -> Result<Self, PredictorError> {
        if x.is_empty() {
            return Err(PredictorError::EmptyDataset("no training rows".to_string()));
        }
        if x.len() != y.len() {
            return Err(PredictorError::LabelCountMismatch {
                rows: x.len(),
                labels: y.len(),
            });
        }
        let n_features = feature_names.len();
        if n_features == 0 {
            return Err(PredictorError::EmptyDataset("no feature columns".to_string()));
        }
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(PredictorError::FeatureMismatch {
                expected: n_features,
                received: row.len(),
            });
        }
        let num_class = objective.num_class();
        if let Some(&label) = y.iter().find(|&&label| label >= num_class) {
            return Err(PredictorError::InvalidLabel {
                label: label as i64,
                num_class,
            });
        }

        let n = x.len();
        let k = objective.trees_per_round();
        let mut rng = StdRng::seed_from_u64(config.seed);

        // Every feature's row order, computed once
        let global_sorted: Vec<Vec<usize>> = (0..n_features)
            .map(|f| {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| sort_key(x[a][f]).total_cmp(&sort_key(x[b][f])));
                order
            })
            .collect();

        let cols_per_tree = ((config.colsample_bytree * n_features as f64).round() as usize)
            .clamp(1, n_features.max(1));

        let mut margins = vec![vec![0.0; k]; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(config.n_estimators * k);

        for _ in 0..config.n_estimators {
            let mut sampled: Vec<bool> = (0..n).map(|_| rng.gen::<f64>() < config.subsample).collect();
            if !sampled.iter().any(|&s| s) {
                sampled.iter_mut().for_each(|s| *s = true);
            }

            let probs: Vec<Vec<f64>> = margins.iter().map(|m| objective.transform(m)).collect();

            for class in 0..k {
                for i in 0..n {
                    let (p, target) = match objective {
                        Objective::Binary => (probs[i][1], (y[i] == 1) as u8 as f64),
                        Objective::Multiclass { .. } => {
                            (probs[i][class], (y[i] == class) as u8 as f64)
                        }
                    };
                    grad[i] = p - target;
                    hess[i] = match objective {
                        Objective::Binary => (p * (1.0 - p)).max(MIN_HESSIAN),
                        Objective::Multiclass { .. } => (2.0 * p * (1.0 - p)).max(MIN_HESSIAN),
                    };
                }

                let mut features: Vec<usize> = (0..n_features).collect();
                features.shuffle(&mut rng);
                features.truncate(cols_per_tree);
                features.sort_unstable();

                let root: Vec<Vec<usize>> = features
                    .iter()
                    .map(|&f| {
                        global_sorted[f]
                            .iter()
                            .copied()
                            .filter(|&r| sampled[r])
                            .collect()
                    })
                    .collect();

                let mut builder = TreeBuilder {
                    x,
                    grad: &grad,
                    hess: &hess,
                    features: &features,
                    config: &config,
                    goes_left: vec![false; n],
                    nodes: Vec::new(),
                };
                builder.build(root, 0);
                let tree = RegressionTree {
                    nodes: builder.nodes,
                };

                for (row, margin) in x.iter().zip(margins.iter_mut()) {
                    margin[class] += tree.predict(row);
                }
                trees.push(tree);
            }
        }

        Ok(Self {
            config,
            objective,
            feature_names,
            trees,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
    }

    fn check_row(&self, row: &[f64]) -> Result<(), PredictorError> {
        if row.len() != self.feature_names.len() {
            return Err(PredictorError::FeatureMismatch {
                expected: self.feature_names.len(),
                received: row.len(),
            });
        }
        Ok(())
    }

    /// Raw additive scores, one per tree group
    pub fn predict_margin(&self, row: &[f64]) -> Result<Vec<f64>, PredictorError> {
        self.check_row(row)?;
        let k = self.objective.trees_per_round();
        let mut margins = vec![0.0; k];
        for (i, tree) in self.trees.iter().enumerate() {
            margins[i % k] += tree.predict(row);
        }
        Ok(margins)
    }

    /// Class probabilities; for binary models `[p(0), p(1)]`
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, PredictorError> {
        let margins = self.predict_margin(row)?;
        Ok(self.objective.transform(&margins))
    }

    /// Most probable class
    pub fn predict(&self, row: &[f64]) -> Result<usize, PredictorError> {
        let probs = self.predict_proba(row)?;
        Ok(probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(class, _)| class)
            .unwrap_or(0))
    }

    /// How many splits use each feature, by name, most used first
    pub fn feature_importance(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.feature_names.len()];
        for feature in self.trees.iter().flat_map(RegressionTree::split_features) {
            counts[feature] += 1;
        }
        let mut importance: Vec<(String, usize)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(counts)
            .collect();
        importance.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        importance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BoosterConfig {
        BoosterConfig {
            n_estimators: 40,
            learning_rate: 0.3,
            gamma: 0.0,
            min_child_weight: 1.0,
            ..BoosterConfig::default()
        }
    }

    /// Three well separated bands on feature 0, noise on feature 1
    fn banded_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..150 {
            let class = i % 3;
            let centre = class as f64 * 10.0;
            x.push(vec![centre + (i % 7) as f64 * 0.3, ((i * 37) % 11) as f64]);
            y.push(class);
        }
        (x, y)
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_multiclass_learns_bands() {
        let (x, y) = banded_data();
        let model = GradientBooster::fit(
            small_config(),
            Objective::Multiclass { num_class: 3 },
            names(2),
            &x,
            &y,
        )
        .unwrap();

        assert_eq!(model.num_trees(), 40 * 3);
        assert!(model.max_tree_depth() <= 4);

        let correct = x
            .iter()
            .zip(&y)
            .filter(|(row, &label)| model.predict(row).unwrap() == label)
            .count();
        assert!(correct as f64 / x.len() as f64 > 0.95);

        let probs = model.predict_proba(&[20.5, 3.0]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[2] > 0.8);

        let importance = model.feature_importance();
        assert_eq!(importance.len(), 2);
        assert!(importance[0].1 >= importance[1].1);
        assert!(importance.iter().any(|(name, count)| name == "f0" && *count > 0));
    }

    #[test]
    fn test_binary_objective() {
        let x: Vec<Vec<f64>> = (0..120).map(|i| vec![i as f64]).collect();
        let y: Vec<usize> = (0..120).map(|i| usize::from(i >= 60)).collect();
        let model =
            GradientBooster::fit(small_config(), Objective::Binary, names(1), &x, &y).unwrap();

        assert_eq!(model.num_trees(), 40);
        let low = model.predict_proba(&[5.0]).unwrap();
        let high = model.predict_proba(&[110.0]).unwrap();
        assert_eq!(low.len(), 2);
        assert!(low[1] < 0.2);
        assert!(high[1] > 0.8);
        assert_eq!(model.predict(&[110.0]).unwrap(), 1);
    }

    #[test]
    fn test_nan_goes_left() {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![if i < 30 { f64::NAN } else { i as f64 }])
            .collect();
        let y: Vec<usize> = (0..60).map(|i| usize::from(i >= 30)).collect();
        let model =
            GradientBooster::fit(small_config(), Objective::Binary, names(1), &x, &y).unwrap();
        assert!(model.predict_proba(&[f64::NAN]).unwrap()[1] < 0.2);
        assert!(model.predict_proba(&[45.0]).unwrap()[1] > 0.8);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = banded_data();
        let objective = Objective::Multiclass { num_class: 3 };
        let a = GradientBooster::fit(small_config(), objective, names(2), &x, &y).unwrap();
        let b = GradientBooster::fit(small_config(), objective, names(2), &x, &y).unwrap();
        for row in x.iter().take(20) {
            assert_eq!(a.predict_proba(row).unwrap(), b.predict_proba(row).unwrap());
        }
    }

    #[test]
    fn test_gamma_blocks_weak_splits() {
        let (x, y) = banded_data();
        let config = BoosterConfig {
            gamma: 1e9,
            ..small_config()
        };
        let model =
            GradientBooster::fit(config, Objective::Multiclass { num_class: 3 }, names(2), &x, &y)
                .unwrap();
        assert_eq!(model.max_tree_depth(), 0);
    }

    #[test]
    fn test_input_validation() {
        let objective = Objective::Multiclass { num_class: 3 };
        assert!(matches!(
            GradientBooster::fit(small_config(), objective, names(2), &[], &[]),
            Err(PredictorError::EmptyDataset(_))
        ));
        assert!(matches!(
            GradientBooster::fit(small_config(), objective, names(2), &[vec![1.0]], &[0]),
            Err(PredictorError::FeatureMismatch { expected: 2, received: 1 })
        ));
        assert!(matches!(
            GradientBooster::fit(small_config(), objective, names(1), &[vec![1.0]], &[3]),
            Err(PredictorError::InvalidLabel { label: 3, num_class: 3 })
        ));
        assert!(matches!(
            GradientBooster::fit(small_config(), objective, names(1), &[vec![1.0], vec![2.0]], &[0]),
            Err(PredictorError::LabelCountMismatch { rows: 2, labels: 1 })
        ));

        let (x, y) = banded_data();
        let model = GradientBooster::fit(small_config(), objective, names(2), &x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&[1.0, 2.0, 3.0]),
            Err(PredictorError::FeatureMismatch { expected: 2, received: 3 })
        ));
    }

    #[test]
    fn test_model_survives_json() {
        let (x, y) = banded_data();
        let model = GradientBooster::fit(
            small_config(),
            Objective::Multiclass { num_class: 3 },
            names(2),
            &x,
            &y,
        )
        .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let loaded: GradientBooster = serde_json::from_str(&json).unwrap();
        let before = model.predict_proba(&x[10]).unwrap();
        let after = loaded.predict_proba(&x[10]).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
