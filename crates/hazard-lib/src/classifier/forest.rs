//! Bagged ensemble of randomized decision trees
//!
//! Each tree is grown on a bootstrap resample of the training set. At every
//! node a random subset of `floor(log2(F)) + 1` features is searched for the
//! split with the highest information gain; when none of them gains anything
//! the remaining features are tried before the node becomes a leaf. Leaves
//! hold normalized class-weight distributions and the forest answers with the
//! mean of its members' distributions.
//!
//! Missing values: training rows missing the split feature descend both
//! branches with weight proportional to the branch sizes, and prediction
//! blends both children by the same proportions.

use super::ProbabilisticClassifier;
use crate::dataset::{AttributeKind, Dataset, Schema};
use crate::error::{HazardError, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Default number of trees in the ensemble
pub const DEFAULT_NUM_TREES: usize = 100;

/// Depth used when no explicit limit is configured
const DEPTH_LIMIT: usize = 256;

/// Minimum information gain for a split to count
const MIN_GAIN: f64 = 1e-10;

/// Weights below this are dropped when rows are split across branches
const MIN_WEIGHT: f64 = 1e-9;

/// Ensemble parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub num_trees: usize,
    pub seed: u64,
    /// `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum total weight on each side of a split
    pub min_leaf_weight: f64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: DEFAULT_NUM_TREES,
            seed: 123,
            max_depth: None,
            min_leaf_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
enum SplitTest {
    /// Numeric: left when `x <= threshold`
    LessOrEqual(f64),
    /// Nominal: left when `x` is this value index
    Equals(f64),
}

impl SplitTest {
    fn goes_left(&self, x: f64) -> bool {
        match *self {
            SplitTest::LessOrEqual(threshold) => x <= threshold,
            SplitTest::Equals(value) => (x - value).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        test: SplitTest,
        left: usize,
        right: usize,
        /// Share of known training weight that went left
        left_fraction: f64,
    },
}

/// A single tree; nodes are stored in an arena with the root at 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    fn accumulate(&self, node: usize, x: &[Option<f64>], weight: f64, out: &mut [f64]) {
        match &self.nodes[node] {
            Node::Leaf { distribution } => {
                for (o, p) in out.iter_mut().zip(distribution) {
                    *o += weight * p;
                }
            }
            Node::Split {
                feature,
                test,
                left,
                right,
                left_fraction,
            } => match x.get(*feature).copied().flatten() {
                Some(value) if test.goes_left(value) => self.accumulate(*left, x, weight, out),
                Some(_) => self.accumulate(*right, x, weight, out),
                None => {
                    self.accumulate(*left, x, weight * left_fraction, out);
                    self.accumulate(*right, x, weight * (1.0 - left_fraction), out);
                }
            },
        }
    }

    pub fn distribution(&self, x: &[Option<f64>], num_classes: usize) -> Vec<f64> {
        let mut out = vec![0.0; num_classes];
        self.accumulate(0, x, 1.0, &mut out);
        out
    }
}

/// Weighted reference to a training row
#[derive(Debug, Clone, Copy)]
struct Item {
    row: usize,
    weight: f64,
}

struct Candidate {
    feature: usize,
    test: SplitTest,
    gain: f64,
}

struct TreeBuilder<'a> {
    data: &'a Dataset,
    nominal: Vec<bool>,
    num_classes: usize,
    subspace: usize,
    max_depth: usize,
    min_leaf_weight: f64,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
}

fn entropy(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / total;
            -p * p.log2()
        })
        .sum()
}

impl<'a> TreeBuilder<'a> {
    fn class_weights(&self, items: &[Item]) -> Vec<f64> {
        let mut counts = vec![0.0; self.num_classes];
        for item in items {
            counts[self.data.instances()[item.row].class] += item.weight;
        }
        counts
    }

    fn value(&self, item: &Item, feature: usize) -> Option<f64> {
        self.data.instances()[item.row].values[feature]
    }

    fn leaf(&mut self, counts: &[f64]) -> Node {
        let total: f64 = counts.iter().sum();
        let distribution = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / self.num_classes as f64; self.num_classes]
        };
        Node::Leaf { distribution }
    }

    /// Grow the subtree for `items`, returning its node index
    fn grow(&mut self, items: Vec<Item>, depth: usize) -> usize {
        let index = self.nodes.len();
        let counts = self.class_weights(&items);
        let total: f64 = counts.iter().sum();
        let represented = counts.iter().filter(|&&c| c > 0.0).count();

        if represented <= 1 || total < 2.0 * self.min_leaf_weight || depth >= self.max_depth {
            let leaf = self.leaf(&counts);
            self.nodes.push(leaf);
            return index;
        }

        let Some(best) = self.choose_split(&items) else {
            let leaf = self.leaf(&counts);
            self.nodes.push(leaf);
            return index;
        };

        // Reserve this slot; children are appended after it
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        let (mut left_items, mut right_items, mut missing) = (Vec::new(), Vec::new(), Vec::new());
        for item in items {
            match self.value(&item, best.feature) {
                Some(v) if best.test.goes_left(v) => left_items.push(item),
                Some(_) => right_items.push(item),
                None => missing.push(item),
            }
        }
        let left_weight: f64 = left_items.iter().map(|i| i.weight).sum();
        let right_weight: f64 = right_items.iter().map(|i| i.weight).sum();
        let left_fraction = left_weight / (left_weight + right_weight);

        for item in missing {
            let to_left = item.weight * left_fraction;
            let to_right = item.weight - to_left;
            if to_left > MIN_WEIGHT {
                left_items.push(Item {
                    row: item.row,
                    weight: to_left,
                });
            }
            if to_right > MIN_WEIGHT {
                right_items.push(Item {
                    row: item.row,
                    weight: to_right,
                });
            }
        }

        let left = self.grow(left_items, depth + 1);
        let right = self.grow(right_items, depth + 1);
        self.nodes[index] = Node::Split {
            feature: best.feature,
            test: best.test,
            left,
            right,
            left_fraction,
        };
        index
    }

    fn choose_split(&mut self, items: &[Item]) -> Option<Candidate> {
        let mut order: Vec<usize> = (0..self.nominal.len()).collect();
        order.shuffle(&mut self.rng);

        let mut best: Option<Candidate> = None;
        for (tried, &feature) in order.iter().enumerate() {
            if tried >= self.subspace && best.is_some() {
                break;
            }
            let candidate = if self.nominal[feature] {
                self.best_nominal_split(items, feature)
            } else {
                self.best_numeric_split(items, feature)
            };
            if let Some(candidate) = candidate {
                if best.as_ref().map_or(true, |b| candidate.gain > b.gain) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Gain of a binary partition of the known rows, scaled by the known share
    fn gain(&self, known: &[f64], left: &[f64], total_weight: f64) -> Option<f64> {
        let known_weight: f64 = known.iter().sum();
        let left_weight: f64 = left.iter().sum();
        let right_weight = known_weight - left_weight;
        if left_weight < self.min_leaf_weight || right_weight < self.min_leaf_weight {
            return None;
        }
        let right: Vec<f64> = known.iter().zip(left).map(|(k, l)| (k - l).max(0.0)).collect();
        let children = (left_weight * entropy(left) + right_weight * entropy(&right)) / known_weight;
        let gain = (entropy(known) - children) * (known_weight / total_weight);
        (gain > MIN_GAIN).then_some(gain)
    }

    fn best_numeric_split(&self, items: &[Item], feature: usize) -> Option<Candidate> {
        let mut known: Vec<(f64, usize, f64)> = items
            .iter()
            .filter_map(|item| {
                self.value(item, feature).map(|v| {
                    (v, self.data.instances()[item.row].class, item.weight)
                })
            })
            .collect();
        if known.len() < 2 {
            return None;
        }
        known.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let total_weight: f64 = items.iter().map(|i| i.weight).sum();
        let mut known_counts = vec![0.0; self.num_classes];
        for &(_, class, weight) in &known {
            known_counts[class] += weight;
        }

        let mut left = vec![0.0; self.num_classes];
        let mut best: Option<Candidate> = None;
        for pair in 0..known.len() - 1 {
            let (value, class, weight) = known[pair];
            left[class] += weight;
            let next = known[pair + 1].0;
            if next <= value {
                continue;
            }
            if let Some(gain) = self.gain(&known_counts, &left, total_weight) {
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        test: SplitTest::LessOrEqual((value + next) / 2.0),
                        gain,
                    });
                }
            }
        }
        best
    }

    fn best_nominal_split(&self, items: &[Item], feature: usize) -> Option<Candidate> {
        let total_weight: f64 = items.iter().map(|i| i.weight).sum();
        let mut known_counts = vec![0.0; self.num_classes];
        let mut per_value: Vec<(f64, Vec<f64>)> = Vec::new();
        for item in items {
            let Some(value) = self.value(item, feature) else {
                continue;
            };
            let class = self.data.instances()[item.row].class;
            known_counts[class] += item.weight;
            match per_value.iter_mut().find(|(v, _)| *v == value) {
                Some((_, counts)) => counts[class] += item.weight,
                None => {
                    let mut counts = vec![0.0; self.num_classes];
                    counts[class] += item.weight;
                    per_value.push((value, counts));
                }
            }
        }
        if per_value.len() < 2 {
            return None;
        }

        let mut best: Option<Candidate> = None;
        for (value, counts) in &per_value {
            if let Some(gain) = self.gain(&known_counts, counts, total_weight) {
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        test: SplitTest::Equals(*value),
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Random forest over a fixed schema
///
/// The training schema travels with the trees so that a forest is never
/// scored against vectors laid out for another attribute list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    schema: Schema,
    params: ForestParams,
}

impl RandomForest {
    /// Grow the ensemble on `data`
    pub fn train(data: &Dataset, params: &ForestParams) -> Result<Self> {
        if data.is_empty() {
            return Err(HazardError::Training("training set is empty".to_string()));
        }
        let represented = data.class_counts().iter().filter(|&&c| c > 0).count();
        if represented < 2 {
            return Err(HazardError::Training(format!(
                "training set has {} represented class(es), need at least 2",
                represented
            )));
        }
        let num_features = data.schema().num_features();
        if num_features == 0 {
            return Err(HazardError::Training("schema has no features".to_string()));
        }
        if params.num_trees == 0 {
            return Err(HazardError::Training("tree count must be positive".to_string()));
        }

        let start = Instant::now();
        let nominal: Vec<bool> = data
            .schema()
            .features()
            .iter()
            .map(|a| matches!(a.kind, AttributeKind::Nominal { .. }))
            .collect();
        let subspace = ((num_features as f64).log2().floor() as usize + 1).min(num_features);
        let num_classes = data.schema().num_classes();
        let n = data.len();

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.num_trees);
        for _ in 0..params.num_trees {
            let mut tree_rng = ChaCha8Rng::seed_from_u64(rng.gen());

            let mut multiplicity = vec![0u32; n];
            for _ in 0..n {
                multiplicity[tree_rng.gen_range(0..n)] += 1;
            }
            let items: Vec<Item> = multiplicity
                .iter()
                .enumerate()
                .filter(|&(_, &m)| m > 0)
                .map(|(row, &m)| Item {
                    row,
                    weight: m as f64,
                })
                .collect();

            let mut builder = TreeBuilder {
                data,
                nominal: nominal.clone(),
                num_classes,
                subspace,
                max_depth: params.max_depth.unwrap_or(DEPTH_LIMIT).min(DEPTH_LIMIT),
                min_leaf_weight: params.min_leaf_weight,
                rng: tree_rng,
                nodes: Vec::new(),
            };
            builder.grow(items, 0);
            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        let forest = Self {
            trees,
            schema: data.schema().clone(),
            params: params.clone(),
        };
        info!(
            trees = forest.trees.len(),
            rows = n,
            features = num_features,
            subspace,
            mean_leaves = forest.mean_leaves(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Random forest trained"
        );
        Ok(forest)
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Attribute list the trees were grown on
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_features(&self) -> usize {
        self.schema.num_features()
    }

    fn mean_leaves(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.num_leaves()).sum::<usize>() as f64 / self.trees.len() as f64
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn num_classes(&self) -> usize {
        self.schema.num_classes()
    }

    fn distribution(&self, x: &[Option<f64>]) -> Vec<f64> {
        let num_classes = self.num_classes();
        let mut mean = vec![0.0; num_classes];
        for tree in &self.trees {
            for (m, p) in mean.iter_mut().zip(tree.distribution(x, num_classes)) {
                *m += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        mean.iter_mut().for_each(|m| *m /= n);
        debug_assert!((mean.iter().sum::<f64>() - 1.0).abs() < 1e-6 || self.trees.is_empty());
        mean
    }
}
