//! Hazard classifier: bagged decision trees behind a cost-sensitive decision

mod cost;
mod forest;

pub use cost::{train, CostMatrix, CostSensitiveClassifier, HazardModel};
pub use forest::{DecisionTree, ForestParams, RandomForest, DEFAULT_NUM_TREES};

/// A classifier that answers with a probability per class value
pub trait ProbabilisticClassifier: Send + Sync {
    fn num_classes(&self) -> usize;

    /// Class distribution for a feature vector in schema order; sums to 1
    fn distribution(&self, x: &[Option<f64>]) -> Vec<f64>;
}
