//! Cost-sensitive reclassification
//!
//! Wraps a probabilistic classifier so that its decision for a row is the
//! class with the lowest expected misclassification cost under the base
//! distribution, `argmin_p sum_a P(a) * cost(a, p)`, rather than the most
//! probable class.

use super::forest::{ForestParams, RandomForest};
use super::ProbabilisticClassifier;
use crate::dataset::{BinaryClass, Dataset};
use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Square cost table indexed `[actual][predicted]` by class value index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMatrix {
    costs: Vec<Vec<f64>>,
    /// Class that wins an exact tie in expected cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tie_break: Option<usize>,
}

fn check_cost(cost: f64) -> Result<()> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(HazardError::Training(format!(
            "costs must be finite and non-negative (got {})",
            cost
        )));
    }
    Ok(())
}

impl CostMatrix {
    /// General square table; ties go to the lowest index
    pub fn new(costs: Vec<Vec<f64>>) -> Result<Self> {
        let size = costs.len();
        if size == 0 {
            return Err(HazardError::Training("cost matrix is empty".to_string()));
        }
        for row in &costs {
            if row.len() != size {
                return Err(HazardError::Training(format!(
                    "cost matrix row has {} entries, expected {}",
                    row.len(),
                    size
                )));
            }
            row.iter().try_for_each(|&c| check_cost(c))?;
        }
        Ok(Self {
            costs,
            tie_break: None,
        })
    }

    /// Binary table with zero cost on the diagonal.
    ///
    /// A false negative is "actual true, predicted false"; positions come from
    /// `class`, never from a fixed layout. An exact tie in expected cost is
    /// decided as hazardous, whichever index `"true"` sits at.
    pub fn binary(class: BinaryClass, cost_fn: f64, cost_fp: f64) -> Result<Self> {
        check_cost(cost_fn)?;
        check_cost(cost_fp)?;
        if cost_fn < cost_fp {
            warn!(
                cost_fn,
                cost_fp, "False-negative cost is below false-positive cost"
            );
        }
        let mut costs = vec![vec![0.0; 2]; 2];
        costs[class.true_index][class.false_index] = cost_fn;
        costs[class.false_index][class.true_index] = cost_fp;
        Ok(Self {
            costs,
            tie_break: Some(class.true_index),
        })
    }

    pub fn size(&self) -> usize {
        self.costs.len()
    }

    pub fn cost(&self, actual: usize, predicted: usize) -> f64 {
        self.costs[actual][predicted]
    }

    /// Expected cost of predicting each class under `distribution`
    pub fn expected_costs(&self, distribution: &[f64]) -> Vec<f64> {
        (0..self.size())
            .map(|predicted| {
                distribution
                    .iter()
                    .enumerate()
                    .map(|(actual, p)| p * self.cost(actual, predicted))
                    .sum()
            })
            .collect()
    }

    /// Class with the lowest expected cost.
    ///
    /// An exact tie goes to the tie-break class when it is among the tied
    /// classes, otherwise to the lowest tied index.
    pub fn min_cost_class(&self, distribution: &[f64]) -> usize {
        let expected = self.expected_costs(distribution);
        let (best, best_cost) = expected.iter().enumerate().fold(
            (0, f64::INFINITY),
            |(best, best_cost), (class, &cost)| {
                if cost < best_cost {
                    (class, cost)
                } else {
                    (best, best_cost)
                }
            },
        );
        match self.tie_break {
            Some(preferred) if expected.get(preferred) == Some(&best_cost) => preferred,
            _ => best,
        }
    }
}

/// A base classifier plus the cost matrix that decides its output.
///
/// Decisions follow [`CostMatrix::min_cost_class`]; for binary matrices an
/// exact tie is decided as the `"true"` class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSensitiveClassifier<C> {
    base: C,
    costs: CostMatrix,
}

impl<C: ProbabilisticClassifier> CostSensitiveClassifier<C> {
    pub fn new(base: C, costs: CostMatrix) -> Result<Self> {
        if costs.size() != base.num_classes() {
            return Err(HazardError::Training(format!(
                "cost matrix is {}x{} but classifier has {} classes",
                costs.size(),
                costs.size(),
                base.num_classes()
            )));
        }
        Ok(Self { base, costs })
    }

    pub fn base(&self) -> &C {
        &self.base
    }

    pub fn cost_matrix(&self) -> &CostMatrix {
        &self.costs
    }

    /// Base probability distribution, untouched by costs
    pub fn distribution(&self, x: &[Option<f64>]) -> Vec<f64> {
        self.base.distribution(x)
    }

    /// Minimum-expected-cost class for a row
    pub fn predict(&self, x: &[Option<f64>]) -> usize {
        self.decide(&self.distribution(x))
    }

    /// Minimum-expected-cost class for an already computed distribution
    pub fn decide(&self, distribution: &[f64]) -> usize {
        self.costs.min_cost_class(distribution)
    }
}

/// The production model: a random forest decided by a binary cost matrix
pub type HazardModel = CostSensitiveClassifier<RandomForest>;

/// Train the base forest on `train_set` and wrap it with the cost matrix.
///
/// The class attribute must be the binary true/false pair; `cost_fn` is
/// charged for predicting false on a hazardous row, `cost_fp` for the reverse.
pub fn train(
    train_set: &Dataset,
    cost_fn: f64,
    cost_fp: f64,
    params: &ForestParams,
) -> Result<HazardModel> {
    if train_set.is_empty() {
        return Err(HazardError::Training("training set is empty".to_string()));
    }
    let class = train_set.schema().binary_class()?;
    let costs = CostMatrix::binary(class, cost_fn, cost_fp)?;
    let forest = RandomForest::train(train_set, params)?;
    let model = CostSensitiveClassifier::new(forest, costs)?;
    info!(
        rows = train_set.len(),
        cost_fn, cost_fp, "Cost-sensitive model trained"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed distribution regardless of input
    struct Fixed(Vec<f64>);

    impl ProbabilisticClassifier for Fixed {
        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn distribution(&self, _x: &[Option<f64>]) -> Vec<f64> {
            self.0.clone()
        }
    }

    const FALSE_FIRST: BinaryClass = BinaryClass {
        true_index: 1,
        false_index: 0,
    };

    #[test]
    fn test_expected_cost_scenario() {
        // P(false)=0.6, P(true)=0.4, FN=15, FP=3
        let costs = CostMatrix::binary(FALSE_FIRST, 15.0, 3.0).unwrap();
        let expected = costs.expected_costs(&[0.6, 0.4]);
        assert!((expected[0] - 6.0).abs() < 1e-12);
        assert!((expected[1] - 1.8).abs() < 1e-12);

        let model = CostSensitiveClassifier::new(Fixed(vec![0.6, 0.4]), costs).unwrap();
        assert_eq!(model.predict(&[]), 1);
    }

    #[test]
    fn test_positions_follow_class_lookup() {
        let true_first = BinaryClass {
            true_index: 0,
            false_index: 1,
        };
        let costs = CostMatrix::binary(true_first, 15.0, 3.0).unwrap();
        assert_eq!(costs.cost(0, 1), 15.0);
        assert_eq!(costs.cost(1, 0), 3.0);
        assert_eq!(costs.cost(0, 0), 0.0);

        let model = CostSensitiveClassifier::new(Fixed(vec![0.4, 0.6]), costs).unwrap();
        assert_eq!(model.predict(&[]), 0);
    }

    #[test]
    fn test_differs_from_argmax() {
        let costs = CostMatrix::binary(FALSE_FIRST, 15.0, 3.0).unwrap();
        // predict false: 0.1*15 = 1.5, predict true: 0.9*3 = 2.7
        assert_eq!(costs.min_cost_class(&[0.9, 0.1]), 0);
        // predict false: 0.2*15 = 3.0, predict true: 0.8*3 = 2.4
        assert_eq!(costs.min_cost_class(&[0.8, 0.2]), 1);
    }

    #[test]
    fn test_tie_goes_to_true_class() {
        let costs = CostMatrix::binary(FALSE_FIRST, 1.0, 1.0).unwrap();
        assert_eq!(costs.min_cost_class(&[0.5, 0.5]), 1);

        let true_first = BinaryClass {
            true_index: 0,
            false_index: 1,
        };
        let costs = CostMatrix::binary(true_first, 1.0, 1.0).unwrap();
        assert_eq!(costs.min_cost_class(&[0.5, 0.5]), 0);

        // Without a tie the plain minimum still wins
        let costs = CostMatrix::binary(FALSE_FIRST, 3.0, 3.0).unwrap();
        assert_eq!(costs.min_cost_class(&[0.25, 0.75]), 1);
        assert_eq!(costs.min_cost_class(&[0.75, 0.25]), 0);
    }

    #[test]
    fn test_general_matrix_tie_goes_to_lower_index() {
        let costs = CostMatrix::new(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert_eq!(costs.min_cost_class(&[0.5, 0.5]), 0);
        assert!(CostMatrix::new(vec![vec![0.0, 1.0]]).is_err());
        assert!(CostMatrix::new(Vec::new()).is_err());
    }

    #[test]
    fn test_tie_break_survives_serialization() {
        let costs = CostMatrix::binary(FALSE_FIRST, 2.0, 2.0).unwrap();
        let json = serde_json::to_string(&costs).unwrap();
        let restored: CostMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, costs);
        assert_eq!(restored.min_cost_class(&[0.5, 0.5]), 1);
    }

    #[test]
    fn test_rejects_negative_costs() {
        assert!(CostMatrix::binary(FALSE_FIRST, -1.0, 3.0).is_err());
        assert!(CostMatrix::binary(FALSE_FIRST, f64::NAN, 3.0).is_err());
        assert!(CostMatrix::new(vec![vec![0.0, -1.0], vec![1.0, 0.0]]).is_err());
    }

    fn labeled(rows: &[(f64, usize)]) -> Dataset {
        let schema = crate::dataset::Schema::new(
            vec![crate::dataset::Attribute::numeric("x")],
            crate::dataset::ClassAttribute {
                name: "is_potentially_hazardous".into(),
                values: vec!["false".into(), "true".into()],
            },
        )
        .unwrap();
        let instances = rows
            .iter()
            .map(|&(x, class)| crate::dataset::Instance {
                values: vec![Some(x)],
                class,
            })
            .collect();
        Dataset::new(schema, instances)
    }

    /// Overlapping classes: true dominates above 60, noise in between
    fn overlapping() -> (Dataset, Dataset) {
        let rows: Vec<(f64, usize)> = (0..120)
            .map(|i| {
                let x = (i % 100) as f64;
                let hazardous = x > 60.0 || (x > 40.0 && i % 3 == 0);
                (x, usize::from(hazardous))
            })
            .collect();
        let test: Vec<(f64, usize)> = (0..100)
            .map(|i| {
                let x = i as f64 + 0.5;
                (x, usize::from(x > 50.0))
            })
            .collect();
        (labeled(&rows), labeled(&test))
    }

    fn recall(model: &HazardModel, test: &Dataset) -> f64 {
        let positives: Vec<_> = test.instances().iter().filter(|i| i.class == 1).collect();
        let hits = positives
            .iter()
            .filter(|i| model.predict(&i.values) == 1)
            .count();
        hits as f64 / positives.len() as f64
    }

    #[test]
    fn test_recall_is_monotone_in_false_negative_cost() {
        let (train_set, test) = overlapping();
        let params = ForestParams {
            num_trees: 20,
            ..Default::default()
        };
        // Same seed, so every model shares the same forest
        let mut previous = 0.0;
        for cost_fn in [0.5, 1.0, 3.0, 15.0, 100.0] {
            let model = train(&train_set, cost_fn, 3.0, &params).unwrap();
            let r = recall(&model, &test);
            assert!(r >= previous, "recall fell to {} at cost_fn {}", r, cost_fn);
            previous = r;
        }
    }

    #[test]
    fn test_train_rejects_degenerate_sets() {
        let params = ForestParams::default();
        let empty = labeled(&[]);
        assert!(matches!(
            train(&empty, 15.0, 3.0, &params),
            Err(HazardError::Training(_))
        ));
        let one_class = labeled(&[(1.0, 0), (2.0, 0)]);
        assert!(matches!(
            train(&one_class, 15.0, 3.0, &params),
            Err(HazardError::Training(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_sizes() {
        let costs = CostMatrix::binary(FALSE_FIRST, 15.0, 3.0).unwrap();
        assert!(CostSensitiveClassifier::new(Fixed(vec![0.2, 0.3, 0.5]), costs).is_err());
    }
}
