//! Model evaluation
//!
//! Scores a trained model on a held-out set. Decisions for the confusion
//! matrix come from the cost-sensitive wrapper; ROC-AUC for the hazardous
//! class is computed from the base ensemble's probabilities since it does not
//! depend on any decision rule.

use crate::classifier::HazardModel;
use crate::dataset::{Dataset, TRUE_LABEL};
use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Counts indexed `[actual][predicted]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            counts: vec![vec![0; n]; n],
        }
    }

    pub fn record(&mut self, actual: usize, predicted: usize) {
        self.counts[actual][predicted] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.counts.len()).map(|i| self.counts[i][i]).sum()
    }

    fn actual_total(&self, class: usize) -> u64 {
        self.counts[class].iter().sum()
    }

    fn predicted_total(&self, class: usize) -> u64 {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Per-class precision, recall and F1; undefined ratios are reported as 0
    pub fn class_metrics(&self, class: usize) -> ClassMetrics {
        let tp = self.counts[class][class];
        let predicted = self.predicted_total(class);
        let actual = self.actual_total(class);
        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, predicted);
        let recall = ratio(tp, actual);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            class: self.labels[class].clone(),
            true_positives: tp,
            false_positives: predicted - tp,
            false_negatives: actual - tp,
            precision,
            recall,
            f1,
        }
    }

    /// Cohen's kappa
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let observed = self.correct() as f64 / n;
        let chance: f64 = (0..self.counts.len())
            .map(|c| self.actual_total(c) as f64 * self.predicted_total(c) as f64)
            .sum::<f64>()
            / (n * n);
        if (1.0 - chance).abs() < f64::EPSILON {
            return if observed >= 1.0 { 1.0 } else { 0.0 };
        }
        (observed - chance) / (1.0 - chance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Evaluation report for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub instances: u64,
    pub correct: u64,
    pub accuracy: f64,
    pub kappa: f64,
    pub total_cost: f64,
    pub average_cost: f64,
    /// Class frequencies in the training set, in class-value order
    pub priors: Vec<f64>,
    /// Accuracy of always predicting the training majority class
    pub baseline_accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub per_class: Vec<ClassMetrics>,
    /// ROC-AUC of the `"true"` class; absent when it is not a class value or
    /// the test set lacks one of the two outcomes
    pub auc: Option<f64>,
}

impl Report {
    /// Metrics of the class labeled `"true"`, looked up by value
    pub fn hazardous(&self) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.class == TRUE_LABEL)
    }
}

/// Evaluate `model` on `test`, taking class priors from `train`.
pub fn evaluate(model: &HazardModel, train: &Dataset, test: &Dataset) -> Result<Report> {
    if train.schema() != test.schema() {
        return Err(HazardError::Schema(
            "train and test sets are bound to different schemas".to_string(),
        ));
    }
    let schema = test.schema();
    if model.base().schema() != schema {
        return Err(HazardError::Schema(
            "model was trained on a different schema than the evaluation sets".to_string(),
        ));
    }

    let labels = schema.class().values.clone();
    let true_index = schema.class().index_of(TRUE_LABEL);
    if true_index.is_none() {
        warn!(values = ?labels, "No \"true\" class value; AUC omitted");
    }

    let mut confusion = ConfusionMatrix::new(labels.clone());
    let mut total_cost = 0.0;
    let mut scored: Vec<(f64, bool)> = Vec::with_capacity(test.len());
    for instance in test.instances() {
        let distribution = model.distribution(&instance.values);
        let predicted = model.decide(&distribution);
        confusion.record(instance.class, predicted);
        total_cost += model.cost_matrix().cost(instance.class, predicted);
        if let Some(t) = true_index {
            scored.push((distribution[t], instance.class == t));
        }
    }

    let train_counts = train.class_counts();
    let train_total: usize = train_counts.iter().sum();
    let priors: Vec<f64> = train_counts
        .iter()
        .map(|&c| {
            if train_total == 0 {
                0.0
            } else {
                c as f64 / train_total as f64
            }
        })
        .collect();
    let majority = train_counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(class, _)| class)
        .unwrap_or(0);

    let instances = confusion.total();
    let n = instances as f64;
    let share = |count: u64| if instances == 0 { 0.0 } else { count as f64 / n };
    let baseline = test.instances().iter().filter(|i| i.class == majority).count() as u64;

    let report = Report {
        instances,
        correct: confusion.correct(),
        accuracy: share(confusion.correct()),
        kappa: confusion.kappa(),
        total_cost,
        average_cost: if instances == 0 { 0.0 } else { total_cost / n },
        priors,
        baseline_accuracy: share(baseline),
        per_class: (0..labels.len()).map(|c| confusion.class_metrics(c)).collect(),
        confusion,
        auc: true_index.and_then(|_| auc(&scored)),
    };
    debug!(
        instances = report.instances,
        accuracy = report.accuracy,
        auc = ?report.auc,
        "Evaluation complete"
    );
    Ok(report)
}

/// Area under the ROC curve from `(score, is_positive)` pairs.
///
/// Mann-Whitney form with tied scores sharing their average rank; `None`
/// without at least one positive and one negative.
pub fn auc(scored: &[(f64, bool)]) -> Option<f64> {
    let positives = scored.iter().filter(|(_, p)| *p).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut sorted: Vec<(f64, bool)> = scored.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1].0 == sorted[i].0 {
            j += 1;
        }
        // Ranks are 1-based; a tie group shares the mean of its ranks
        let rank = (i + j) as f64 / 2.0 + 1.0;
        positive_rank_sum += rank * sorted[i..=j].iter().filter(|(_, p)| *p).count() as f64;
        i = j + 1;
    }

    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let incorrect = self.instances - self.correct;
        let error_rate = if self.instances == 0 {
            0.0
        } else {
            incorrect as f64 / self.instances as f64
        };
        writeln!(f, "=== Summary ===")?;
        writeln!(
            f,
            "Correctly classified      {:>6}  {:>7.3} %",
            self.correct,
            self.accuracy * 100.0
        )?;
        writeln!(
            f,
            "Incorrectly classified    {:>6}  {:>7.3} %",
            incorrect,
            error_rate * 100.0
        )?;
        writeln!(f, "Kappa                     {:>14.4}", self.kappa)?;
        writeln!(f, "Total cost                {:>14.4}", self.total_cost)?;
        writeln!(f, "Average cost              {:>14.4}", self.average_cost)?;
        writeln!(
            f,
            "Baseline accuracy         {:>12.3} %",
            self.baseline_accuracy * 100.0
        )?;
        writeln!(f, "Total instances           {:>6}", self.instances)?;
        writeln!(f)?;

        writeln!(f, "=== Detailed Accuracy By Class ===")?;
        writeln!(
            f,
            "{:>10} {:>10} {:>10} {:>10}  Class",
            "Precision", "Recall", "F1", "Prior"
        )?;
        for (metrics, prior) in self.per_class.iter().zip(&self.priors) {
            writeln!(
                f,
                "{:>10.3} {:>10.3} {:>10.3} {:>10.3}  {}",
                metrics.precision, metrics.recall, metrics.f1, prior, metrics.class
            )?;
        }
        writeln!(f)?;

        writeln!(f, "=== Confusion Matrix ===")?;
        for label in &self.confusion.labels {
            write!(f, "{:>8}", label)?;
        }
        writeln!(f, "   <-- classified as")?;
        for (row, label) in self.confusion.counts.iter().zip(&self.confusion.labels) {
            for count in row {
                write!(f, "{:>8}", count)?;
            }
            writeln!(f, "   | {}", label)?;
        }
        writeln!(f)?;

        match self.auc {
            Some(auc) => write!(f, "ROC-AUC (class \"{}\"): {:.4}", TRUE_LABEL, auc),
            None => write!(f, "ROC-AUC (class \"{}\"): n/a", TRUE_LABEL),
        }
    }
}
