//! Stratified train/test splitting

use super::schema::Dataset;
use crate::error::{HazardError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Train/test partition of a corpus, with the source row indices of each side
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Partition `corpus` per class, preserving class proportions.
///
/// Rows are grouped by class value (schema order, encounter order within a
/// group). One generator seeded with `seed` shuffles each group in turn; the
/// first `round(group_len * train_ratio)` rows of a group go to train.
/// Identical inputs always yield identical membership.
pub fn stratified_split(corpus: &Dataset, train_ratio: f64, seed: u64) -> Result<Split> {
    corpus.schema().binary_class()?;
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(HazardError::Training(format!(
            "train ratio {} outside [0, 1]",
            train_ratio
        )));
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); corpus.schema().num_classes()];
    for (i, instance) in corpus.instances().iter().enumerate() {
        groups[instance.class].push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::new();
    let mut test_indices = Vec::new();

    for (class, group) in groups.iter_mut().enumerate() {
        group.shuffle(&mut rng);
        let n_train = (group.len() as f64 * train_ratio).round() as usize;
        train_indices.extend_from_slice(&group[..n_train]);
        test_indices.extend_from_slice(&group[n_train..]);
        debug!(
            class = %corpus.schema().class().values[class],
            total = group.len(),
            train = n_train,
            "Stratified class group"
        );
    }

    Ok(Split {
        train: corpus.subset(&train_indices),
        test: corpus.subset(&test_indices),
        train_indices,
        test_indices,
    })
}
