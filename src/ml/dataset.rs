use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::features::{FeatureVector, FEATURE_COUNT};

/// Labeled feature rows in `FEATURE_NAMES` order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<[f64; FEATURE_COUNT]>,
    labels: Vec<bool>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, features: &FeatureVector, success: bool) {
        self.push_row(features.to_array(), success);
    }

    pub fn push_row(&mut self, row: [f64; FEATURE_COUNT], success: bool) {
        self.rows.push(row);
        self.labels.push(success);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.rows
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y).count()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.positives() as f64 / self.len() as f64
        }
    }

    pub fn has_both_classes(&self) -> bool {
        let positives = self.positives();
        positives > 0 && positives < self.len()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        let mut subset = Self::with_capacity(indices.len());
        for &i in indices {
            subset.push_row(self.rows[i], self.labels[i]);
        }
        subset
    }

    /// Split into (kept, held_out), holding out `ratio` of each class
    pub fn stratified_split<R: Rng>(&self, ratio: f64, rng: &mut R) -> (Dataset, Dataset) {
        let ratio = ratio.clamp(0.0, 1.0);
        let mut kept = Vec::with_capacity(self.len());
        let mut held_out = Vec::new();

        for class in [false, true] {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            members.shuffle(rng);

            let take = (members.len() as f64 * ratio).round() as usize;
            held_out.extend_from_slice(&members[..take]);
            kept.extend_from_slice(&members[take..]);
        }

        kept.shuffle(rng);
        held_out.shuffle(rng);

        (self.subset(&kept), self.subset(&held_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn dataset(positives: usize, negatives: usize) -> Dataset {
        let mut data = Dataset::new();
        for i in 0..positives {
            data.push_row([i as f64; FEATURE_COUNT], true);
        }
        for i in 0..negatives {
            data.push_row([-(i as f64); FEATURE_COUNT], false);
        }
        data
    }

    #[test]
    fn test_stratified_split_preserves_balance() {
        let data = dataset(300, 700);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let (train, test) = data.stratified_split(0.2, &mut rng);

        assert_eq!(train.len(), 800);
        assert_eq!(test.len(), 200);
        assert_eq!(test.positives(), 60);
        assert_eq!(train.positives(), 240);
    }

    #[test]
    fn test_split_is_reproducible() {
        let data = dataset(50, 50);
        let first = data.stratified_split(0.2, &mut ChaCha8Rng::seed_from_u64(9));
        let second = data.stratified_split(0.2, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(first, second);
    }

    #[test]
    fn test_class_checks() {
        assert!(dataset(3, 2).has_both_classes());
        assert!(!dataset(3, 0).has_both_classes());
        assert!(!Dataset::new().has_both_classes());
        assert_eq!(dataset(1, 3).positive_rate(), 0.25);
    }
}
