use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
/// None when only one class is present.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 || labels.len() != scores.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }

        // Ranks are 1-based; tied block shares the average rank
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        let tied_positives = order[start..=end].iter().filter(|&&i| labels[i]).count();
        positive_rank_sum += average_rank * tied_positives as f64;

        start = end + 1;
    }

    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

fn descending_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    order
}

/// Average precision: sum over distinct thresholds of (ΔRecall × Precision).
/// None when there are no positives.
pub fn average_precision(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y).count();
    if positives == 0 || labels.len() != scores.len() {
        return None;
    }

    let order = descending_order(scores);
    let mut true_positives = 0usize;
    let mut seen = 0usize;
    let mut previous_recall = 0.0;
    let mut ap = 0.0;

    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }

        for &i in &order[start..=end] {
            seen += 1;
            if labels[i] {
                true_positives += 1;
            }
        }

        let precision = true_positives as f64 / seen as f64;
        let recall = true_positives as f64 / positives as f64;
        ap += (recall - previous_recall) * precision;
        previous_recall = recall;

        start = end + 1;
    }

    Some(ap)
}

/// Precision and recall of `score > threshold` predictions.
/// Undefined ratios (no predicted or no actual positives) are reported as 0.
pub fn precision_recall(labels: &[bool], scores: &[f64], threshold: f64) -> (f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;

    for (&label, &score) in labels.iter().zip(scores) {
        match (score > threshold, label) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    (precision, recall)
}

/// Fraction of true positives among the `k` highest-scored samples.
/// None when `k` is zero or exceeds the number of samples.
pub fn precision_at_k(labels: &[bool], scores: &[f64], k: usize) -> Option<f64> {
    if k == 0 || k > scores.len() || labels.len() != scores.len() {
        return None;
    }

    let hits = descending_order(scores)
        .into_iter()
        .take(k)
        .filter(|&i| labels[i])
        .count();

    Some(hits as f64 / k as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionAtK {
    pub k: usize,
    pub precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub gain: f64,
}

/// Held-out evaluation of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub test_samples: usize,
    pub positive_rate: f64,
    pub precision: f64,
    pub recall: f64,
    pub roc_auc: Option<f64>,
    pub average_precision: Option<f64>,
    pub precision_at_k: Vec<PrecisionAtK>,
    /// Sorted by gain, highest first
    pub feature_importance: Vec<FeatureImportance>,
}

impl EvaluationReport {
    pub fn log(&self) {
        tracing::info!(
            "Evaluation on {} test samples (positive rate {:.2}%)",
            self.test_samples,
            self.positive_rate * 100.0
        );
        tracing::info!("Precision: {:.4}", self.precision);
        tracing::info!("Recall: {:.4}", self.recall);
        match self.roc_auc {
            Some(auc) => tracing::info!("ROC-AUC: {:.4}", auc),
            None => tracing::warn!("ROC-AUC undefined: test split has a single class"),
        }
        if let Some(ap) = self.average_precision {
            tracing::info!("Average precision: {:.4}", ap);
        }
        for entry in &self.precision_at_k {
            tracing::info!("Precision@{}: {:.4}", entry.k, entry.precision);
        }
        for entry in &self.feature_importance {
            tracing::info!("Feature importance {:<25} {:>10.2}", entry.feature, entry.gain);
        }
    }
}
