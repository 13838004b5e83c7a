//! Held-out classification metrics.

use serde::{Deserialize, Deserializer, Serialize};

/// Metrics report written alongside each artifact set. An undefined score
/// is NaN in memory and `null` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(deserialize_with = "nan_if_null")]
    pub accuracy: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub roc_auc: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub f1: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub pr_auc: f64,
}

fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl ModelMetrics {
    /// Compute metrics from true classes, hard predictions and class-1
    /// probabilities. All three slices are aligned by row.
    pub fn compute(y_true: &[usize], y_pred: &[usize], y_prob: &[f64]) -> Self {
        Self {
            accuracy: accuracy(y_true, y_pred),
            roc_auc: roc_auc(y_true, y_prob),
            f1: f1(y_true, y_pred),
            pr_auc: average_precision(y_true, y_prob),
        }
    }
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// F1 score of class 1.
pub fn f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1, p == 1) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    if tp == 0 {
        return 0.0;
    }
    2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank. NaN when only one class is present.
pub fn roc_auc(y_true: &[usize], y_score: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_score[order[j + 1]] == y_score[order[i]] {
            j += 1;
        }
        // ranks are 1-based; the tie group i..=j shares their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == 1 {
                rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// Average precision: the step-wise area under the precision/recall curve,
/// evaluated at each distinct score threshold.
pub fn average_precision(y_true: &[usize], y_score: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    if n_pos == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[b].total_cmp(&y_score[a]));

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let score = y_score[order[i]];
        while i < order.len() && y_score[order[i]] == score {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    ap
}
