//! Validation metrics at the calibrated threshold

use crate::calibration::ConfusionMatrix;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Classification report for one validation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Absent when validation holds a single class
    pub roc_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn evaluate(labels: &[u8], probabilities: &[f64], threshold: f64) -> Result<Self, CalibrationError> {
        if labels.len() != probabilities.len() {
            return Err(CalibrationError::LengthMismatch {
                labels: labels.len(),
                probabilities: probabilities.len(),
            });
        }
        if labels.is_empty() {
            return Err(CalibrationError::Empty);
        }

        let confusion = ConfusionMatrix::at(labels, probabilities, threshold);
        Ok(Self {
            threshold,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            roc_auc: roc_auc(labels, probabilities),
            confusion,
        })
    }

    pub fn log(&self) {
        info!(
            threshold = self.threshold,
            accuracy = self.accuracy,
            precision = self.precision,
            recall = self.recall,
            f1 = self.f1,
            roc_auc = ?self.roc_auc,
            "Validation report"
        );
        info!(
            tp = self.confusion.true_positive,
            fp = self.confusion.false_positive,
            tn = self.confusion.true_negative,
            fn_ = self.confusion.false_negative,
            "Confusion matrix"
        );
    }
}

/// Area under the ROC curve via the rank-sum statistic, with tied scores
/// sharing their average rank.
pub fn roc_auc(labels: &[u8], probabilities: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut ranks = vec![0.0; order.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probabilities[order[j + 1]] == probabilities[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y == 1)
        .map(|(_, r)| r)
        .sum();
    let (p, n) = (n_pos as f64, n_neg as f64);
    Some((pos_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_ranking() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
    }

    #[test]
    fn test_ties_count_half() {
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        let auc = roc_auc(&[0, 1, 0, 1], &[0.1, 0.4, 0.5, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_has_no_auc() {
        assert_eq!(roc_auc(&[0, 0], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_report() {
        let report = EvaluationReport::evaluate(&[0, 0, 1, 1], &[0.1, 0.6, 0.7, 0.9], 0.5).unwrap();
        assert_eq!(report.confusion.false_positive, 1);
        assert_eq!(report.recall, 1.0);
        assert!((report.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.accuracy, 0.75);
    }
}
