//! Decision threshold selection from validation data.

use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Classification metric maximized by the calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    F1,
    Precision,
    Recall,
}

/// Binary confusion counts at a fixed threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionMatrix {
    /// Count outcomes, predicting fraud when `probability >= threshold`.
    pub fn at(labels: &[u8], probabilities: &[f64], threshold: f64) -> Self {
        let mut m = Self::default();
        for (&y, &p) in labels.iter().zip(probabilities) {
            match (y == 1, p >= threshold) {
                (true, true) => m.true_positive += 1,
                (false, true) => m.false_positive += 1,
                (false, false) => m.true_negative += 1,
                (true, false) => m.false_negative += 1,
            }
        }
        m
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    // Zero denominators score 0, matching the usual zero_division convention.

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positive,
            2 * self.true_positive + self.false_positive + self.false_negative,
        )
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::F1 => self.f1(),
            Metric::Precision => self.precision(),
            Metric::Recall => self.recall(),
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Evenly spaced threshold candidates, endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGrid {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl Default for ThresholdGrid {
    fn default() -> Self {
        Self {
            start: 0.1,
            end: 0.9,
            points: 100,
        }
    }
}

impl ThresholdGrid {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.points == 0 {
            return Err(CalibrationError::InvalidGrid("grid needs at least one point".into()));
        }
        if !(self.start > 0.0 && self.end < 1.0 && self.start <= self.end) {
            return Err(CalibrationError::InvalidGrid(format!(
                "grid [{}, {}] must lie strictly inside (0, 1) in ascending order",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Candidates in ascending order.
    pub fn candidates(&self) -> impl Iterator<Item = f64> + '_ {
        let step = if self.points > 1 {
            (self.end - self.start) / (self.points - 1) as f64
        } else {
            0.0
        };
        (0..self.points).map(move |i| self.start + step * i as f64)
    }
}

/// Probability cut separating fraud from legitimate predictions, in (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct DecisionThreshold(f64);

impl DecisionThreshold {
    pub fn new(value: f64) -> Result<Self, CalibrationError> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(CalibrationError::InvalidThreshold(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for DecisionThreshold {
    type Error = CalibrationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DecisionThreshold> for f64 {
    fn from(t: DecisionThreshold) -> f64 {
        t.0
    }
}

/// Pick the threshold maximizing `metric` over the default grid.
pub fn calibrate(
    labels: &[u8],
    probabilities: &[f64],
    metric: Metric,
) -> Result<DecisionThreshold, CalibrationError> {
    calibrate_with_grid(labels, probabilities, metric, &ThresholdGrid::default())
}

/// Scan `grid` in ascending order; the first candidate reaching the maximum
/// wins, so ties resolve to the lowest threshold.
pub fn calibrate_with_grid(
    labels: &[u8],
    probabilities: &[f64],
    metric: Metric,
    grid: &ThresholdGrid,
) -> Result<DecisionThreshold, CalibrationError> {
    if labels.len() != probabilities.len() {
        return Err(CalibrationError::LengthMismatch {
            labels: labels.len(),
            probabilities: probabilities.len(),
        });
    }
    if labels.is_empty() {
        return Err(CalibrationError::Empty);
    }
    grid.validate()?;

    let mut best_threshold = grid.start;
    let mut best_score = f64::NEG_INFINITY;
    for candidate in grid.candidates() {
        let score = ConfusionMatrix::at(labels, probabilities, candidate).score(metric);
        if score > best_score {
            best_score = score;
            best_threshold = candidate;
        }
    }

    debug!(
        metric = ?metric,
        threshold = best_threshold,
        score = best_score,
        "Threshold calibrated"
    );

    DecisionThreshold::new(best_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separable_scores() {
        let labels = [0, 0, 1, 1];
        let probs = [0.1, 0.4, 0.6, 0.9];

        let t = calibrate(&labels, &probs, Metric::F1).unwrap().value();
        assert!(t > 0.4 && t <= 0.6, "threshold {t}");

        let m = ConfusionMatrix::at(&labels, &probs, t);
        assert_eq!(m.true_positive, 2);
        assert_eq!(m.false_positive, 0);
    }

    #[test]
    fn test_calibration_is_deterministic() {
        let labels = [0, 1, 0, 1, 1, 0, 0, 1];
        let probs = [0.2, 0.7, 0.55, 0.45, 0.8, 0.1, 0.3, 0.65];

        let first = calibrate(&labels, &probs, Metric::F1).unwrap();
        for _ in 0..10 {
            assert_eq!(calibrate(&labels, &probs, Metric::F1).unwrap(), first);
        }
    }

    #[test]
    fn test_ties_break_to_lowest_threshold() {
        // Recall is 1.0 for every candidate up to 0.9.
        let labels = [1, 0];
        let probs = [0.95, 0.05];
        let t = calibrate(&labels, &probs, Metric::Recall).unwrap();
        assert_eq!(t.value(), 0.1);
    }

    #[test]
    fn test_grid_endpoints() {
        let grid = ThresholdGrid::default();
        let candidates: Vec<f64> = grid.candidates().collect();
        assert_eq!(candidates.len(), 100);
        assert_eq!(candidates[0], 0.1);
        assert!((candidates[99] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            calibrate(&[0, 1], &[0.5], Metric::F1),
            Err(CalibrationError::LengthMismatch {
                labels: 2,
                probabilities: 1
            })
        );
        assert_eq!(calibrate(&[], &[], Metric::F1), Err(CalibrationError::Empty));

        let grid = ThresholdGrid {
            start: 0.0,
            end: 0.9,
            points: 10,
        };
        assert!(calibrate_with_grid(&[1], &[0.5], Metric::F1, &grid).is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(DecisionThreshold::new(0.0).is_err());
        assert!(DecisionThreshold::new(1.0).is_err());
        assert!(serde_json::from_str::<DecisionThreshold>("1.5").is_err());
        let t: DecisionThreshold = serde_json::from_str("0.42").unwrap();
        assert_eq!(t.value(), 0.42);
    }

    #[test]
    fn test_zero_division_scores_zero() {
        let m = ConfusionMatrix::at(&[0, 0], &[0.1, 0.2], 0.5);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
        assert_eq!(m.accuracy(), 1.0);
    }
}
