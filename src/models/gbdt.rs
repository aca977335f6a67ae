//! Gradient-boosted decision stumps with logistic loss.
//!
//! Each round fits one depth-1 tree on the Newton step of the log loss:
//! gradient `p - y`, hessian `p (1 - p)`. Splits are scored with
//!
//! ```text
//! gain = 0.5 * [G_L²/(H_L + λ) + G_R²/(H_R + λ) - G²/(H + λ)]
//! ```
//!
//! and leaves take `-G/(H + λ)` scaled by the learning rate. Candidate cuts
//! are midpoints between distinct values, thinned to at most `max_cuts`
//! quantiles per feature. Training is deterministic.

use super::adapter::{check_dimensions, Classifier, ModelAdapter};
use crate::error::ModelError;
use crate::types::FeatureMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

const HESS_MIN: f64 = 1e-6;

/// Boosting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoosterParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// L2 regularization on leaf weights
    #[serde(default = "default_reg_lambda")]
    pub reg_lambda: f64,
    /// Minimum hessian sum on each side of a split
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
    #[serde(default = "default_max_cuts")]
    pub max_cuts: usize,
}

fn default_n_estimators() -> usize {
    200
}

fn default_learning_rate() -> f64 {
    0.2
}

fn default_reg_lambda() -> f64 {
    1.0
}

fn default_min_child_weight() -> f64 {
    1.0
}

fn default_max_cuts() -> usize {
    32
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            reg_lambda: default_reg_lambda(),
            min_child_weight: default_min_child_weight(),
            max_cuts: default_max_cuts(),
        }
    }
}

/// One split: rows with `x[feature] < threshold` go left. NaN goes right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    #[inline]
    fn predict(&self, row: &[f64]) -> f64 {
        if row[self.feature] < self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Trained stump ensemble. Output is `sigmoid(base_score + Σ leaves)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedStumps {
    pub base_score: f64,
    pub n_features: usize,
    pub stumps: Vec<Stump>,
}

impl BoostedStumps {
    fn raw(&self, row: &[f64]) -> f64 {
        self.base_score + self.stumps.iter().map(|s| s.predict(row)).sum::<f64>()
    }
}

impl Classifier for BoostedStumps {
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        check_dimensions(self.n_features, x)?;
        Ok(x.rows.iter().map(|row| sigmoid(self.raw(row))).collect())
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Trainer for [`BoostedStumps`].
#[derive(Debug, Clone, Default)]
pub struct StumpBooster {
    pub params: BoosterParams,
}

impl StumpBooster {
    pub fn new(params: BoosterParams) -> Self {
        Self { params }
    }

    fn gain(&self, gl: f64, hl: f64, g: f64, h: f64) -> f64 {
        let lambda = self.params.reg_lambda;
        let (gr, hr) = (g - gl, h - hl);
        0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - g * g / (h + lambda))
    }

    fn leaf(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }
}

/// Per-feature sort order and candidate cut values.
struct FeatureCuts {
    order: Vec<usize>,
    cuts: Vec<f64>,
}

fn feature_cuts(x: &FeatureMatrix, feature: usize, max_cuts: usize) -> FeatureCuts {
    let mut order: Vec<usize> = (0..x.n_rows()).collect();
    order.sort_by(|&a, &b| x.rows[a][feature].total_cmp(&x.rows[b][feature]));

    let mut distinct: Vec<f64> = order.iter().map(|&i| x.rows[i][feature]).filter(|v| !v.is_nan()).collect();
    distinct.dedup();

    let midpoints: Vec<f64> = distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let cuts = if midpoints.len() <= max_cuts {
        midpoints
    } else {
        let mut picked: Vec<f64> = (1..=max_cuts)
            .map(|k| midpoints[k * midpoints.len() / (max_cuts + 1)])
            .collect();
        picked.dedup();
        picked
    };

    FeatureCuts { order, cuts }
}

impl ModelAdapter for StumpBooster {
    type Model = BoostedStumps;

    fn name(&self) -> &'static str {
        "boosted_stumps"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[u8]) -> Result<BoostedStumps, ModelError> {
        let n = x.n_rows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(ModelError::LabelMismatch { rows: n, labels: y.len() });
        }
        check_dimensions(x.n_cols(), x)?;

        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == n {
            return Err(ModelError::SingleClass);
        }

        let rate = positives as f64 / n as f64;
        let base_score = (rate / (1.0 - rate)).ln();
        let targets: Vec<f64> = y.iter().map(|&v| if v == 1 { 1.0 } else { 0.0 }).collect();

        let features: Vec<FeatureCuts> = (0..x.n_cols())
            .map(|f| feature_cuts(x, f, self.params.max_cuts.max(1)))
            .collect();

        let mut raw = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut stumps = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            for i in 0..n {
                let p = sigmoid(raw[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(HESS_MIN);
            }
            let g: f64 = grad.iter().sum();
            let h: f64 = hess.iter().sum();

            // (gain, feature, threshold, G_L, H_L)
            let mut best: Option<(f64, usize, f64, f64, f64)> = None;
            for (f, fc) in features.iter().enumerate() {
                let (mut gl, mut hl, mut pos) = (0.0, 0.0, 0);
                for &cut in &fc.cuts {
                    while pos < n && x.rows[fc.order[pos]][f] < cut {
                        gl += grad[fc.order[pos]];
                        hl += hess[fc.order[pos]];
                        pos += 1;
                    }
                    if hl < self.params.min_child_weight || h - hl < self.params.min_child_weight {
                        continue;
                    }
                    let gain = self.gain(gl, hl, g, h);
                    if gain > best.map_or(0.0, |b| b.0) {
                        best = Some((gain, f, cut, gl, hl));
                    }
                }
            }

            let Some((gain, feature, threshold, gl, hl)) = best else {
                debug!(round, "No split with positive gain, stopping early");
                break;
            };

            let stump = Stump {
                feature,
                threshold,
                left: self.leaf(gl, hl),
                right: self.leaf(g - gl, h - hl),
            };
            for (i, row) in x.rows.iter().enumerate() {
                raw[i] += stump.predict(row);
            }
            stumps.push(stump);

            if round % 50 == 0 {
                debug!(round, gain, feature, threshold, "Boosting round");
            }
        }

        debug!(stumps = stumps.len(), base_score, "Boosted stumps trained");

        Ok(BoostedStumps {
            base_score,
            n_features: x.n_cols(),
            stumps,
        })
    }
}
