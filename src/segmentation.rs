//! Risk segmentation: probability → tier → service package → cost estimate.
//!
//! Stateless and total over [0, 1]. Cutoffs are half-open intervals closed on
//! the lower bound, so a probability equal to a cutoff belongs to the higher
//! tier.

use crate::error::DecisionError;
use crate::types::{RiskTier, ScoredRecord, ServicePackage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ascending tier cutoffs `low < medium < high` on [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCutoffs {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskCutoffs {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.6,
            high: 0.9,
        }
    }
}

impl RiskCutoffs {
    pub fn new(low: f64, medium: f64, high: f64) -> Result<Self, DecisionError> {
        let cutoffs = Self { low, medium, high };
        cutoffs.validate()?;
        Ok(cutoffs)
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        let ordered = 0.0 <= self.low && self.low < self.medium && self.medium < self.high && self.high <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(DecisionError::InvalidCutoffs {
                low: self.low,
                medium: self.medium,
                high: self.high,
            })
        }
    }

    /// Tier and package for a fraud probability.
    pub fn segment(&self, probability: f64) -> Result<(RiskTier, ServicePackage), DecisionError> {
        check_probability(probability)?;
        let tier = if probability < self.low {
            RiskTier::Low
        } else if probability < self.medium {
            RiskTier::Medium
        } else if probability < self.high {
            RiskTier::High
        } else {
            RiskTier::Fraud
        };
        Ok((tier, tier.package()))
    }
}

fn check_probability(probability: f64) -> Result<(), DecisionError> {
    if (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        Err(DecisionError::InvalidProbability(probability))
    }
}

/// How a package's unit cost is applied to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// `amount * probability * unit_cost`
    #[default]
    Weighted,
    /// `amount * unit_cost`
    Flat,
}

/// Unit cost per package name.
pub type UnitCostTable = HashMap<String, f64>;

/// Estimated cost of granting `package` for a transaction.
///
/// Packages missing from the table cost 0, and the `none` package always
/// costs 0.
pub fn estimate_cost(
    amount: f64,
    probability: f64,
    package: &str,
    unit_costs: &UnitCostTable,
    mode: CostMode,
) -> Result<f64, DecisionError> {
    check_probability(probability)?;
    if !amount.is_finite() {
        return Err(DecisionError::InvalidAmount(amount));
    }
    if package == ServicePackage::None.as_str() {
        return Ok(0.0);
    }

    let unit = unit_costs.get(package).copied().unwrap_or(0.0);
    Ok(match mode {
        CostMode::Weighted => amount * probability * unit,
        CostMode::Flat => amount * unit,
    })
}

/// Cutoffs, cost table and cost mode bundled for repeated use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationEngine {
    pub cutoffs: RiskCutoffs,
    #[serde(default)]
    pub cost_mode: CostMode,
    #[serde(default)]
    pub unit_costs: UnitCostTable,
}

impl SegmentationEngine {
    pub fn new(cutoffs: RiskCutoffs, unit_costs: UnitCostTable, cost_mode: CostMode) -> Result<Self, DecisionError> {
        cutoffs.validate()?;
        Ok(Self {
            cutoffs,
            cost_mode,
            unit_costs,
        })
    }

    pub fn segment(&self, probability: f64) -> Result<(RiskTier, ServicePackage), DecisionError> {
        self.cutoffs.segment(probability)
    }

    pub fn score(&self, amount: f64, probability: f64) -> Result<ScoredRecord, DecisionError> {
        let (tier, package) = self.segment(probability)?;
        let estimated_cost = estimate_cost(amount, probability, package.as_str(), &self.unit_costs, self.cost_mode)?;
        Ok(ScoredRecord {
            amount,
            probability,
            tier,
            package,
            estimated_cost,
        })
    }
}

/// Wire form of a standalone segmentation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationRequest {
    pub amount: f64,
    pub probability: f64,
    pub cutoffs: RiskCutoffs,
    pub unit_costs: UnitCostTable,
    #[serde(default)]
    pub cost_mode: CostMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResponse {
    pub tier: RiskTier,
    pub package: ServicePackage,
    pub cost: f64,
}

impl SegmentationRequest {
    pub fn evaluate(&self) -> Result<SegmentationResponse, DecisionError> {
        self.cutoffs.validate()?;
        let (tier, package) = self.cutoffs.segment(self.probability)?;
        let cost = estimate_cost(
            self.amount,
            self.probability,
            package.as_str(),
            &self.unit_costs,
            self.cost_mode,
        )?;
        Ok(SegmentationResponse { tier, package, cost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs() -> UnitCostTable {
        [("full", 0.015), ("medium", 0.01), ("basic", 0.003), ("none", 5.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_segment_scenarios() {
        let cutoffs = RiskCutoffs::new(0.3, 0.6, 0.9).unwrap();

        assert_eq!(cutoffs.segment(0.25).unwrap(), (RiskTier::Low, ServicePackage::Full));
        assert_eq!(cutoffs.segment(0.6).unwrap(), (RiskTier::High, ServicePackage::Basic));
        assert_eq!(cutoffs.segment(0.95).unwrap(), (RiskTier::Fraud, ServicePackage::None));
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let cutoffs = RiskCutoffs::default();
        assert_eq!(cutoffs.segment(0.3).unwrap().0, RiskTier::Medium);
        assert_eq!(cutoffs.segment(0.9).unwrap().0, RiskTier::Fraud);
        assert_eq!(cutoffs.segment(0.0).unwrap().0, RiskTier::Low);
        assert_eq!(cutoffs.segment(1.0).unwrap().0, RiskTier::Fraud);
    }

    #[test]
    fn test_segment_is_total() {
        let cutoffs = RiskCutoffs::default();
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let (tier, package) = cutoffs.segment(p).unwrap();
            assert!(RiskTier::ALL.contains(&tier));
            assert_eq!(tier.package(), package);
        }
    }

    #[test]
    fn test_invalid_probability() {
        let cutoffs = RiskCutoffs::default();
        assert_eq!(cutoffs.segment(1.01), Err(DecisionError::InvalidProbability(1.01)));
        assert_eq!(cutoffs.segment(-0.5), Err(DecisionError::InvalidProbability(-0.5)));
        assert!(cutoffs.segment(f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_cutoffs() {
        assert!(RiskCutoffs::new(0.6, 0.3, 0.9).is_err());
        assert!(RiskCutoffs::new(0.3, 0.3, 0.9).is_err());
        assert!(RiskCutoffs::new(0.3, 0.6, 1.2).is_err());
    }

    #[test]
    fn test_weighted_cost() {
        let table: UnitCostTable = [("medium".to_string(), 0.01)].into_iter().collect();
        let cost = estimate_cost(1000.0, 0.5, "medium", &table, CostMode::Weighted).unwrap();
        assert!((cost - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_cost() {
        let cost = estimate_cost(1000.0, 0.5, "medium", &costs(), CostMode::Flat).unwrap();
        assert!((cost - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_none_and_unknown_packages_cost_nothing() {
        assert_eq!(estimate_cost(1000.0, 0.95, "none", &costs(), CostMode::Weighted), Ok(0.0));
        assert_eq!(estimate_cost(1000.0, 0.5, "platinum", &costs(), CostMode::Flat), Ok(0.0));
    }

    #[test]
    fn test_engine_score_fraud_costs_zero() {
        let engine = SegmentationEngine::new(RiskCutoffs::default(), costs(), CostMode::Weighted).unwrap();
        let scored = engine.score(1000.0, 0.95).unwrap();
        assert_eq!(scored.tier, RiskTier::Fraud);
        assert_eq!(scored.package, ServicePackage::None);
        assert_eq!(scored.estimated_cost, 0.0);
    }

    #[test]
    fn test_segmentation_request_round_trip() {
        let json = r#"{
            "amount": 1000.0,
            "probability": 0.5,
            "cutoffs": {"low": 0.3, "medium": 0.6, "high": 0.9},
            "unit_costs": {"medium": 0.01}
        }"#;
        let request: SegmentationRequest = serde_json::from_str(json).unwrap();
        let response = request.evaluate().unwrap();

        assert_eq!(response.tier, RiskTier::Medium);
        assert_eq!(response.package, ServicePackage::Medium);
        assert!((response.cost - 5.0).abs() < 1e-12);
    }
}
