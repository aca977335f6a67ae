//! Decision data structures returned by the scoring service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk tier assigned from a fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Fraud,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [RiskTier::Low, RiskTier::Medium, RiskTier::High, RiskTier::Fraud];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Fraud => "fraud",
        }
    }

    /// Service package granted to this tier
    pub fn package(&self) -> ServicePackage {
        match self {
            RiskTier::Low => ServicePackage::Full,
            RiskTier::Medium => ServicePackage::Medium,
            RiskTier::High => ServicePackage::Basic,
            RiskTier::Fraud => ServicePackage::None,
        }
    }
}

/// Bundle of business services offered per risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePackage {
    Full,
    Medium,
    Basic,
    None,
}

impl ServicePackage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServicePackage::Full => "full",
            ServicePackage::Medium => "medium",
            ServicePackage::Basic => "basic",
            ServicePackage::None => "none",
        }
    }
}

/// Model output for one record: `is_fraud = probability >= threshold`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub is_fraud: bool,
}

impl Prediction {
    pub fn new(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            is_fraud: probability >= threshold,
        }
    }
}

/// Transient per-inference outcome of the segmentation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub amount: f64,
    pub probability: f64,
    pub tier: RiskTier,
    pub package: ServicePackage,
    pub estimated_cost: f64,
}

/// Full decision published for a scored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision identifier
    pub decision_id: String,

    /// Identifier field taken from the request, if present
    pub record_id: Option<String>,

    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,

    /// Probability at or above the calibrated threshold
    pub is_fraud: bool,

    pub tier: RiskTier,

    pub package: ServicePackage,

    /// Absent when the record carried no transaction amount
    pub estimated_cost: Option<f64>,

    /// Version of the bundle that produced the decision
    pub bundle_version: Uuid,

    /// Decision timestamp
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        record_id: Option<String>,
        prediction: Prediction,
        tier: RiskTier,
        bundle_version: Uuid,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4().to_string(),
            record_id,
            probability: prediction.probability,
            is_fraud: prediction.is_fraud,
            tier,
            package: tier.package(),
            estimated_cost: None,
            bundle_version,
            timestamp: Utc::now(),
        }
    }

    pub fn with_estimated_cost(mut self, cost: Option<f64>) -> Self {
        self.estimated_cost = cost;
        self
    }
}

/// Rejection published in place of a decision when a record cannot be scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub record_id: Option<String>,
    pub error: String,
}
