//! Business cost reporting over scored records.
//!
//! Packages are compositions of business units: basic grants the card,
//! medium adds transactions, full adds loans. A package's unit cost can be
//! derived from per-unit fraud cost rates weighted by volume.

use crate::segmentation::{estimate_cost, SegmentationEngine, UnitCostTable};
use crate::types::{RiskTier, ScoredRecord, ServicePackage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Business line a package can grant access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessUnit {
    Card,
    Transactions,
    Loans,
}

impl ServicePackage {
    /// Business units granted by the package
    pub fn units(&self) -> &'static [BusinessUnit] {
        match self {
            ServicePackage::Full => &[BusinessUnit::Card, BusinessUnit::Transactions, BusinessUnit::Loans],
            ServicePackage::Medium => &[BusinessUnit::Card, BusinessUnit::Transactions],
            ServicePackage::Basic => &[BusinessUnit::Card],
            ServicePackage::None => &[],
        }
    }
}

/// One value per business unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerUnit {
    pub card: f64,
    pub transactions: f64,
    pub loans: f64,
}

impl PerUnit {
    pub fn get(&self, unit: BusinessUnit) -> f64 {
        match unit {
            BusinessUnit::Card => self.card,
            BusinessUnit::Transactions => self.transactions,
            BusinessUnit::Loans => self.loans,
        }
    }
}

/// Per-unit cost rates and volume weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessUnitCosts {
    pub rates: PerUnit,
    #[serde(default = "unit_weights")]
    pub weights: PerUnit,
}

fn unit_weights() -> PerUnit {
    PerUnit {
        card: 1.0,
        transactions: 1.0,
        loans: 1.0,
    }
}

impl BusinessUnitCosts {
    /// Unit cost of a package: `Σ rate(u) * weight(u)` over its units.
    pub fn package_cost(&self, package: ServicePackage) -> f64 {
        package
            .units()
            .iter()
            .map(|&u| self.rates.get(u) * self.weights.get(u))
            .sum()
    }

    /// Cost table covering every package.
    pub fn unit_cost_table(&self) -> UnitCostTable {
        [
            ServicePackage::Full,
            ServicePackage::Medium,
            ServicePackage::Basic,
            ServicePackage::None,
        ]
        .into_iter()
        .map(|p| (p.as_str().to_string(), self.package_cost(p)))
        .collect()
    }
}

/// Count, amount and cost of one group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub count: u64,
    pub amount: f64,
    pub cost: f64,
}

impl GroupSummary {
    fn add(&mut self, record: &ScoredRecord) {
        self.count += 1;
        self.amount += record.amount;
        self.cost += record.estimated_cost;
    }
}

/// Cost of the model's assignments against granting everyone the full package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub records: u64,
    pub total_amount: f64,
    pub model_cost: f64,
    pub baseline_cost: f64,
    pub savings: f64,
    /// `savings / baseline_cost`, 0 when the baseline costs nothing
    pub savings_share: f64,
    /// `model_cost / total_amount`, 0 when the amount is 0
    pub cost_share_of_amount: f64,
    pub by_tier: BTreeMap<RiskTier, GroupSummary>,
    pub by_package: BTreeMap<ServicePackage, GroupSummary>,
}

impl CostReport {
    /// Summarize records scored by `engine`; the baseline reprices each one
    /// under the full package with the same cost mode.
    pub fn build(records: &[ScoredRecord], engine: &SegmentationEngine) -> Self {
        let mut report = Self {
            records: 0,
            total_amount: 0.0,
            model_cost: 0.0,
            baseline_cost: 0.0,
            savings: 0.0,
            savings_share: 0.0,
            cost_share_of_amount: 0.0,
            by_tier: BTreeMap::new(),
            by_package: BTreeMap::new(),
        };

        for record in records {
            report.records += 1;
            report.total_amount += record.amount;
            report.model_cost += record.estimated_cost;
            report.baseline_cost += estimate_cost(
                record.amount,
                record.probability,
                ServicePackage::Full.as_str(),
                &engine.unit_costs,
                engine.cost_mode,
            )
            .unwrap_or(0.0);
            report.by_tier.entry(record.tier).or_default().add(record);
            report.by_package.entry(record.package).or_default().add(record);
        }

        report.savings = report.baseline_cost - report.model_cost;
        report.savings_share = share(report.savings, report.baseline_cost);
        report.cost_share_of_amount = share(report.model_cost, report.total_amount);
        report
    }

    pub fn log(&self) {
        info!(
            records = self.records,
            model_cost = self.model_cost,
            baseline_cost = self.baseline_cost,
            savings = self.savings,
            savings_share = self.savings_share,
            cost_share_of_amount = self.cost_share_of_amount,
            "Cost report"
        );
        for (tier, summary) in &self.by_tier {
            info!(
                tier = tier.as_str(),
                package = tier.package().as_str(),
                count = summary.count,
                cost = summary.cost,
                "Tier cost"
            );
        }
    }
}

fn share(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole
    }
}
