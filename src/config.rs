//! Configuration management for the scoring service and training tool

use crate::report::BusinessUnitCosts;
use crate::request::RequestParser;
use crate::segmentation::{CostMode, RiskCutoffs, SegmentationEngine, UnitCostTable};
use crate::training::TrainingConfig;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming inference requests
    pub request_subject: String,
    /// Subject for outgoing decisions when a request has no reply subject
    pub decision_subject: String,
    /// Subject for rejected records
    pub rejection_subject: String,
    /// Any message on this subject reloads the bundle
    pub reload_subject: String,
}

/// Persisted artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub bundle_uri: String,
    pub model_uri: String,
}

/// Segmentation settings
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default)]
    pub cutoffs: RiskCutoffs,
    #[serde(default)]
    pub cost_mode: CostMode,
    /// Unit cost per package name
    #[serde(default)]
    pub unit_costs: Option<UnitCostTable>,
    /// Per-business-unit rates, used when `unit_costs` is not given
    #[serde(default)]
    pub business_units: Option<BusinessUnitCosts>,
    /// Request field holding the transaction amount
    #[serde(default = "default_amount_column")]
    pub amount_column: String,
}

fn default_amount_column() -> String {
    "TransactionAmt".to_string()
}

/// Package costs as a share of the transaction amount
pub fn default_unit_costs() -> UnitCostTable {
    [("full", 0.015), ("medium", 0.01), ("basic", 0.003), ("none", 0.0)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            cutoffs: RiskCutoffs::default(),
            cost_mode: CostMode::default(),
            unit_costs: None,
            business_units: None,
            amount_column: default_amount_column(),
        }
    }
}

impl SegmentationConfig {
    /// Resolve the cost table and validate the cutoffs.
    pub fn engine(&self) -> Result<SegmentationEngine> {
        let unit_costs = match (&self.unit_costs, &self.business_units) {
            (Some(table), _) => table.clone(),
            (None, Some(units)) => units.unit_cost_table(),
            (None, None) => default_unit_costs(),
        };
        SegmentationEngine::new(self.cutoffs, unit_costs, self.cost_mode).context("Invalid segmentation configuration")
    }
}

/// Serving concurrency configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Request parser splitting off the same identifier column that
    /// training excludes from the features.
    pub fn request_parser(&self) -> RequestParser {
        RequestParser::new(self.training.id_column.clone())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "fraud.requests".to_string(),
                decision_subject: "fraud.decisions".to_string(),
                rejection_subject: "fraud.rejections".to_string(),
                reload_subject: "fraud.bundle.reload".to_string(),
            },
            artifacts: ArtifactsConfig {
                bundle_uri: "models/bundle.json".to_string(),
                model_uri: "models/model.json".to_string(),
            },
            segmentation: SegmentationConfig::default(),
            training: TrainingConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.segmentation.cutoffs, RiskCutoffs::default());
        assert_eq!(config.training.test_fraction, 0.2);

        let engine = config.segmentation.engine().unwrap();
        assert_eq!(engine.unit_costs["full"], 0.015);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = AppConfig::load_from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.toml")).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(shipped.nats.request_subject, defaults.nats.request_subject);
        assert_eq!(shipped.artifacts.bundle_uri, defaults.artifacts.bundle_uri);
        assert_eq!(shipped.segmentation.cutoffs, defaults.segmentation.cutoffs);
        assert_eq!(shipped.segmentation.engine().unwrap().unit_costs, default_unit_costs());
        assert_eq!(shipped.training.seed, defaults.training.seed);
        assert_eq!(shipped.training.grid, defaults.training.grid);
        assert_eq!(shipped.pipeline.workers, defaults.pipeline.workers);
    }

    #[test]
    fn test_business_unit_costs_used_without_table() {
        let mut segmentation = SegmentationConfig::default();
        segmentation.business_units = Some(BusinessUnitCosts {
            rates: crate::report::PerUnit {
                card: 0.003,
                transactions: 0.007,
                loans: 0.005,
            },
            weights: crate::report::PerUnit {
                card: 1.0,
                transactions: 1.0,
                loans: 1.0,
            },
        });
        let engine = segmentation.engine().unwrap();
        assert!((engine.unit_costs["medium"] - 0.01).abs() < 1e-12);
        assert!((engine.unit_costs["full"] - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_cutoffs_rejected() {
        let mut segmentation = SegmentationConfig::default();
        segmentation.cutoffs = RiskCutoffs {
            low: 0.7,
            medium: 0.6,
            high: 0.9,
        };
        assert!(segmentation.engine().is_err());
    }

    #[test]
    fn test_serving_id_column_follows_training() {
        let mut config = AppConfig::default();
        config.training.id_column = "record_key".to_string();

        let request = config
            .request_parser()
            .identify(crate::types::Record::from([
                ("record_key".to_string(), crate::types::FeatureValue::Number(7.0)),
                ("TransactionAmt".to_string(), crate::types::FeatureValue::Number(10.0)),
            ]));
        assert_eq!(request.id.as_deref(), Some("7"));
        assert!(!request.features.contains_key("record_key"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"
[nats]
url = "nats://nats:4222"
request_subject = "req"
decision_subject = "dec"
rejection_subject = "rej"
reload_subject = "reload"

[artifacts]
bundle_uri = "/srv/bundle.json"
model_uri = "/srv/model.json"

[segmentation]
cost_mode = "flat"

[segmentation.cutoffs]
low = 0.2
medium = 0.5
high = 0.8

[segmentation.unit_costs]
full = 0.02
medium = 0.01
basic = 0.005

[training]
seed = 7
categorical_columns = ["card4"]

[pipeline]
workers = 8

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.nats.reload_subject, "reload");
        assert_eq!(config.segmentation.cost_mode, CostMode::Flat);
        assert_eq!(config.segmentation.cutoffs.medium, 0.5);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.categorical_columns, vec!["card4"]);
        assert_eq!(config.training.target_column, "isFraud");
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.request_parser().id_column(), "TransactionID");

        let engine = config.segmentation.engine().unwrap();
        assert_eq!(engine.unit_costs["full"], 0.02);
    }
}
