//! Offline training run producing a model bundle and its model artifact.
//!
//! clean → split → fit transformers on train → apply to validation →
//! balance → fit model → calibrate threshold → evaluate → persist.
//! The validation set only ever goes through the apply path, exactly as a
//! serving request would.

pub mod evaluation;
pub mod prep;

pub use evaluation::EvaluationReport;

use crate::bundle::{ArtifactStore, BundleHandle, BundleRegistry, ModelBundle};
use crate::calibration::{calibrate_with_grid, Metric, ThresholdGrid};
use crate::error::TrainingError;
use crate::models::adapter::{save_model, Classifier, ModelAdapter, ModelArtifact};
use crate::models::gbdt::BoosterParams;
use crate::pipeline::{FeatureSchema, Pipeline, PipelineOptions};
use crate::types::{FeatureValue, Frame, Record};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Training run settings, the `[training]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Columns encoded as categories. Columns holding non-numeric text are
    /// treated as categorical whether listed or not.
    #[serde(default = "default_categorical_columns")]
    pub categorical_columns: Vec<String>,
    #[serde(default = "default_null_threshold")]
    pub null_threshold: f64,
    #[serde(default)]
    pub drop_incomplete_rows: bool,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_balance")]
    pub balance: bool,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub grid: ThresholdGrid,
    #[serde(default)]
    pub pipeline: PipelineOptions,
    #[serde(default)]
    pub booster: BoosterParams,
}

fn default_id_column() -> String {
    "TransactionID".to_string()
}

fn default_target_column() -> String {
    "isFraud".to_string()
}

/// Categorical columns of the merged transaction + identity data
pub fn default_categorical_columns() -> Vec<String> {
    let mut columns: Vec<String> = [
        "DeviceType",
        "DeviceInfo",
        "ProductCD",
        "card1",
        "card2",
        "card3",
        "card4",
        "card5",
        "card6",
        "addr1",
        "addr2",
        "P_emaildomain",
        "R_emaildomain",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    columns.extend((12..=38).map(|i| format!("id_{i}")));
    columns.extend((1..=9).map(|i| format!("M{i}")));
    columns
}

fn default_null_threshold() -> f64 {
    0.4
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_balance() -> bool {
    true
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            target_column: default_target_column(),
            categorical_columns: default_categorical_columns(),
            null_threshold: default_null_threshold(),
            drop_incomplete_rows: false,
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            balance: default_balance(),
            metric: Metric::default(),
            grid: ThresholdGrid::default(),
            pipeline: PipelineOptions::default(),
            booster: BoosterParams::default(),
        }
    }
}

/// Everything a training run produced.
#[derive(Debug)]
pub struct TrainingOutcome<M> {
    pub bundle: ModelBundle,
    pub handle: BundleHandle,
    pub model: M,
    pub evaluation: EvaluationReport,
    pub dropped_columns: Vec<String>,
    pub train_rows: usize,
    /// Input record indices that formed the validation set
    pub validation_rows: Vec<usize>,
    /// Model probabilities for `validation_rows`, in the same order
    pub validation_probabilities: Vec<f64>,
}

/// Runs the training flow with one configuration.
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on `records` and persist the bundle and model artifact.
    pub fn run<A, S>(
        &self,
        records: Vec<Record>,
        adapter: &A,
        registry: &BundleRegistry<S>,
        bundle_uri: &str,
        model_uri: &str,
    ) -> Result<TrainingOutcome<A::Model>, TrainingError>
    where
        A: ModelAdapter,
        S: ArtifactStore,
    {
        let cfg = &self.config;
        info!(records = records.len(), algorithm = adapter.name(), "Starting training run");

        let (features, labels) = self.split_target(records)?;
        let mut frame = Frame::from_records(&features);

        let dropped_columns = prep::clean_columns(&mut frame, cfg.null_threshold);
        let (frame, labels, kept) = if cfg.drop_incomplete_rows {
            let kept = prep::complete_rows(&frame);
            let labels: Vec<u8> = kept.iter().map(|&i| labels[i]).collect();
            info!(kept = kept.len(), dropped = frame.n_rows() - kept.len(), "Dropped incomplete rows");
            (frame.take_rows(&kept), labels, kept)
        } else {
            let kept = (0..frame.n_rows()).collect();
            (frame, labels, kept)
        };

        let categorical = self.categorical_columns(&frame);
        let schema = FeatureSchema::capture(frame.columns(), &categorical)?;
        info!(
            features = schema.len(),
            categorical = schema.categorical().count(),
            "Feature schema captured"
        );

        let (train_idx, valid_idx) = prep::stratified_split(&labels, cfg.test_fraction, cfg.seed);
        if valid_idx.is_empty() {
            return Err(TrainingError::EmptyValidation);
        }
        let train_labels: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        let valid_labels: Vec<u8> = valid_idx.iter().map(|&i| labels[i]).collect();

        let pipeline = Pipeline::standard(&cfg.pipeline);
        let (set, train) = pipeline.fit_transform(frame.take_rows(&train_idx), &schema)?;
        let valid = pipeline.transform(frame.take_rows(&valid_idx), &schema, &set)?;
        debug!(
            columns = train.matrix.n_cols(),
            fallbacks = valid.report.unknown_category_fallbacks,
            "Training and validation matrices ready"
        );

        let (x_train, y_train) = if cfg.balance {
            prep::oversample(&train.matrix, &train_labels, cfg.seed)
        } else {
            (train.matrix, train_labels)
        };

        let model = adapter.fit(&x_train, &y_train)?;
        let probabilities = model.predict_proba(&valid.matrix)?;

        let threshold = calibrate_with_grid(&valid_labels, &probabilities, cfg.metric, &cfg.grid)?;
        let evaluation = EvaluationReport::evaluate(&valid_labels, &probabilities, threshold.value())?;
        evaluation.log();

        let bundle = ModelBundle::new(schema, set, threshold);
        let handle = registry.persist(&bundle, bundle_uri)?;
        save_model(
            registry.store(),
            model_uri,
            &ModelArtifact {
                bundle_version: bundle.version,
                algorithm: adapter.name().to_string(),
                model: &model,
            },
        )?;

        info!(
            version = %bundle.version,
            threshold = threshold.value(),
            train_rows = y_train.len(),
            validation_rows = valid_labels.len(),
            "Training run complete"
        );

        Ok(TrainingOutcome {
            bundle,
            handle,
            model,
            evaluation,
            dropped_columns,
            train_rows: y_train.len(),
            validation_rows: valid_idx.iter().map(|&i| kept[i]).collect(),
            validation_probabilities: probabilities,
        })
    }

    /// Separate labels from features and drop the identifier field.
    fn split_target(&self, records: Vec<Record>) -> Result<(Vec<Record>, Vec<u8>), TrainingError> {
        let cfg = &self.config;
        if !records.iter().any(|r| r.contains_key(&cfg.target_column)) {
            return Err(TrainingError::MissingTarget(cfg.target_column.clone()));
        }

        let mut features = Vec::with_capacity(records.len());
        let mut labels = Vec::with_capacity(records.len());
        for (row, mut record) in records.into_iter().enumerate() {
            let label = record
                .remove(&cfg.target_column)
                .as_ref()
                .and_then(FeatureValue::as_number)
                .and_then(|v| match v {
                    v if v == 0.0 => Some(0u8),
                    v if v == 1.0 => Some(1u8),
                    _ => None,
                })
                .ok_or(TrainingError::InvalidLabel { row })?;
            record.remove(&cfg.id_column);
            features.push(record);
            labels.push(label);
        }
        Ok((features, labels))
    }

    /// Configured categorical columns plus any column holding non-numeric text.
    fn categorical_columns(&self, frame: &Frame) -> Vec<String> {
        let mut categorical: BTreeSet<String> = self.config.categorical_columns.iter().cloned().collect();
        for (idx, name) in frame.columns().iter().enumerate() {
            let textual = frame
                .column(idx)
                .any(|v| matches!(v, FeatureValue::Text(_)) && v.as_number().is_none());
            if textual && categorical.insert(name.clone()) {
                debug!(column = %name, "Detected text column, encoding as categorical");
            }
        }
        categorical.into_iter().collect()
    }
}
