//! Error taxonomy for the scoring core.
//!
//! Bundle and transformer failures are fatal: they mean the deployed artifacts
//! are unusable and must surface to the caller. Probability and request errors
//! are scoped to a single record and are rejected at the request boundary.

use thiserror::Error;

/// Errors raised while persisting or loading a model bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The handle did not resolve to any stored artifact.
    #[error("Bundle not found: {uri}")]
    NotFound { uri: String },

    /// The artifact exists but a required component is absent or unreadable.
    #[error("Bundle corrupt at {uri}: {reason}")]
    Corrupt { uri: String, reason: String },

    /// Model artifact and bundle were produced by different training runs.
    #[error("Bundle version mismatch: bundle {bundle}, model trained against {model}")]
    VersionMismatch { bundle: String, model: String },

    /// The storage backend failed.
    #[error("Storage error at {uri}: {source}")]
    Storage {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    /// The URI names a backend this store cannot serve.
    #[error("Unsupported artifact location: {uri}")]
    UnsupportedLocation { uri: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BundleError {
    pub fn corrupt(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the transformer pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A stateful stage has no fitted state in the transformer set.
    #[error("Transformer missing for stage '{stage}'")]
    TransformerMissing { stage: &'static str },

    /// The input shares no column with the feature schema.
    #[error("Schema mismatch: none of the {received} input columns match the {expected} schema features")]
    SchemaMismatch { expected: usize, received: usize },

    /// A value could not be represented as a number after all stages ran.
    #[error("Non-numeric value in column '{column}' after transformation")]
    NonNumeric { column: String },

    /// Fitting requires at least one row.
    #[error("Cannot fit transformers on an empty frame")]
    EmptyInput,

    /// The feature list handed to the schema contains a duplicate.
    #[error("Duplicate feature '{0}' in schema")]
    DuplicateFeature(String),

    /// A row does not have one cell per column.
    #[error("Row {row} has {actual} cells, expected {expected}")]
    Shape {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

impl TransformError {
    /// Fatal errors indicate a corrupt or mismatched bundle rather than a bad record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransformerMissing { .. })
    }
}

/// Errors raised by the risk segmentation engine.
#[derive(Debug, Error, PartialEq)]
pub enum DecisionError {
    #[error("Invalid probability {0}: must lie in [0, 1]")]
    InvalidProbability(f64),

    #[error("Invalid cutoffs ({low}, {medium}, {high}): expected 0 <= low < medium < high <= 1")]
    InvalidCutoffs { low: f64, medium: f64, high: f64 },

    #[error("Invalid transaction amount {0}")]
    InvalidAmount(f64),
}

/// Errors raised by threshold calibration and evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("Labels ({labels}) and probabilities ({probabilities}) differ in length")]
    LengthMismatch { labels: usize, probabilities: usize },

    #[error("Calibration requires at least one validation row")]
    Empty,

    #[error("Invalid threshold grid: {0}")]
    InvalidGrid(String),

    #[error("Decision threshold {0} must lie strictly between 0 and 1")]
    InvalidThreshold(f64),
}

/// Errors raised by model adapters.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training labels contain a single class; both fraud and legitimate rows are required")]
    SingleClass,

    #[error("Label count {labels} does not match row count {rows}")]
    LabelMismatch { rows: usize, labels: usize },

    #[error("Dimension mismatch: model expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the scoring service for one record or one request.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Decision(#[from] DecisionError),
}

impl ScoringError {
    /// Whether the failure invalidates the loaded bundle rather than one record.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transform(e) => e.is_fatal(),
            Self::Model(ModelError::DimensionMismatch { .. }) => true,
            _ => false,
        }
    }
}

/// Errors raised by a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Target column '{0}' not present in training records")]
    MissingTarget(String),

    #[error("Row {row}: target value is not a binary label")]
    InvalidLabel { row: usize },

    #[error("Validation split has no rows; provide more data or lower test_fraction")]
    EmptyValidation,

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let missing = ScoringError::from(TransformError::TransformerMissing { stage: "scale" });
        assert!(missing.is_fatal());

        let mismatch = ScoringError::from(TransformError::SchemaMismatch {
            expected: 10,
            received: 2,
        });
        assert!(!mismatch.is_fatal());

        let probability = ScoringError::from(DecisionError::InvalidProbability(1.5));
        assert!(!probability.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = BundleError::NotFound {
            uri: "models/bundle.json".to_string(),
        };
        assert_eq!(err.to_string(), "Bundle not found: models/bundle.json");

        let err = DecisionError::InvalidProbability(-0.1);
        assert!(err.to_string().contains("-0.1"));
    }
}
