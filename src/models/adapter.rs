//! Model adapter interface. The scoring core depends only on these traits,
//! never on a specific algorithm.

use crate::bundle::ArtifactStore;
use crate::error::{BundleError, ModelError};
use crate::types::FeatureMatrix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// A trained binary classifier.
pub trait Classifier: Send + Sync {
    /// Fraud-class probability per row, each in [0, 1].
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;

    /// Number of input columns the model was trained on.
    fn n_features(&self) -> usize;
}

/// Trains classifiers of one family.
pub trait ModelAdapter {
    type Model: Classifier + Serialize + DeserializeOwned;

    fn name(&self) -> &'static str;

    /// `y` holds 0/1 labels, one per row of `x`.
    fn fit(&self, x: &FeatureMatrix, y: &[u8]) -> Result<Self::Model, ModelError>;
}

/// Persisted model plus the bundle version it was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<M> {
    pub bundle_version: Uuid,
    pub algorithm: String,
    pub model: M,
}

/// Write a trained model next to its bundle.
pub fn save_model<M: Serialize, S: ArtifactStore + ?Sized>(
    store: &S,
    uri: &str,
    artifact: &ModelArtifact<M>,
) -> Result<(), BundleError> {
    let bytes = serde_json::to_vec(artifact)?;
    store.save(uri, &bytes)?;
    info!(
        uri = %uri,
        algorithm = %artifact.algorithm,
        bundle_version = %artifact.bundle_version,
        "Model artifact saved"
    );
    Ok(())
}

/// Read a model artifact. A payload that does not parse is `Corrupt`.
pub fn load_model<M: DeserializeOwned, S: ArtifactStore + ?Sized>(
    store: &S,
    uri: &str,
) -> Result<ModelArtifact<M>, BundleError> {
    let bytes = store.load(uri)?;
    serde_json::from_slice(&bytes).map_err(|e| BundleError::corrupt(uri, format!("model artifact: {e}")))
}

pub(crate) fn check_dimensions(expected: usize, x: &FeatureMatrix) -> Result<(), ModelError> {
    if x.n_cols() != expected {
        return Err(ModelError::DimensionMismatch {
            expected,
            actual: x.n_cols(),
        });
    }
    if let Some(row) = x.rows.iter().find(|r| r.len() != expected) {
        return Err(ModelError::DimensionMismatch {
            expected,
            actual: row.len(),
        });
    }
    Ok(())
}
