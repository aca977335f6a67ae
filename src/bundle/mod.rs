//! Model bundle: the feature schema, fitted transformers and decision
//! threshold produced by one training run, persisted and loaded as a unit.

pub mod store;

pub use store::{ArtifactStore, LocalStore, MemoryStore};

use crate::calibration::DecisionThreshold;
use crate::error::BundleError;
use crate::pipeline::{FeatureSchema, FittedTransformerSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Versioned, immutable triple of schema, transformers and threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_schema: FeatureSchema,
    pub transformers_by_stage: FittedTransformerSet,
    pub decision_threshold: DecisionThreshold,
}

impl ModelBundle {
    pub fn new(
        feature_schema: FeatureSchema,
        transformers_by_stage: FittedTransformerSet,
        decision_threshold: DecisionThreshold,
    ) -> Self {
        Self {
            version: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_schema,
            transformers_by_stage,
            decision_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.decision_threshold.value()
    }
}

/// Resolved location of a persisted bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHandle {
    pub uri: String,
    pub version: Uuid,
}

/// Required top-level components of a bundle artifact.
const REQUIRED: [&str; 3] = ["feature_schema", "transformers_by_stage", "decision_threshold"];

/// Persists and loads bundles through an [`ArtifactStore`].
pub struct BundleRegistry<S> {
    store: S,
}

impl<S: ArtifactStore> BundleRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Serialize and write the bundle in one atomic store operation.
    pub fn persist(&self, bundle: &ModelBundle, uri: &str) -> Result<BundleHandle, BundleError> {
        let bytes = serde_json::to_vec_pretty(bundle)?;
        self.store.save(uri, &bytes)?;

        info!(
            uri = %uri,
            version = %bundle.version,
            features = bundle.feature_schema.len(),
            threshold = bundle.threshold(),
            "Model bundle persisted"
        );

        Ok(BundleHandle {
            uri: uri.to_string(),
            version: bundle.version,
        })
    }

    /// Load a bundle, failing with `Corrupt` if any component is absent or
    /// does not parse.
    pub fn load(&self, uri: &str) -> Result<ModelBundle, BundleError> {
        let bytes = self.store.load(uri)?;
        let raw: Value =
            serde_json::from_slice(&bytes).map_err(|e| BundleError::corrupt(uri, format!("not valid JSON: {e}")))?;

        let Value::Object(fields) = &raw else {
            return Err(BundleError::corrupt(uri, "artifact is not an object"));
        };
        if let Some(absent) = REQUIRED.iter().find(|k| fields.get(**k).map_or(true, Value::is_null)) {
            return Err(BundleError::corrupt(uri, format!("missing component '{absent}'")));
        }

        let bundle: ModelBundle =
            serde_json::from_value(raw).map_err(|e| BundleError::corrupt(uri, e.to_string()))?;

        info!(
            uri = %uri,
            version = %bundle.version,
            created_at = %bundle.created_at,
            "Model bundle loaded"
        );
        Ok(bundle)
    }

    /// Load the bundle a handle points at and check it is the same version.
    pub fn load_handle(&self, handle: &BundleHandle) -> Result<ModelBundle, BundleError> {
        let bundle = self.load(&handle.uri)?;
        if bundle.version != handle.version {
            return Err(BundleError::VersionMismatch {
                bundle: bundle.version.to_string(),
                model: handle.version.to_string(),
            });
        }
        Ok(bundle)
    }
}
