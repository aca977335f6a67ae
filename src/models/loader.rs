//! Loads a model bundle and its classifier as one serving unit

use crate::bundle::{ArtifactStore, BundleRegistry, ModelBundle};
use crate::error::BundleError;
use crate::models::adapter::{load_model, Classifier};
use crate::pipeline::Pipeline;
use serde::de::DeserializeOwned;
use tracing::info;

/// Bundle, classifier and the pipeline rebuilt from the bundle's stage list.
///
/// Constructed once, then shared read-only by every scoring request.
pub struct ServingBundle<M> {
    pub bundle: ModelBundle,
    pub model: M,
    pub algorithm: String,
    pub(crate) pipeline: Pipeline,
}

impl<M: Classifier> ServingBundle<M> {
    /// Pair a bundle with a model trained against it.
    pub fn new(bundle: ModelBundle, model: M, algorithm: impl Into<String>) -> Self {
        let pipeline = Pipeline::for_set(&bundle.transformers_by_stage);
        Self {
            bundle,
            model,
            algorithm: algorithm.into(),
            pipeline,
        }
    }

    pub fn version(&self) -> uuid::Uuid {
        self.bundle.version
    }

    pub fn threshold(&self) -> f64 {
        self.bundle.threshold()
    }
}

/// Loader for serving bundles
pub struct ModelLoader<S> {
    registry: BundleRegistry<S>,
}

impl<S: ArtifactStore> ModelLoader<S> {
    pub fn new(store: S) -> Self {
        Self {
            registry: BundleRegistry::new(store),
        }
    }

    /// Load the bundle at `bundle_uri` and the model at `model_uri`.
    ///
    /// Fails with `VersionMismatch` when the model was trained against a
    /// different bundle, and with `Corrupt` when the model's input width does
    /// not match the bundle's fitted output layout.
    pub fn load<M>(&self, bundle_uri: &str, model_uri: &str) -> Result<ServingBundle<M>, BundleError>
    where
        M: Classifier + DeserializeOwned,
    {
        info!(bundle = %bundle_uri, model = %model_uri, "Loading serving bundle");

        let bundle = self.registry.load(bundle_uri)?;
        let artifact = load_model::<M, _>(self.registry.store(), model_uri)?;

        if artifact.bundle_version != bundle.version {
            return Err(BundleError::VersionMismatch {
                bundle: bundle.version.to_string(),
                model: artifact.bundle_version.to_string(),
            });
        }

        let width = bundle
            .transformers_by_stage
            .output_columns()
            .map(<[String]>::len)
            .ok_or_else(|| BundleError::corrupt(bundle_uri, "no fitted output layout"))?;
        if width != artifact.model.n_features() {
            return Err(BundleError::corrupt(
                model_uri,
                format!(
                    "model expects {} features, bundle produces {}",
                    artifact.model.n_features(),
                    width
                ),
            ));
        }

        info!(
            version = %bundle.version,
            algorithm = %artifact.algorithm,
            features = width,
            threshold = bundle.threshold(),
            "Serving bundle loaded"
        );

        Ok(ServingBundle::new(bundle, artifact.model, artifact.algorithm))
    }
}
