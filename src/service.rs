//! Request handling shared by the NATS worker: parse, score, collect.

use crate::bundle::ArtifactStore;
use crate::error::BundleError;
use crate::metrics::ServingMetrics;
use crate::models::{Classifier, ModelLoader, ScoringEngine};
use crate::producer::ScoringReply;
use crate::request::RequestParser;
use crate::types::Rejection;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Scoring engine plus request parsing and serving metrics.
pub struct ScoringService<M> {
    engine: ScoringEngine<M>,
    parser: RequestParser,
    metrics: Arc<ServingMetrics>,
}

impl<M: Classifier> ScoringService<M> {
    pub fn new(engine: ScoringEngine<M>, parser: RequestParser, metrics: Arc<ServingMetrics>) -> Self {
        Self {
            engine,
            parser,
            metrics,
        }
    }

    pub fn engine(&self) -> &ScoringEngine<M> {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<ServingMetrics> {
        &self.metrics
    }

    /// Score a raw request payload. A malformed payload yields one
    /// rejection without an identifier; a malformed element of a batch is
    /// rejected on its own and the rest are still scored.
    pub fn handle(&self, payload: &[u8]) -> ScoringReply {
        let start = Instant::now();
        let mut reply = ScoringReply::default();

        match self.parser.parse(payload) {
            Ok(outcomes) => {
                let mut records = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    match outcome {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            warn!(error = %e, "Rejected malformed record");
                            self.metrics.record_rejection();
                            reply.rejections.push(Rejection {
                                record_id: None,
                                error: e.to_string(),
                            });
                        }
                    }
                }

                for (record, outcome) in records.iter().zip(self.engine.score(&records)) {
                    match outcome {
                        Ok(scored) => {
                            self.metrics.record_decision(
                                scored.decision.tier,
                                scored.decision.probability,
                                scored.report.unknown_category_fallbacks,
                            );
                            reply.decisions.push(scored.decision);
                        }
                        Err(e) => {
                            self.metrics.record_rejection();
                            reply.rejections.push(Rejection {
                                record_id: record.id.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                self.metrics.record_rejection();
                reply.rejections.push(Rejection {
                    record_id: None,
                    error: e.to_string(),
                });
            }
        }

        self.metrics.record_request(start.elapsed());
        reply
    }
}

impl<M: Classifier + DeserializeOwned> ScoringService<M> {
    /// Load the bundle and model again and swap them in. On failure the
    /// current bundle stays active.
    pub fn reload<S: ArtifactStore>(
        &self,
        loader: &ModelLoader<S>,
        bundle_uri: &str,
        model_uri: &str,
    ) -> Result<(), BundleError> {
        match loader.load::<M>(bundle_uri, model_uri) {
            Ok(next) => {
                let previous = self.engine.swap(next);
                self.metrics.record_reload();
                info!(previous = %previous.version(), "Bundle reload applied");
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    active = %self.engine.snapshot().version(),
                    "Bundle reload failed, keeping active bundle"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleRegistry, MemoryStore};
    use crate::models::{BoostedStumps, StumpBooster};
    use crate::segmentation::SegmentationEngine;
    use crate::training::fixtures::synthetic_records;
    use crate::training::{Trainer, TrainingConfig};
    use std::sync::atomic::Ordering;

    fn trained(store: &MemoryStore, prefix: &str) {
        let registry = BundleRegistry::new(store.clone());
        Trainer::new(TrainingConfig::default())
            .run(
                synthetic_records(120),
                &StumpBooster::default(),
                &registry,
                &format!("{prefix}/bundle.json"),
                &format!("{prefix}/model.json"),
            )
            .unwrap();
    }

    fn service(store: &MemoryStore) -> ScoringService<BoostedStumps> {
        let serving = ModelLoader::new(store.clone())
            .load::<BoostedStumps>("mem://v1/bundle.json", "mem://v1/model.json")
            .unwrap();
        let engine = ScoringEngine::new(serving, SegmentationEngine::default(), "TransactionAmt");
        ScoringService::new(engine, RequestParser::default(), Arc::new(ServingMetrics::new()))
    }

    #[test]
    fn test_handle_mixed_request() {
        let store = MemoryStore::new();
        trained(&store, "mem://v1");
        let service = service(&store);

        let reply = service.handle(
            br#"[
                {"TransactionID": 1, "TransactionAmt": 950.5, "card4": "amex", "dist1": 3},
                {"TransactionID": 2, "unrelated": 1},
                {"TransactionID": 3, "TransactionAmt": 12.0, "card4": "paypal"}
            ]"#,
        );

        assert_eq!(reply.decisions.len(), 2);
        assert_eq!(reply.rejections.len(), 1);
        assert_eq!(reply.rejections[0].record_id.as_deref(), Some("2"));
        assert_eq!(reply.decisions[1].record_id.as_deref(), Some("3"));

        let metrics = service.metrics();
        assert_eq!(metrics.requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.records_rejected.load(Ordering::Relaxed), 1);
        assert!(metrics.category_fallbacks.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_handle_malformed_payload() {
        let store = MemoryStore::new();
        trained(&store, "mem://v1");
        let reply = service(&store).handle(b"{not json");

        assert!(reply.decisions.is_empty());
        assert_eq!(reply.rejections.len(), 1);
        assert!(reply.rejections[0].record_id.is_none());
    }

    #[test]
    fn test_handle_batch_with_bad_element() {
        let store = MemoryStore::new();
        trained(&store, "mem://v1");
        let service = service(&store);

        let reply = service.handle(
            br#"[
                {"TransactionID": 1, "TransactionAmt": 950.5, "card4": "visa"},
                3,
                {"TransactionID": 2, "TransactionAmt": 12.0, "card4": "visa"}
            ]"#,
        );

        assert_eq!(reply.decisions.len(), 2);
        assert_eq!(reply.decisions[0].record_id.as_deref(), Some("1"));
        assert_eq!(reply.decisions[1].record_id.as_deref(), Some("2"));
        assert_eq!(reply.rejections.len(), 1);
        assert!(reply.rejections[0].record_id.is_none());
        assert!(reply.rejections[0].error.contains("record 1"));
        assert_eq!(service.metrics().records_rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reload_swaps_and_failed_reload_keeps_active() {
        let store = MemoryStore::new();
        trained(&store, "mem://v1");
        trained(&store, "mem://v2");
        let service = service(&store);
        let loader = ModelLoader::new(store.clone());
        let v1 = service.engine().snapshot().version();

        service
            .reload(&loader, "mem://v2/bundle.json", "mem://v2/model.json")
            .unwrap();
        let v2 = service.engine().snapshot().version();
        assert_ne!(v1, v2);

        let err = service.reload(&loader, "mem://v3/bundle.json", "mem://v3/model.json");
        assert!(matches!(err, Err(BundleError::NotFound { .. })));
        assert_eq!(service.engine().snapshot().version(), v2);

        let reply = service.handle(br#"{"TransactionAmt": 100.0}"#);
        assert_eq!(reply.decisions[0].bundle_version, v2);
    }
}
