//! Scoring engine: transform → predict → segment, over a swappable bundle

use crate::error::ScoringError;
use crate::models::adapter::Classifier;
use crate::models::loader::ServingBundle;
use crate::pipeline::TransformReport;
use crate::request::IdentifiedRecord;
use crate::segmentation::SegmentationEngine;
use crate::types::{Decision, Frame, Prediction, Record};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Outcome of scoring one record
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub decision: Decision,
    pub report: TransformReport,
}

/// Scoring engine holding the active serving bundle.
///
/// Requests take an `Arc` snapshot of the bundle and work on it without
/// holding any lock; `swap` replaces the pointer, so an in-flight request
/// always sees one complete bundle.
pub struct ScoringEngine<M> {
    current: RwLock<Arc<ServingBundle<M>>>,
    segmentation: SegmentationEngine,
    amount_column: String,
}

impl<M: Classifier> ScoringEngine<M> {
    pub fn new(bundle: ServingBundle<M>, segmentation: SegmentationEngine, amount_column: impl Into<String>) -> Self {
        info!(
            version = %bundle.version(),
            algorithm = %bundle.algorithm,
            threshold = bundle.threshold(),
            "Scoring engine initialized"
        );
        Self {
            current: RwLock::new(Arc::new(bundle)),
            segmentation,
            amount_column: amount_column.into(),
        }
    }

    /// Bundle in effect right now
    pub fn snapshot(&self) -> Arc<ServingBundle<M>> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a new bundle and return the one it replaced
    pub fn swap(&self, next: ServingBundle<M>) -> Arc<ServingBundle<M>> {
        let next = Arc::new(next);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, Arc::clone(&next));
        info!(
            previous = %previous.version(),
            current = %next.version(),
            "Serving bundle swapped"
        );
        previous
    }

    pub fn segmentation(&self) -> &SegmentationEngine {
        &self.segmentation
    }

    /// Probability and fraud flag per record. Fails as a whole on any error.
    pub fn predict(&self, records: &[Record]) -> Result<Vec<Prediction>, ScoringError> {
        let serving = self.snapshot();
        let (probabilities, _) = Self::probabilities(&serving, records)?;
        Ok(probabilities
            .into_iter()
            .map(|p| Prediction::new(p, serving.threshold()))
            .collect())
    }

    /// Score each record on its own, rejecting failures per record.
    ///
    /// All records of one call are scored against the same bundle snapshot.
    pub fn score(&self, records: &[IdentifiedRecord]) -> Vec<Result<ScoreOutcome, ScoringError>> {
        let serving = self.snapshot();
        records
            .iter()
            .map(|record| {
                let result = self.score_one(&serving, record);
                if let Err(e) = &result {
                    if e.is_fatal() {
                        error!(record_id = ?record.id, error = %e, version = %serving.version(), "Bundle failure while scoring");
                    } else {
                        warn!(record_id = ?record.id, error = %e, "Record rejected");
                    }
                }
                result
            })
            .collect()
    }

    fn score_one(&self, serving: &ServingBundle<M>, record: &IdentifiedRecord) -> Result<ScoreOutcome, ScoringError> {
        let (probabilities, report) = Self::probabilities(serving, std::slice::from_ref(&record.features))?;
        let probability = probabilities
            .first()
            .copied()
            .ok_or_else(|| ScoringError::MalformedRequest("model returned no probability".into()))?;

        let prediction = Prediction::new(probability, serving.threshold());
        let (tier, _) = self.segmentation.segment(probability)?;

        let amount = record.features.get(&self.amount_column).and_then(|v| v.as_number());
        let cost = match amount {
            Some(amount) => Some(self.segmentation.score(amount, probability)?.estimated_cost),
            None => None,
        };

        debug!(
            record_id = ?record.id,
            probability,
            tier = tier.as_str(),
            fallbacks = report.unknown_category_fallbacks,
            "Record scored"
        );

        Ok(ScoreOutcome {
            decision: Decision::new(record.id.clone(), prediction, tier, serving.version()).with_estimated_cost(cost),
            report,
        })
    }

    fn probabilities(serving: &ServingBundle<M>, records: &[Record]) -> Result<(Vec<f64>, TransformReport), ScoringError> {
        let frame = Frame::from_records(records);
        let bundle = &serving.bundle;
        let transformed = serving
            .pipeline
            .transform(frame, &bundle.feature_schema, &bundle.transformers_by_stage)?;
        let probabilities = serving.model.predict_proba(&transformed.matrix)?;
        Ok((probabilities, transformed.report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::DecisionThreshold;
    use crate::error::{ModelError, TransformError};
    use crate::pipeline::{FeatureSchema, Pipeline, PipelineOptions};
    use crate::segmentation::{CostMode, RiskCutoffs};
    use crate::types::{FeatureMatrix, FeatureValue, RiskTier};
    use crate::bundle::ModelBundle;

    /// Probability is the transformed `score` column as-is.
    struct Passthrough {
        width: usize,
    }

    impl Classifier for Passthrough {
        fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
            let idx = x.columns.iter().position(|c| c == "score").unwrap_or(0);
            Ok(x.rows.iter().map(|r| r[idx]).collect())
        }

        fn n_features(&self) -> usize {
            self.width
        }
    }

    fn record(pairs: &[(&str, FeatureValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn serving(threshold: f64) -> ServingBundle<Passthrough> {
        let frame = Frame::from_records(&[
            record(&[("score", 0.2.into()), ("TransactionAmt", 100.0.into()), ("card4", "visa".into())]),
            record(&[("score", 0.8.into()), ("TransactionAmt", 50.0.into()), ("card4", "amex".into())]),
        ]);
        let schema = FeatureSchema::capture(frame.columns(), &["card4"]).unwrap();
        let options = PipelineOptions {
            scale: false,
            ..PipelineOptions::default()
        };
        let (set, _) = Pipeline::standard(&options).fit_transform(frame, &schema).unwrap();
        let bundle = ModelBundle::new(schema, set, DecisionThreshold::new(threshold).unwrap());
        ServingBundle::new(bundle, Passthrough { width: 3 }, "passthrough")
    }

    fn engine() -> ScoringEngine<Passthrough> {
        let costs = [("full".to_string(), 0.015), ("medium".to_string(), 0.01), ("basic".to_string(), 0.003)]
            .into_iter()
            .collect();
        let segmentation = SegmentationEngine::new(RiskCutoffs::default(), costs, CostMode::Weighted).unwrap();
        ScoringEngine::new(serving(0.5), segmentation, "TransactionAmt")
    }

    fn identified(id: &str, features: Record) -> IdentifiedRecord {
        IdentifiedRecord {
            id: Some(id.to_string()),
            features,
        }
    }

    #[test]
    fn test_predict_applies_threshold() {
        let engine = engine();
        let predictions = engine
            .predict(&[record(&[("score", 0.7.into())]), record(&[("score", 0.3.into())])])
            .unwrap();

        assert_eq!(predictions[0], Prediction { probability: 0.7, is_fraud: true });
        assert_eq!(predictions[1], Prediction { probability: 0.3, is_fraud: false });
    }

    #[test]
    fn test_score_produces_decision() {
        let engine = engine();
        let outcomes = engine.score(&[identified(
            "tx_1",
            record(&[("score", 0.5.into()), ("TransactionAmt", 1000.0.into()), ("card4", "visa".into())]),
        )]);

        let outcome = outcomes[0].as_ref().unwrap();
        assert_eq!(outcome.decision.record_id.as_deref(), Some("tx_1"));
        assert_eq!(outcome.decision.tier, RiskTier::Medium);
        assert!(outcome.decision.is_fraud);
        let cost = outcome.decision.estimated_cost.unwrap();
        assert!((cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_records_rejected_individually() {
        let engine = engine();
        let outcomes = engine.score(&[
            identified("bad_probability", record(&[("score", 1.5.into())])),
            identified("no_overlap", record(&[("other", 1.0.into())])),
            identified("ok", record(&[("score", 0.1.into())])),
        ]);

        assert!(matches!(outcomes[0], Err(ScoringError::Decision(_))));
        assert!(matches!(
            outcomes[1],
            Err(ScoringError::Transform(TransformError::SchemaMismatch { .. }))
        ));
        let ok = outcomes[2].as_ref().unwrap();
        assert_eq!(ok.decision.tier, RiskTier::Low);
        assert_eq!(ok.decision.estimated_cost, None);
        assert_eq!(ok.report.synthesized_columns, 2);
    }

    #[test]
    fn test_swap_keeps_old_snapshot_alive() {
        let engine = engine();
        let before = engine.snapshot();

        let previous = engine.swap(serving(0.9));
        assert_eq!(previous.version(), before.version());
        assert_ne!(engine.snapshot().version(), before.version());

        // The old snapshot is still usable by whoever holds it.
        assert_eq!(before.threshold(), 0.5);
        let p = engine.predict(&[record(&[("score", 0.7.into())])]).unwrap();
        assert!(!p[0].is_fraud);
    }
}
