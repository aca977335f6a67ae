//! NATS publisher for decisions and rejections

use crate::types::{Decision, Rejection};
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Reply body for one request: decisions and rejections in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringReply {
    pub decisions: Vec<Decision>,
    pub rejections: Vec<Rejection>,
}

/// Publisher for scoring outcomes
#[derive(Clone)]
pub struct DecisionProducer {
    client: Client,
    decision_subject: String,
    rejection_subject: String,
}

impl DecisionProducer {
    pub fn new(client: Client, decision_subject: &str, rejection_subject: &str) -> Self {
        Self {
            client,
            decision_subject: decision_subject.to_string(),
            rejection_subject: rejection_subject.to_string(),
        }
    }

    /// Publish a decision on the decision subject
    pub async fn publish_decision(&self, decision: &Decision) -> Result<()> {
        let payload = serde_json::to_vec(decision)?;
        self.client
            .publish(self.decision_subject.clone(), payload.into())
            .await?;

        debug!(
            decision_id = %decision.decision_id,
            record_id = ?decision.record_id,
            probability = decision.probability,
            tier = decision.tier.as_str(),
            "Published decision"
        );
        Ok(())
    }

    /// Publish a rejection on the rejection subject
    pub async fn publish_rejection(&self, rejection: &Rejection) -> Result<()> {
        let payload = serde_json::to_vec(rejection)?;
        self.client
            .publish(self.rejection_subject.clone(), payload.into())
            .await?;
        debug!(record_id = ?rejection.record_id, error = %rejection.error, "Published rejection");
        Ok(())
    }

    /// Publish every outcome of a request to its subject, logging failures
    pub async fn publish_all(&self, reply: &ScoringReply) {
        for decision in &reply.decisions {
            if let Err(e) = self.publish_decision(decision).await {
                error!(decision_id = %decision.decision_id, error = %e, "Failed to publish decision");
            }
        }
        for rejection in &reply.rejections {
            if let Err(e) = self.publish_rejection(rejection).await {
                error!(record_id = ?rejection.record_id, error = %e, "Failed to publish rejection");
            }
        }
    }

    /// Answer a request on its reply subject
    pub async fn reply(&self, subject: Subject, reply: &ScoringReply) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }

    pub fn decision_subject(&self) -> &str {
        &self.decision_subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Prediction, RiskTier};
    use uuid::Uuid;

    #[test]
    fn test_reply_wire_format() {
        let reply = ScoringReply {
            decisions: vec![Decision::new(
                Some("7".into()),
                Prediction::new(0.2, 0.5),
                RiskTier::Low,
                Uuid::nil(),
            )],
            rejections: vec![Rejection {
                record_id: Some("8".into()),
                error: "Invalid probability 1.2: must lie in [0, 1]".into(),
            }],
        };

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["decisions"][0]["package"], "full");
        assert_eq!(value["decisions"][0]["is_fraud"], false);
        assert_eq!(value["rejections"][0]["record_id"], "8");
    }
}
