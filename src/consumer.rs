//! NATS subscriptions for inference requests and bundle reloads

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for inference requests and reload signals
pub struct RequestConsumer {
    client: Client,
    request_subject: String,
    reload_subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, request_subject: &str, reload_subject: &str) -> Self {
        Self {
            client,
            request_subject: request_subject.to_string(),
            reload_subject: reload_subject.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe_requests(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.request_subject.clone()).await?;
        info!(subject = %self.request_subject, "Subscribed to request subject");
        Ok(subscriber)
    }

    /// Subscribe to the reload subject
    pub async fn subscribe_reloads(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.reload_subject.clone()).await?;
        info!(subject = %self.reload_subject, "Subscribed to reload subject");
        Ok(subscriber)
    }

    pub fn request_subject(&self) -> &str {
        &self.request_subject
    }
}
