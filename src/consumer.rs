//! NATS subscriptions for prediction requests and health probes

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for receiving requests from NATS
pub struct RequestConsumer {
    client: Client,
    predict_subject: String,
    health_subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, predict_subject: &str, health_subject: &str) -> Self {
        Self {
            client,
            predict_subject: predict_subject.to_string(),
            health_subject: health_subject.to_string(),
        }
    }

    /// Subscribe to the prediction request subject
    pub async fn subscribe_predictions(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.predict_subject.clone()).await?;
        info!(subject = %self.predict_subject, "Subscribed to prediction subject");
        Ok(subscriber)
    }

    /// Subscribe to the health probe subject
    pub async fn subscribe_health(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.health_subject.clone()).await?;
        info!(subject = %self.health_subject, "Subscribed to health subject");
        Ok(subscriber)
    }

    pub fn predict_subject(&self) -> &str {
        &self.predict_subject
    }

    pub fn health_subject(&self) -> &str {
        &self.health_subject
    }
}
