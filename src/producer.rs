//! Reply publishing for request/reply messages

use anyhow::Result;
use async_nats::{Client, Message};
use serde::Serialize;
use tracing::{debug, warn};

/// Sends JSON replies to the inbox a request came from
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Serialize `body` and publish it on the request's reply subject.
    /// Requests published without a reply inbox are answered with nothing.
    pub async fn reply<T: Serialize>(&self, request: &Message, body: &T) -> Result<()> {
        let Some(reply_to) = request.reply.clone() else {
            warn!(subject = %request.subject, "Request has no reply subject, dropping reply");
            return Ok(());
        };

        let payload = encode(body)?;
        let size = payload.len();
        self.client.publish(reply_to.clone(), payload.into()).await?;

        debug!(reply_to = %reply_to, bytes = size, "Published reply");
        Ok(())
    }

    /// Flush buffered replies to the server
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await?;
        Ok(())
    }
}

/// Wire encoding shared by all replies
pub fn encode<T: Serialize>(body: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(body)
}
