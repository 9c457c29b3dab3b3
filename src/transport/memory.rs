//! In-memory transport for testing and single-process use
//!
//! Records every published message in order. Failures can be injected to
//! exercise error propagation.

use super::Transport;
use crate::error::{PubSubError, Result};
use crate::types::MessageId;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

/// A message accepted by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub body: Bytes,
    pub message_id: MessageId,
}

impl PublishedMessage {
    /// Decode the body as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug)]
struct InjectedFailure {
    /// Publishes that still succeed before failing
    remaining_ok: usize,
    reason: String,
}

/// In-memory transport
#[derive(Debug, Default)]
pub struct MemoryTransport {
    published: RwLock<Vec<PublishedMessage>>,
    failure: RwLock<Option<InjectedFailure>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent publish with `reason`
    pub async fn fail_with(&self, reason: impl Into<String>) {
        self.fail_after(0, reason).await;
    }

    /// Let `successes` more publishes through, then fail with `reason`
    pub async fn fail_after(&self, successes: usize, reason: impl Into<String>) {
        *self.failure.write().await = Some(InjectedFailure {
            remaining_ok: successes,
            reason: reason.into(),
        });
    }

    /// Stop injecting failures
    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// All published messages, oldest first
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    /// Number of successful publishes
    pub async fn count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Forget published messages
    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, body: Bytes) -> Result<MessageId> {
        if let Some(failure) = self.failure.write().await.as_mut() {
            if failure.remaining_ok == 0 {
                return Err(PubSubError::Publish {
                    topic: topic.to_string(),
                    reason: failure.reason.clone(),
                });
            }
            failure.remaining_ok -= 1;
        }

        let message_id = format!("msg-{}", uuid::Uuid::new_v4());
        self.published.write().await.push(PublishedMessage {
            topic: topic.to_string(),
            body,
            message_id: message_id.clone(),
        });

        tracing::trace!(topic, message_id = %message_id, "Message stored in memory");
        Ok(message_id)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
