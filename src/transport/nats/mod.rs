//! NATS JetStream transport
//!
//! Implements `Transport` by publishing each encoded body to the resolved
//! topic as a JetStream subject. Message ids are `<stream>:<sequence>`.

mod client;
mod config;

pub use client::{NatsClient, PublishReceipt};
pub use config::{NatsConfig, StorageType, StreamConfig};

use crate::error::Result;
use crate::transport::Transport;
use crate::types::MessageId;
use async_trait::async_trait;
use bytes::Bytes;

/// NATS JetStream transport
///
/// Wraps `NatsClient` and implements the `Transport` trait.
pub struct NatsTransport {
    client: NatsClient,
}

impl NatsTransport {
    /// Connect to NATS and provision the configured stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying NATS client for advanced usage
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, topic: &str, body: Bytes) -> Result<MessageId> {
        let receipt = self.client.publish(topic, body).await?;
        if receipt.duplicate {
            tracing::debug!(topic, sequence = receipt.sequence, "JetStream reported duplicate");
        }
        Ok(format!("{}:{}", receipt.stream, receipt.sequence))
    }

    fn name(&self) -> &str {
        "nats"
    }

    async fn health(&self) -> Result<bool> {
        Ok(self.client.is_connected())
    }
}
