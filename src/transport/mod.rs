//! Transport trait: the publishing seam for pub/sub backends
//!
//! All backends (NATS, in-memory, SNS, Kafka, etc.) implement `Transport`
//! to publish an encoded body to a topic. The producer never retries and
//! never interprets transport errors; they reach the caller unchanged.

use crate::error::Result;
use crate::types::MessageId;
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
pub mod nats;

/// Core trait for pub/sub transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an encoded body to a topic, returning the transport-assigned id
    async fn publish(&self, topic: &str, body: Bytes) -> Result<MessageId>;

    /// Transport name (e.g., "nats", "memory")
    fn name(&self) -> &str;

    /// Health check; returns true if the transport can publish
    ///
    /// Default implementation assumes a connectionless transport.
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }
}
