//! NATS JetStream client: connect, provision, publish

use super::config::{NatsConfig, StorageType, StreamConfig};
use crate::error::{PubSubError, Result};
use async_nats::jetstream;
use bytes::Bytes;
use std::time::Duration;

/// Acknowledgement of a JetStream publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub stream: String,
    pub sequence: u64,
    pub duplicate: bool,
}

/// NATS JetStream client
///
/// Low-level client for publishing encoded messages via NATS.
/// Manages the connection and, when configured, the stream lifecycle.
pub struct NatsClient {
    /// NATS client connection
    client: async_nats::Client,

    /// JetStream context
    jetstream: jetstream::Context,

    /// Configuration
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and provision the configured stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| PubSubError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        if let Some(ref stream) = config.stream {
            ensure_stream(&jetstream, stream).await?;
        }

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Publish a body to a subject and wait for the JetStream ack
    pub async fn publish(&self, subject: &str, body: Bytes) -> Result<PublishReceipt> {
        let ack_fut = self
            .jetstream
            .publish(subject.to_string(), body)
            .await
            .map_err(|e| PubSubError::Publish {
                topic: subject.to_string(),
                reason: e.to_string(),
            })?;

        let ack = if let Some(timeout_secs) = self.config.publish_timeout_secs {
            tokio::time::timeout(Duration::from_secs(timeout_secs), ack_fut)
                .await
                .map_err(|_| {
                    PubSubError::Timeout(format!(
                        "Publish ack timed out after {}s for subject '{}'",
                        timeout_secs, subject
                    ))
                })?
        } else {
            ack_fut.await
        }
        .map_err(|e| PubSubError::Publish {
            topic: subject.to_string(),
            reason: format!("ack failed: {}", e),
        })?;

        Ok(PublishReceipt {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }

    /// Whether the connection is currently established
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Get the underlying NATS client
    pub fn nats_client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream_context(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the JetStream stream exists with the configured limits
async fn ensure_stream(js: &jetstream::Context, config: &StreamConfig) -> Result<()> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.name.clone(),
        subjects: config.subjects.clone(),
        storage,
        max_messages: config.max_messages,
        max_bytes: config.max_bytes,
        max_age: Duration::from_secs(config.max_age_secs),
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    js.get_or_create_stream(stream_config).await.map_err(|e| {
        PubSubError::Transport(format!(
            "Failed to create/get stream '{}': {}",
            config.name, e
        ))
    })?;

    tracing::info!(
        stream = %config.name,
        subjects = ?config.subjects,
        "JetStream stream ready"
    );

    Ok(())
}
