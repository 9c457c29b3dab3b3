//! Deferred production: buffer messages until a unit of work succeeds
//!
//! A `DeferredScope` resolves topics and encodes messages as soon as they
//! are produced, so configuration errors surface at the call site, but
//! holds the envelopes until [`DeferredScope::commit`]. Dropping a scope
//! without committing (including when its enclosing future is cancelled)
//! discards every buffered message.
//!
//! In [`DeferMode::Batch`] the buffer is committed as one synthetic message
//! of type [`BATCH_MEDIA_TYPE`] carrying every envelope in order.

use crate::error::{PubSubError, Result};
use crate::naming::BATCH_MEDIA_TYPE;
use crate::producer::{MessageProducer, Producer};
use crate::types::{Envelope, MessageId, OpaqueContext, Origin, ProduceOptions};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// How a deferred scope publishes its buffer on commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeferMode {
    /// One publish per buffered envelope, in insertion order
    #[default]
    Individual,
    /// A single batch message containing every envelope
    Batch,
}

/// One envelope inside a batch message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessage {
    pub media_type: String,

    /// Encoded body, base64
    pub message: String,

    pub topic: String,

    pub opaque_data: OpaqueContext,
}

impl BatchMessage {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            media_type: envelope.media_type.clone(),
            message: BASE64.encode(&envelope.body),
            topic: envelope.topic.clone(),
            opaque_data: envelope.context.clone(),
        }
    }

    /// Recover the envelope this entry was built from
    pub fn into_envelope(self) -> Result<Envelope> {
        let body = BASE64.decode(&self.message).map_err(|e| PubSubError::Encode {
            media_type: self.media_type.clone(),
            reason: format!("Invalid base64 message body: {}", e),
        })?;
        Ok(Envelope {
            media_type: self.media_type,
            body: Bytes::from(body),
            topic: self.topic,
            context: self.opaque_data,
        })
    }
}

/// Payload of a [`BATCH_MEDIA_TYPE`] message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub messages: Vec<BatchMessage>,
}

impl MessageBatch {
    pub fn from_envelopes(envelopes: &[Envelope]) -> Self {
        Self {
            messages: envelopes.iter().map(BatchMessage::from_envelope).collect(),
        }
    }
}

/// Buffers produced messages until committed
///
/// Not `Clone`: a buffer belongs to exactly one unit of work.
pub struct DeferredScope {
    producer: Arc<Producer>,
    mode: DeferMode,
    buffer: Mutex<Vec<Envelope>>,
}

impl DeferredScope {
    /// Scope that publishes each message individually on commit
    pub fn new(producer: Arc<Producer>) -> Self {
        Self::with_mode(producer, DeferMode::Individual)
    }

    /// Scope that publishes one batch message on commit
    pub fn batch(producer: Arc<Producer>) -> Self {
        Self::with_mode(producer, DeferMode::Batch)
    }

    pub fn with_mode(producer: Arc<Producer>, mode: DeferMode) -> Self {
        Self {
            producer,
            mode,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> DeferMode {
        self.mode
    }

    /// The producer messages are flushed through
    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Envelope>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of buffered envelopes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the buffered envelopes, in insertion order
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.lock().clone()
    }

    fn take_buffer(&mut self) -> Vec<Envelope> {
        let buffer = self
            .buffer
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(buffer)
    }

    /// Publish the buffer and close the scope
    ///
    /// Returns the ids of the published messages: one per envelope in
    /// individual mode, at most one in batch mode. Individual publishing
    /// stops at the first transport error, which is returned unchanged.
    pub async fn commit(mut self) -> Result<Vec<MessageId>> {
        let envelopes = self.take_buffer();
        match self.mode {
            DeferMode::Individual => self.flush_individual(envelopes).await,
            DeferMode::Batch => self.flush_batch(envelopes).await,
        }
    }

    async fn flush_individual(&self, envelopes: Vec<Envelope>) -> Result<Vec<MessageId>> {
        tracing::debug!(count = envelopes.len(), "Flushing deferred messages");

        let total = envelopes.len();
        let mut message_ids = Vec::with_capacity(total);
        for envelope in &envelopes {
            match self.producer.publish_envelope(envelope).await {
                Ok(message_id) => message_ids.push(message_id),
                Err(e) => {
                    tracing::warn!(
                        media_type = %envelope.media_type,
                        published = message_ids.len(),
                        total,
                        error = %e,
                        "Deferred flush aborted"
                    );
                    return Err(e);
                }
            }
        }
        Ok(message_ids)
    }

    async fn flush_batch(&self, envelopes: Vec<Envelope>) -> Result<Vec<MessageId>> {
        if envelopes.is_empty() {
            tracing::debug!("No deferred messages to batch");
            return Ok(Vec::new());
        }

        tracing::debug!(count = envelopes.len(), "Flushing deferred messages as batch");
        let payload = serde_json::to_value(MessageBatch::from_envelopes(&envelopes))?;
        let opts = ProduceOptions::new().with_origin(Origin::new("commit", module_path!()));

        let message_id = self
            .producer
            .produce_with_options(BATCH_MEDIA_TYPE, payload, &opts)
            .await?;
        Ok(message_id.into_iter().collect())
    }

    /// Drop the buffer without publishing and close the scope
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for DeferredScope {
    fn drop(&mut self) {
        let discarded = self.take_buffer().len();
        if discarded > 0 {
            tracing::debug!(count = discarded, "Discarding deferred messages");
        }
    }
}

#[async_trait]
impl MessageProducer for DeferredScope {
    async fn produce_with_options(
        &self,
        media_type: &str,
        payload: Value,
        opts: &ProduceOptions,
    ) -> Result<Option<MessageId>> {
        if self.producer.is_skip() {
            return Ok(None);
        }

        let envelope = self.producer.create_envelope(media_type, &payload, opts)?;
        let buffered = {
            let mut buffer = self.lock();
            buffer.push(envelope);
            buffer.len()
        };
        tracing::debug!(media_type, buffered, "Deferred message");
        Ok(None)
    }
}

impl Producer {
    /// Open a deferred scope over this producer
    pub fn defer(self: &Arc<Self>) -> DeferredScope {
        DeferredScope::new(Arc::clone(self))
    }

    /// Open a batching deferred scope over this producer
    pub fn defer_batch(self: &Arc<Self>) -> DeferredScope {
        DeferredScope::batch(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryCodecRegistry;
    use crate::topics::TopicTable;
    use crate::transport::memory::MemoryTransport;

    const FOO_MEDIA_TYPE: &str = "application/vnd.microcosm.pubsub.foo";
    const FOO_TOPIC: &str = "foo-topic";
    const BATCH_TOPIC: &str = "batch-topic";

    fn test_producer(transport: &Arc<MemoryTransport>, skip: bool) -> Arc<Producer> {
        let topics = TopicTable::builder()
            .default_topic(FOO_TOPIC)
            .topic(BATCH_MEDIA_TYPE, BATCH_TOPIC)
            .build();
        Arc::new(
            Producer::builder(
                transport.clone(),
                Arc::new(MemoryCodecRegistry::json()),
                Arc::new(topics),
            )
            .skip(skip)
            .build(),
        )
    }

    #[tokio::test]
    async fn test_deferred_production() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, false);

        let scope = producer.defer();
        for i in 0..3 {
            let result = scope
                .produce(FOO_MEDIA_TYPE, serde_json::json!({"i": i}))
                .await
                .unwrap();
            assert!(result.is_none());
        }
        assert_eq!(scope.len(), 3);
        assert_eq!(transport.count().await, 0);

        let ids = scope.commit().await.unwrap();
        assert_eq!(ids.len(), 3);

        let published = transport.published().await;
        assert_eq!(published.len(), 3);
        for (i, message) in published.iter().enumerate() {
            assert_eq!(message.json().unwrap()["i"], i);
            assert_eq!(message.message_id, ids[i]);
        }
    }

    #[tokio::test]
    async fn test_discard_publishes_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, false);

        let scope = producer.defer();
        scope.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await.unwrap();
        scope.discard();

        let scope = producer.defer_batch();
        scope.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await.unwrap();
        drop(scope);

        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_eager_topic_resolution() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = Arc::new(
            Producer::builder(
                transport.clone(),
                Arc::new(MemoryCodecRegistry::json()),
                Arc::new(TopicTable::default()),
            )
            .build(),
        );

        let scope = producer.defer();
        let err = scope
            .produce(FOO_MEDIA_TYPE, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_topic_not_configured());
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_skip_mode_buffers_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, true);

        let scope = producer.defer();
        scope.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await.unwrap();
        assert!(scope.is_empty());
        assert!(scope.commit().await.unwrap().is_empty());
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_flush_stops_at_first_transport_error() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, false);

        let scope = producer.defer();
        for i in 0..3 {
            scope.produce(FOO_MEDIA_TYPE, serde_json::json!({"i": i})).await.unwrap();
        }
        transport.fail_after(1, "unavailable").await;

        let err = scope.commit().await.unwrap_err();
        assert!(matches!(err, PubSubError::Publish { .. }));
        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].json().unwrap()["i"], 0);
    }

    #[tokio::test]
    async fn test_batch_commit_single_message() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, false);

        let scope = producer.defer_batch();
        assert_eq!(scope.mode(), DeferMode::Batch);
        for i in 0..3 {
            scope
                .produce_with_options(
                    FOO_MEDIA_TYPE,
                    serde_json::json!({"i": i}),
                    &ProduceOptions::new().with_context("X-Request-Id", "req-1"),
                )
                .await
                .unwrap();
        }

        let ids = scope.commit().await.unwrap();
        assert_eq!(ids.len(), 1);

        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, BATCH_TOPIC);

        let message = published[0].json().unwrap();
        assert_eq!(message["mediaType"], BATCH_MEDIA_TYPE);
        let batch: MessageBatch =
            serde_json::from_value(serde_json::json!({"messages": message["messages"]})).unwrap();
        assert_eq!(batch.messages.len(), 3);
        for (i, entry) in batch.messages.into_iter().enumerate() {
            assert_eq!(entry.media_type, FOO_MEDIA_TYPE);
            assert_eq!(entry.topic, FOO_TOPIC);
            assert_eq!(entry.opaque_data.get("X-Request-Id").unwrap(), "req-1");
            let envelope = entry.into_envelope().unwrap();
            let body: Value = serde_json::from_slice(&envelope.body).unwrap();
            assert_eq!(body["i"], i);
        }

        // The batch itself goes through the full produce path
        let info = producer.get_publish_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].media_type, BATCH_MEDIA_TYPE);
        assert_eq!(info[0].call_function, "commit");
    }

    #[tokio::test]
    async fn test_batch_empty_buffer_publishes_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport, false);

        let ids = producer.defer_batch().commit().await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_batch_without_batch_topic_fails() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = Arc::new(
            Producer::builder(
                transport.clone(),
                Arc::new(MemoryCodecRegistry::json()),
                Arc::new(TopicTable::builder().default_topic(FOO_TOPIC).build()),
            )
            .build(),
        );

        let scope = producer.defer_batch();
        scope.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await.unwrap();
        let err = scope.commit().await.unwrap_err();
        assert!(err.is_topic_not_configured());
        assert_eq!(transport.count().await, 0);
    }

    #[test]
    fn test_batch_message_invalid_base64() {
        let entry = BatchMessage {
            media_type: FOO_MEDIA_TYPE.to_string(),
            message: "not base64!".to_string(),
            topic: FOO_TOPIC.to_string(),
            opaque_data: OpaqueContext::new(),
        };
        assert!(matches!(entry.into_envelope(), Err(PubSubError::Encode { .. })));
    }
}
