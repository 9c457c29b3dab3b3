//! # microcosm-producer
//!
//! Produce media-typed events to topic-based pub/sub transports.
//!
//! ## Overview
//!
//! A `Producer` resolves the topic for a media type, encodes the payload
//! with contextual metadata, and publishes it through a pluggable
//! transport (NATS, in-memory, etc.). Messages can also be deferred until a
//! unit of work succeeds, optionally as a single batch message, and every
//! call site is counted for operational introspection.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use microcosm_producer::{
//!     MemoryCodecRegistry, MemoryTransport, MessageProducer, Producer, TopicTable,
//! };
//!
//! # async fn example() -> microcosm_producer::Result<()> {
//! let producer = Producer::builder(
//!     Arc::new(MemoryTransport::new()),
//!     Arc::new(MemoryCodecRegistry::json()),
//!     Arc::new(TopicTable::builder().default_topic("events").build()),
//! )
//! .build();
//!
//! let message_id = producer
//!     .produce("application/vnd.microcosm.pubsub.foo", serde_json::json!({"bar": "baz"}))
//!     .await?;
//!
//! println!("Published: {:?}", message_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **memory**: records messages in memory, for testing and local use
//! - **nats**: NATS JetStream
//!
//! ## Architecture
//!
//! - **Transport** trait: publishing seam all backends implement
//! - **TopicResolver** / **TopicTable**: layered media type → topic mapping
//! - **CodecRegistry** trait: media type → message encoder
//! - **Producer**: resolve, encode, publish, introspect
//! - **DeferredScope**: buffer messages until a unit of work commits
//! - **ScopedProducer**: per-task deferral behind one long-lived handle

pub mod codec;
pub mod config;
pub mod deferred;
pub mod error;
pub mod introspection;
pub mod naming;
pub mod producer;
pub mod route;
pub mod substitution;
pub mod topics;
pub mod transport;
pub mod types;

// Re-export core types
pub use codec::{CodecRegistry, EncodeContext, JsonCodec, MemoryCodecRegistry, MessageCodec};
pub use config::{parse_bool, ProducerConfig, Switch, TopicConfig};
pub use deferred::{BatchMessage, DeferMode, DeferredScope, MessageBatch};
pub use error::{PubSubError, Result};
pub use introspection::{IntrospectionAggregator, PublishInfo, PublishKey};
pub use naming::{make_media_type, LifecycleChange, MediaTypeConvention, BATCH_MEDIA_TYPE};
pub use producer::{MessageProducer, Producer, ProducerBuilder, UNKNOWN_ORIGIN};
pub use route::{RouteResolver, RouteTable};
pub use substitution::{deferred, deferred_batch, with_scope, ScopedProducer};
pub use topics::{iter_topic_mappings, TopicResolver, TopicTable, TopicTableBuilder, TopicTree};
pub use transport::Transport;
pub use types::{ContextSource, Envelope, MessageId, OpaqueContext, Origin, ProduceOptions};

// Re-export transports for convenience
pub use transport::memory::{MemoryTransport, PublishedMessage};
pub use transport::nats::{NatsClient, NatsConfig, NatsTransport, StorageType, StreamConfig};
