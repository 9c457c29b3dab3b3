//! Message producer: resolve, encode, publish
//!
//! `Producer` turns a media type and payload into an [`Envelope`] and hands
//! it to the configured [`Transport`]. The `MessageProducer` trait is the
//! seam units of work depend on, so that a deferred scope can stand in for
//! the real producer.

use crate::codec::{CodecRegistry, EncodeContext};
use crate::config::ProducerConfig;
use crate::error::Result;
use crate::introspection::{IntrospectionAggregator, PublishInfo, PublishKey};
use crate::route::RouteResolver;
use crate::topics::TopicResolver;
use crate::transport::Transport;
use crate::types::{ContextSource, Envelope, MessageId, ProduceOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Function/module recorded when a call does not name its origin
pub const UNKNOWN_ORIGIN: &str = "<unknown>";

/// Method used to match origin URIs against routes
const ROUTE_METHOD: &str = "GET";

/// Anything messages can be produced through
///
/// Implemented by [`Producer`] (publishes immediately) and by
/// [`DeferredScope`](crate::deferred::DeferredScope) (buffers until commit).
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Produce a message with per-call options
    ///
    /// Returns the transport-assigned id, or `None` when no message was
    /// published (skip mode, or buffered by a deferred scope).
    async fn produce_with_options(
        &self,
        media_type: &str,
        payload: Value,
        opts: &ProduceOptions,
    ) -> Result<Option<MessageId>>;

    /// Produce a message with default options
    async fn produce(&self, media_type: &str, payload: Value) -> Result<Option<MessageId>> {
        self.produce_with_options(media_type, payload, &ProduceOptions::default())
            .await
    }
}

/// Produces messages to topics of a pub/sub transport
pub struct Producer {
    transport: Arc<dyn Transport>,
    codecs: Arc<dyn CodecRegistry>,
    topics: Arc<dyn TopicResolver>,
    context_source: Option<Arc<dyn ContextSource>>,
    route_resolver: Option<Arc<dyn RouteResolver>>,
    skip: bool,
    introspection: bool,
    publish_info: IntrospectionAggregator,
}

impl Producer {
    /// Start building a producer from its required collaborators
    pub fn builder(
        transport: Arc<dyn Transport>,
        codecs: Arc<dyn CodecRegistry>,
        topics: Arc<dyn TopicResolver>,
    ) -> ProducerBuilder {
        ProducerBuilder {
            transport,
            codecs,
            topics,
            context_source: None,
            route_resolver: None,
            skip: false,
            introspection: true,
        }
    }

    /// Start building a producer whose topics and switches come from `config`
    pub fn builder_from_config(
        config: &ProducerConfig,
        transport: Arc<dyn Transport>,
        codecs: Arc<dyn CodecRegistry>,
    ) -> Result<ProducerBuilder> {
        let topics = config.topic_table()?;
        Ok(Self::builder(transport, codecs, Arc::new(topics))
            .skip(config.resolve_skip()?)
            .introspection(config.introspection))
    }

    /// Whether publishing is skipped
    pub fn is_skip(&self) -> bool {
        self.skip
    }

    /// Whether call sites are recorded
    pub fn introspection_enabled(&self) -> bool {
        self.introspection
    }

    /// The topic resolver in use
    pub fn topics(&self) -> &dyn TopicResolver {
        self.topics.as_ref()
    }

    /// Name of the underlying transport
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Snapshot of every introspection record
    pub fn get_publish_info(&self) -> Vec<PublishInfo> {
        self.publish_info.snapshot()
    }

    fn introspect(&self, media_type: &str, opts: &ProduceOptions) {
        let (call_function, call_module) = match opts.origin {
            Some(ref origin) => (origin.function.clone(), origin.module.clone()),
            None => (UNKNOWN_ORIGIN.to_string(), UNKNOWN_ORIGIN.to_string()),
        };
        let uri = opts.uri.as_deref().filter(|uri| !uri.is_empty());
        let route = match (uri, self.route_resolver.as_ref()) {
            (Some(uri), Some(resolver)) => resolver.resolve_route(uri, ROUTE_METHOD),
            _ => None,
        };

        self.publish_info.record(PublishKey {
            media_type: media_type.to_string(),
            route,
            call_function,
            call_module,
        });
    }

    /// Resolve the topic and encode a message without publishing it
    ///
    /// Per-call context is overlaid on the ambient context, so per-call
    /// keys win on conflict.
    pub fn create_envelope(
        &self,
        media_type: &str,
        payload: &Value,
        opts: &ProduceOptions,
    ) -> Result<Envelope> {
        let mut context = self
            .context_source
            .as_ref()
            .map(|source| source.current())
            .unwrap_or_default();
        context.merge(&opts.context);

        let topic = self.topics.resolve(media_type)?;
        let body = self.codecs.find(media_type)?.encode(
            media_type,
            payload,
            &EncodeContext {
                context: &context,
                uri: opts.uri.as_deref(),
                extra: &opts.extra,
            },
        )?;

        Ok(Envelope {
            media_type: media_type.to_string(),
            body,
            topic,
            context,
        })
    }

    /// Hand an envelope to the transport
    pub async fn publish_envelope(&self, envelope: &Envelope) -> Result<MessageId> {
        tracing::debug!(
            media_type = %envelope.media_type,
            topic = %envelope.topic,
            context = %envelope.context.to_json(),
            "Publishing message"
        );

        let start = Instant::now();
        let message_id = self
            .transport
            .publish(&envelope.topic, envelope.body.clone())
            .await?;

        tracing::info!(
            media_type = %envelope.media_type,
            topic = %envelope.topic,
            message_id = %message_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            context = %envelope.context.to_json(),
            "Published message"
        );

        Ok(message_id)
    }
}

#[async_trait]
impl MessageProducer for Producer {
    async fn produce_with_options(
        &self,
        media_type: &str,
        payload: Value,
        opts: &ProduceOptions,
    ) -> Result<Option<MessageId>> {
        // Call sites are recorded even when nothing is published
        if self.introspection {
            self.introspect(media_type, opts);
        }

        if self.skip {
            tracing::debug!(media_type, "Skipping publish");
            return Ok(None);
        }

        let envelope = self.create_envelope(media_type, &payload, opts)?;
        self.publish_envelope(&envelope).await.map(Some)
    }
}

/// Builder for [`Producer`]
pub struct ProducerBuilder {
    transport: Arc<dyn Transport>,
    codecs: Arc<dyn CodecRegistry>,
    topics: Arc<dyn TopicResolver>,
    context_source: Option<Arc<dyn ContextSource>>,
    route_resolver: Option<Arc<dyn RouteResolver>>,
    skip: bool,
    introspection: bool,
}

impl ProducerBuilder {
    /// Skip publishing (e.g. no downstream topic in this environment)
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Record call-site introspection (enabled by default)
    pub fn introspection(mut self, enabled: bool) -> Self {
        self.introspection = enabled;
        self
    }

    /// Source of the ambient context merged into every message
    pub fn context_source(mut self, source: impl ContextSource + 'static) -> Self {
        self.context_source = Some(Arc::new(source));
        self
    }

    /// Resolver enriching introspection records with routes
    pub fn route_resolver(mut self, resolver: impl RouteResolver + 'static) -> Self {
        self.route_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> Producer {
        Producer {
            transport: self.transport,
            codecs: self.codecs,
            topics: self.topics,
            context_source: self.context_source,
            route_resolver: self.route_resolver,
            skip: self.skip,
            introspection: self.introspection,
            publish_info: IntrospectionAggregator::new(),
        }
    }
}
