//! Message codecs: encode payloads into message bodies by media type
//!
//! The producer depends only on the `CodecRegistry` and `MessageCodec`
//! traits. `MemoryCodecRegistry` and `JsonCodec` are the reference
//! implementations used by default and in tests.

use crate::error::{PubSubError, Result};
use crate::types::OpaqueContext;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Metadata handed to a codec alongside the payload
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Merged ambient and per-call context
    pub context: &'a OpaqueContext,

    /// URI of the resource the message refers to
    pub uri: Option<&'a str>,

    /// Extra keyword payload
    pub extra: &'a Map<String, Value>,
}

/// Encodes payloads of one or more media types
pub trait MessageCodec: Send + Sync {
    fn encode(&self, media_type: &str, payload: &Value, ctx: &EncodeContext<'_>) -> Result<Bytes>;
}

/// Looks up the codec for a media type
pub trait CodecRegistry: Send + Sync {
    /// Find the codec for a media type, failing with `CodecNotFound`
    fn find(&self, media_type: &str) -> Result<Arc<dyn MessageCodec>>;
}

/// JSON codec producing camelCase envelopes
///
/// Output shape:
///
/// ```json
/// {"mediaType": "...", "opaqueData": {...}, "uri": "...", "<payload fields>": ...}
/// ```
///
/// The payload must be a JSON object (or null). Extra keyword payload is
/// written after the payload and wins on conflicting keys.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    required_fields: Vec<String>,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require top-level fields to be present in the encoded message
    pub fn with_required_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl MessageCodec for JsonCodec {
    fn encode(&self, media_type: &str, payload: &Value, ctx: &EncodeContext<'_>) -> Result<Bytes> {
        let mut message = Map::new();
        message.insert("mediaType".to_string(), Value::String(media_type.to_string()));
        message.insert("opaqueData".to_string(), ctx.context.to_json());
        if let Some(uri) = ctx.uri {
            message.insert("uri".to_string(), Value::String(uri.to_string()));
        }

        match payload {
            Value::Object(fields) => {
                message.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Value::Null => {}
            _ => {
                return Err(PubSubError::Encode {
                    media_type: media_type.to_string(),
                    reason: "Payload must be a JSON object".to_string(),
                });
            }
        }
        message.extend(ctx.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        for field in &self.required_fields {
            if !message.contains_key(field) {
                return Err(PubSubError::Encode {
                    media_type: media_type.to_string(),
                    reason: format!("Missing required field '{}'", field),
                });
            }
        }

        Ok(Bytes::from(serde_json::to_vec(&Value::Object(message))?))
    }
}

/// In-memory codec registry
///
/// Stores codecs in a `HashMap` protected by `RwLock`, with an optional
/// default codec for unregistered media types.
#[derive(Default)]
pub struct MemoryCodecRegistry {
    /// media type → codec
    codecs: RwLock<HashMap<String, Arc<dyn MessageCodec>>>,

    default: RwLock<Option<Arc<dyn MessageCodec>>>,
}

impl MemoryCodecRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that encodes every media type with `codec`
    pub fn with_default(codec: impl MessageCodec + 'static) -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
            default: RwLock::new(Some(Arc::new(codec))),
        }
    }

    /// Registry encoding every media type with a plain [`JsonCodec`]
    pub fn json() -> Self {
        Self::with_default(JsonCodec::new())
    }

    /// Register a codec for a media type
    pub fn register(&self, media_type: impl Into<String>, codec: impl MessageCodec + 'static) -> Result<()> {
        let media_type = media_type.into();
        if media_type.is_empty() {
            return Err(PubSubError::Config("Media type cannot be empty".to_string()));
        }

        let mut codecs = self.codecs.write().map_err(|e| {
            PubSubError::Config(format!("Codec registry lock poisoned: {}", e))
        })?;
        codecs.insert(media_type, Arc::new(codec));
        Ok(())
    }

    /// Set the codec used for unregistered media types
    pub fn set_default(&self, codec: impl MessageCodec + 'static) -> Result<()> {
        let mut default = self.default.write().map_err(|e| {
            PubSubError::Config(format!("Codec registry lock poisoned: {}", e))
        })?;
        *default = Some(Arc::new(codec));
        Ok(())
    }

    /// List explicitly registered media types
    pub fn list_types(&self) -> Result<Vec<String>> {
        let codecs = self.codecs.read().map_err(|e| {
            PubSubError::Config(format!("Codec registry lock poisoned: {}", e))
        })?;
        let mut types: Vec<String> = codecs.keys().cloned().collect();
        types.sort();
        Ok(types)
    }
}

impl CodecRegistry for MemoryCodecRegistry {
    fn find(&self, media_type: &str) -> Result<Arc<dyn MessageCodec>> {
        let codecs = self.codecs.read().map_err(|e| {
            PubSubError::Config(format!("Codec registry lock poisoned: {}", e))
        })?;
        if let Some(codec) = codecs.get(media_type) {
            return Ok(Arc::clone(codec));
        }

        let default = self.default.read().map_err(|e| {
            PubSubError::Config(format!("Codec registry lock poisoned: {}", e))
        })?;
        default.clone().ok_or_else(|| PubSubError::CodecNotFound {
            media_type: media_type.to_string(),
        })
    }
}
