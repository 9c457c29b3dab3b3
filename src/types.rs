//! Core message types for the producer
//!
//! Options and context use camelCase JSON serialization for wire compatibility.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Transport-assigned message identifier
pub type MessageId = String;

/// Contextual key/value metadata attached to every message of a unit of work
///
/// Keys are kept ordered so encoded messages are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueContext(BTreeMap<String, Value>);

impl OpaqueContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder-style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Overlay `other` onto this context; keys in `other` win on conflict
    pub fn merge(&mut self, other: &OpaqueContext) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Return a new context with `other` overlaid onto this one
    pub fn merged(&self, other: &OpaqueContext) -> OpaqueContext {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for OpaqueContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Supplies the producer-level ambient context for the current unit of work
///
/// Called once per message; the result is merged underneath the per-call
/// context.
pub trait ContextSource: Send + Sync {
    fn current(&self) -> OpaqueContext;
}

impl ContextSource for OpaqueContext {
    fn current(&self) -> OpaqueContext {
        self.clone()
    }
}

impl<F> ContextSource for F
where
    F: Fn() -> OpaqueContext + Send + Sync,
{
    fn current(&self) -> OpaqueContext {
        self()
    }
}

/// Call-site identity recorded by introspection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    /// Function that produced the message
    pub function: String,
    /// Module the function is defined in
    pub module: String,
}

impl Origin {
    pub fn new(function: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            module: module.into(),
        }
    }
}

/// Build an [`Origin`] for the named function in the current module
///
/// ```rust
/// let origin = microcosm_producer::origin!("create_order");
/// assert_eq!(origin.function, "create_order");
/// assert_eq!(origin.module, module_path!());
/// ```
#[macro_export]
macro_rules! origin {
    ($function:expr) => {
        $crate::types::Origin::new($function, module_path!())
    };
}

/// Per-call options for `produce`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceOptions {
    /// URI of the resource the message refers to
    ///
    /// Passed to the codec and, when introspection is enabled, resolved
    /// to a route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Per-call context, overlaid on the producer's ambient context
    #[serde(default, skip_serializing_if = "OpaqueContext::is_empty")]
    pub context: OpaqueContext,

    /// Call site producing the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,

    /// Extra keyword payload handed to the codec
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ProduceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A fully resolved, encoded message ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Media type of the message
    pub media_type: String,

    /// Encoded message body
    pub body: Bytes,

    /// Resolved destination topic
    pub topic: String,

    /// Merged context the body was encoded with
    pub context: OpaqueContext,
}
