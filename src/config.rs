//! Producer configuration
//!
//! Configuration can be loaded from JSON (inline or file) and overlaid with
//! environment variables. Environment variables cannot contain `.`, so
//! nested topic overrides use `__` as the nesting separator:
//!
//! ```text
//! EXAMPLE__PRODUCER__SKIP=false
//! EXAMPLE__TOPICS__DEFAULT=default-topic
//! EXAMPLE__TOPICS__CREATED__FOO__BAR_BAZ=foo-topic   # created("foo.bar_baz")
//! ```

use crate::error::{PubSubError, Result};
use crate::naming::{LifecycleChange, MediaTypeConvention, DEFAULT_VENDOR};
use crate::topics::{TopicTable, TopicTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Topic configuration layers
///
/// Lifecycle sections sit next to `default` and `mappings`:
///
/// ```json
/// {
///   "default": "default-topic",
///   "mappings": {"application/vnd.microcosm.pubsub.foo": "foo-topic"},
///   "created": {"foo": {"bar_baz": "topic-x"}}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic for any media type without an explicit mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Explicit media type → topic mappings
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub mappings: HashMap<String, String>,

    /// Lifecycle change name → nested resource → topic overrides
    #[serde(flatten)]
    pub lifecycle: HashMap<String, TopicTree>,
}

/// A boolean switch given either as a JSON bool or as a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Bool(bool),
    Text(String),
}

impl Switch {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Switch::Bool(value) => Ok(*value),
            Switch::Text(text) => parse_bool(text),
        }
    }
}

/// Producer-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerConfig {
    /// Skip publishing; when unset, follows `debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<Switch>,

    /// Record call-site introspection
    #[serde(default = "default_introspection")]
    pub introspection: bool,

    /// Development mode (there is typically no topic to publish to)
    #[serde(default)]
    pub debug: bool,

    /// Vendor segment of derived media types
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Lifecycle changes whose topic sections are read
    #[serde(default = "LifecycleChange::defaults")]
    pub lifecycle_changes: Vec<LifecycleChange>,

    /// Topic table layers
    #[serde(default)]
    pub topics: TopicConfig,
}

fn default_introspection() -> bool {
    true
}

fn default_vendor() -> String {
    DEFAULT_VENDOR.to_string()
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            skip: None,
            introspection: default_introspection(),
            debug: false,
            vendor: default_vendor(),
            lifecycle_changes: LifecycleChange::defaults(),
            topics: TopicConfig::default(),
        }
    }
}

impl ProducerConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PubSubError::Config(format!("Failed to parse producer config: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PubSubError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&json).map_err(|e| {
            PubSubError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Producer config loaded");
        Ok(config)
    }

    /// Build configuration from defaults overlaid with process environment
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Build configuration from defaults overlaid with the given variables
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        config.apply_vars(prefix, vars)?;
        Ok(config)
    }

    /// Overlay `{PREFIX}__...` variables onto this configuration
    pub fn apply_vars<I, K, V>(&mut self, prefix: &str, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let prefix = format!("{}__", prefix.to_uppercase());

        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(&prefix) else {
                continue;
            };
            let path: Vec<&str> = rest.split("__").collect();
            let value: String = value.into();

            match path.as_slice() {
                ["PRODUCER", "SKIP"] => self.skip = Some(Switch::Text(value)),
                ["PRODUCER", "INTROSPECTION"] => self.introspection = parse_bool(&value)?,
                ["PRODUCER", "DEBUG"] => self.debug = parse_bool(&value)?,
                ["PRODUCER", "VENDOR"] => self.vendor = value,
                ["PRODUCER", "LIFECYCLE_CHANGES"] => {
                    self.lifecycle_changes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(LifecycleChange::from)
                        .collect();
                }
                ["TOPICS", "DEFAULT"] => self.topics.default = Some(value),
                ["TOPICS", "DEFAULT", ..] => {
                    tracing::warn!(
                        key = key.as_ref(),
                        "Default topic takes no nested keys; use {}TOPICS__DEFAULT",
                        prefix
                    );
                }
                // Media types cannot be spelled in variable names
                ["TOPICS", "MAPPINGS", ..] => {
                    tracing::warn!(key = key.as_ref(), "Explicit mappings must be set in a config file");
                }
                ["TOPICS", lifecycle, resource @ ..] if !resource.is_empty() => {
                    let segments: Vec<String> =
                        resource.iter().map(|s| s.to_lowercase()).collect();
                    self.topics
                        .lifecycle
                        .entry(lifecycle.to_lowercase())
                        .or_insert_with(|| TopicTree::Nested(BTreeMap::new()))
                        .insert_path(&segments, value);
                }
                _ => {
                    tracing::debug!(key = key.as_ref(), "Ignoring unrecognized config variable");
                }
            }
        }

        Ok(())
    }

    /// Whether publishing is skipped
    ///
    /// An explicit setting wins; otherwise development mode skips.
    pub fn resolve_skip(&self) -> Result<bool> {
        match self.skip {
            Some(ref switch) => switch.as_bool(),
            None => Ok(self.debug),
        }
    }

    /// Media type naming convention for this configuration
    pub fn convention(&self) -> MediaTypeConvention {
        MediaTypeConvention::new(self.vendor.clone())
    }

    /// Build the topic table described by this configuration
    pub fn topic_table(&self) -> Result<TopicTable> {
        TopicTable::from_config(&self.topics, &self.lifecycle_changes, &self.convention())
    }
}

/// Parse a boolean flag (`y yes t true on 1` / `n no f false off 0`)
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(PubSubError::Config(format!(
            "Invalid boolean value '{}'",
            other
        ))),
    }
}
