//! Topic resolution: map media types to destination topics
//!
//! A `TopicTable` is built once from three layers of configuration, in
//! increasing precedence:
//!
//! 1. an optional default topic for any unmapped media type (never applied
//!    to [`BATCH_MEDIA_TYPE`]);
//! 2. explicit media type → topic mappings;
//! 3. per-lifecycle, per-resource overrides whose nested keys collapse into
//!    dotted resource names (`{bar: {foo: "baz"}}` → `bar.foo`).

use crate::config::TopicConfig;
use crate::error::{PubSubError, Result};
use crate::naming::{LifecycleChange, MediaTypeConvention, BATCH_MEDIA_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Resolves the destination topic of a media type
pub trait TopicResolver: Send + Sync {
    /// Resolve a topic, failing with `TopicNotConfigured` when none applies
    fn resolve(&self, media_type: &str) -> Result<String>;
}

/// Nested topic configuration: either a topic or more nesting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicTree {
    Topic(String),
    Nested(BTreeMap<String, TopicTree>),
}

impl TopicTree {
    /// Insert a topic at a path of nested keys, replacing any leaf on the way
    pub fn insert_path(&mut self, path: &[String], topic: impl Into<String>) {
        let Some((head, rest)) = path.split_first() else {
            *self = TopicTree::Topic(topic.into());
            return;
        };
        if let TopicTree::Topic(_) = self {
            *self = TopicTree::Nested(BTreeMap::new());
        }
        if let TopicTree::Nested(children) = self {
            children
                .entry(head.clone())
                .or_insert_with(|| TopicTree::Nested(BTreeMap::new()))
                .insert_path(rest, topic);
        }
    }
}

/// Flatten a resource tree into `(dotted resource name, topic)` pairs
///
/// Top-level string values map their own key; nested maps join their keys
/// with `.`.
pub fn iter_topic_mappings(tree: &BTreeMap<String, TopicTree>) -> Vec<(String, String)> {
    let mut mappings = Vec::new();
    for (key, value) in tree {
        collapse_into(key, value, &mut mappings);
    }
    mappings
}

fn collapse_into(prefix: &str, tree: &TopicTree, out: &mut Vec<(String, String)>) {
    match tree {
        TopicTree::Topic(topic) => out.push((prefix.to_string(), topic.clone())),
        TopicTree::Nested(children) => {
            for (key, child) in children {
                collapse_into(&format!("{}.{}", prefix, key), child, out);
            }
        }
    }
}

/// Read-only media type → topic table
#[derive(Debug, Clone, Default)]
pub struct TopicTable {
    topics: HashMap<String, String>,
    default: Option<String>,
    excluded: HashSet<String>,
}

impl TopicTable {
    /// Start building a table programmatically
    pub fn builder() -> TopicTableBuilder {
        TopicTableBuilder::default()
    }

    /// Build the table from configuration
    ///
    /// `lifecycle_changes` names the lifecycle sections to read from
    /// `config`; sections for other names are ignored.
    pub fn from_config(
        config: &TopicConfig,
        lifecycle_changes: &[LifecycleChange],
        convention: &MediaTypeConvention,
    ) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(ref default) = config.default {
            builder = builder.default_topic(default.clone());
        }

        for (media_type, topic) in &config.mappings {
            builder = builder.topic(media_type.clone(), topic.clone());
        }

        for lifecycle in lifecycle_changes {
            let Some(section) = config.lifecycle.get(lifecycle.as_str()) else {
                continue;
            };
            let resources = match section {
                TopicTree::Nested(resources) => resources,
                TopicTree::Topic(topic) => {
                    return Err(PubSubError::Config(format!(
                        "Expected resource mappings under '{}', found topic '{}'",
                        lifecycle, topic
                    )));
                }
            };
            for (resource, topic) in iter_topic_mappings(resources) {
                builder = builder.topic(convention.media_type(&resource, lifecycle), topic);
            }
        }

        for name in config.lifecycle.keys() {
            if !lifecycle_changes.iter().any(|l| l.as_str() == name) {
                tracing::warn!(
                    lifecycle = %name,
                    "Ignoring topic overrides for unknown lifecycle change"
                );
            }
        }

        let table = builder.build();
        tracing::debug!(
            explicit = table.topics.len(),
            default = ?table.default,
            "Topic table built"
        );
        Ok(table)
    }

    /// The default topic, if any
    pub fn default_topic(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Explicitly mapped media types and their topics
    pub fn explicit(&self) -> &HashMap<String, String> {
        &self.topics
    }

    /// Number of explicit mappings
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl TopicResolver for TopicTable {
    fn resolve(&self, media_type: &str) -> Result<String> {
        if let Some(topic) = self.topics.get(media_type) {
            return Ok(topic.clone());
        }
        match self.default {
            Some(ref default) if !self.excluded.contains(media_type) => Ok(default.clone()),
            _ => Err(PubSubError::TopicNotConfigured {
                media_type: media_type.to_string(),
            }),
        }
    }
}

/// Builder for [`TopicTable`]; later calls override earlier ones
#[derive(Debug, Default)]
pub struct TopicTableBuilder {
    table: TopicTable,
}

impl TopicTableBuilder {
    /// Fall back to `topic` for unmapped media types, except the batch type
    pub fn default_topic(mut self, topic: impl Into<String>) -> Self {
        self.table.default = Some(topic.into());
        self.table.excluded.insert(BATCH_MEDIA_TYPE.to_string());
        self
    }

    /// Map a media type to a topic
    pub fn topic(mut self, media_type: impl Into<String>, topic: impl Into<String>) -> Self {
        self.table.topics.insert(media_type.into(), topic.into());
        self
    }

    /// Never apply the default topic to this media type
    pub fn exclude_from_default(mut self, media_type: impl Into<String>) -> Self {
        self.table.excluded.insert(media_type.into());
        self
    }

    pub fn build(self) -> TopicTable {
        self.table
    }
}
