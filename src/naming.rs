//! Media type naming conventions
//!
//! Resource lifecycle events follow the dot-separated convention
//! `application/vnd.<vendor>.pubsub._.<lifecycle>.<resource>`
//! (e.g., `application/vnd.microcosm.pubsub._.created.foo.bar_baz`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved media type of the synthetic batch envelope
///
/// Never inherits the default topic: a batch is only published when a
/// topic is configured for it explicitly.
pub const BATCH_MEDIA_TYPE: &str = "application/vnd.microcosm.pubsub._.batch";

/// Default vendor segment used by [`MediaTypeConvention::default`]
pub const DEFAULT_VENDOR: &str = "microcosm";

/// A resource lifecycle change (e.g., "created", "deleted")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleChange {
    Created,
    Deleted,
    Changed,
    Replaced,
    Updated,
    /// Application-defined lifecycle change
    Custom(String),
}

impl LifecycleChange {
    /// The built-in lifecycle changes, in a stable order
    pub fn defaults() -> Vec<LifecycleChange> {
        vec![
            Self::Created,
            Self::Deleted,
            Self::Changed,
            Self::Replaced,
            Self::Updated,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Changed => "changed",
            Self::Replaced => "replaced",
            Self::Updated => "updated",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for LifecycleChange {
    fn from(name: &str) -> Self {
        match name {
            "created" => Self::Created,
            "deleted" => Self::Deleted,
            "changed" => Self::Changed,
            "replaced" => Self::Replaced,
            "updated" => Self::Updated,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for LifecycleChange {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<LifecycleChange> for String {
    fn from(change: LifecycleChange) -> Self {
        change.as_str().to_string()
    }
}

impl fmt::Display for LifecycleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives media types from `(resource, lifecycle change)` pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypeConvention {
    vendor: String,
}

impl MediaTypeConvention {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Build the media type for a resource lifecycle change
    pub fn media_type(&self, resource: &str, lifecycle: &LifecycleChange) -> String {
        format!(
            "application/vnd.{}.pubsub._.{}.{}",
            self.vendor,
            lifecycle.as_str(),
            resource
        )
    }
}

impl Default for MediaTypeConvention {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR)
    }
}

/// Build a media type with the default vendor
pub fn make_media_type(resource: &str, lifecycle: &LifecycleChange) -> String {
    MediaTypeConvention::default().media_type(resource, lifecycle)
}

/// Shorthand for `make_media_type(resource, &LifecycleChange::Created)`
pub fn created(resource: &str) -> String {
    make_media_type(resource, &LifecycleChange::Created)
}

/// Shorthand for `make_media_type(resource, &LifecycleChange::Deleted)`
pub fn deleted(resource: &str) -> String {
    make_media_type(resource, &LifecycleChange::Deleted)
}

/// Shorthand for `make_media_type(resource, &LifecycleChange::Changed)`
pub fn changed(resource: &str) -> String {
    make_media_type(resource, &LifecycleChange::Changed)
}
