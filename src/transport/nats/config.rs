//! NATS transport configuration

use serde::{Deserialize, Serialize};

/// JetStream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Stream provisioned on connect so that published topics are captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Stream name
    pub name: String,

    /// Subjects captured by the stream (e.g., `["events.>"]`)
    pub subjects: Vec<String>,

    #[serde(default)]
    pub storage: StorageType,

    /// Maximum number of messages retained (0 = unlimited)
    #[serde(default)]
    pub max_messages: i64,

    /// Maximum bytes retained (0 = unlimited)
    #[serde(default)]
    pub max_bytes: i64,

    /// Maximum message age in seconds (0 = unlimited)
    #[serde(default)]
    pub max_age_secs: u64,
}

/// NATS JetStream connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsConfig {
    /// Server URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Authentication token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bound on waiting for a publish ack; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_timeout_secs: Option<u64>,

    /// Stream to create or reuse on connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamConfig>,
}

fn default_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            publish_timeout_secs: None,
            stream: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://127.0.0.1:4222");
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.request_timeout_secs, 10);
        assert!(config.token.is_none());
        assert!(config.stream.is_none());
    }

    #[test]
    fn test_deserialize_with_stream() {
        let config: NatsConfig = serde_json::from_str(
            r#"{
                "url": "nats://nats:4222",
                "publishTimeoutSecs": 3,
                "stream": {"name": "EVENTS", "subjects": ["events.>"], "storage": "memory"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.url, "nats://nats:4222");
        assert_eq!(config.publish_timeout_secs, Some(3));
        assert_eq!(config.connect_timeout_secs, 5);
        let stream = config.stream.unwrap();
        assert_eq!(stream.name, "EVENTS");
        assert_eq!(stream.storage, StorageType::Memory);
        assert_eq!(stream.max_messages, 0);
    }
}
