//! Error types for microcosm-producer

use thiserror::Error;

/// Errors that can occur while producing messages
#[derive(Debug, Error)]
pub enum PubSubError {
    /// No topic maps to the media type after all configuration layers
    #[error("No topic was registered for messages of type: {media_type}")]
    TopicNotConfigured { media_type: String },

    /// No codec is registered for the media type
    #[error("No codec was registered for messages of type: {media_type}")]
    CodecNotFound { media_type: String },

    /// Codec failed to encode a payload
    #[error("Failed to encode message of type '{media_type}': {reason}")]
    Encode { media_type: String, reason: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publish failure reported by the transport
    #[error("Failed to publish message to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Transport connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport-specific backend error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PubSubError {
    /// Whether this error is a topic configuration defect
    pub fn is_topic_not_configured(&self) -> bool {
        matches!(self, Self::TopicNotConfigured { .. })
    }

    /// Whether this error reports a missing codec
    pub fn is_codec_not_found(&self) -> bool {
        matches!(self, Self::CodecNotFound { .. })
    }
}

/// Result type alias for producer operations
pub type Result<T> = std::result::Result<T, PubSubError>;
