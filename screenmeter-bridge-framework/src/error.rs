//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Zenoh connection error.
    #[error("Zenoh connection error: {0}")]
    ZenohConnection(String),

    /// Zenoh session error.
    #[error("Zenoh session error: {0}")]
    ZenohSession(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Publishing error.
    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a publish error for a key.
    pub fn publish(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Publish {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl From<zenoh::Error> for BridgeError {
    fn from(err: zenoh::Error) -> Self {
        Self::ZenohSession(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<screenmeter_common::Error> for BridgeError {
    fn from(err: screenmeter_common::Error) -> Self {
        use screenmeter_common::Error;

        match err {
            Error::Config(msg) => Self::Config(msg),
            Error::Zenoh(e) => Self::ZenohSession(e.to_string()),
            Error::Io(e) => Self::Io(e),
            other => Self::Serialization(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_message() {
        let err = BridgeError::publish("screenmeter/perla/volume", "session closed");
        assert_eq!(
            err.to_string(),
            "Failed to publish to screenmeter/perla/volume: session closed"
        );
    }

    #[test]
    fn test_common_config_error_maps_to_config() {
        let err: BridgeError = screenmeter_common::Error::Config("bad mode".into()).into();
        assert!(matches!(err, BridgeError::Config(msg) if msg == "bad mode"));
    }
}
