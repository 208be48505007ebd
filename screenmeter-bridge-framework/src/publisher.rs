//! Reading publisher for Zenoh.

use std::sync::Arc;

use screenmeter_common::{Format, TelemetryPoint, encode_point};

use crate::error::{BridgeError, Result};

/// Publisher for sending readings to Zenoh.
///
/// Wraps a Zenoh session and serializes [`TelemetryPoint`] values in the
/// configured [`Format`]. Puts are fire-and-forget: a returned error means
/// the local session refused the sample, not that a subscriber missed it.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    key_prefix: String,
    format: Format,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(
        session: Arc<zenoh::Session>,
        key_prefix: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            session,
            key_prefix: key_prefix.into(),
            format,
        }
    }

    /// Get the key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Same session and prefix, different payload format.
    pub fn with_format(&self, format: Format) -> Self {
        Self {
            session: self.session.clone(),
            key_prefix: self.key_prefix.clone(),
            format,
        }
    }

    /// Publish a telemetry point on a full key expression.
    pub async fn publish_to_key(&self, key: &str, point: &TelemetryPoint) -> Result<()> {
        let payload = encode_point(point, self.format)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        self.publish_raw(key, payload).await
    }

    /// Publish raw bytes to a full key.
    pub async fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::publish(key, e))?;

        tracing::trace!(key = %key, "Published");

        Ok(())
    }
}
