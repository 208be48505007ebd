//! Publishers whose last samples stay available to late joiners.
//!
//! Zenoh has no broker-side "retained" flag. The equivalent is a zenoh-ext
//! [`AdvancedPublisher`] with a cache: subscribers that ask for history
//! (`AdvancedSubscriber` with `history()`) receive the cached samples when
//! they appear, and publisher detection lets them notice when we go away.
//!
//! # Example
//!
//! ```ignore
//! use screenmeter_bridge_framework::{RetainedPublisher, RetainedPublisherConfig};
//!
//! let status = RetainedPublisher::declare(
//!     &session,
//!     "screenmeter/perla/status",
//!     RetainedPublisherConfig::default(),
//! ).await?;
//!
//! status.put_text("online").await?;
//! ```

use serde::Serialize;
use zenoh::Session;
use zenoh_ext::{AdvancedPublisher, AdvancedPublisherBuilderExt, CacheConfig};

use crate::error::{BridgeError, Result};

/// Configuration for retained publishers.
#[derive(Debug, Clone)]
pub struct RetainedPublisherConfig {
    /// Number of samples kept for late joiners.
    /// Default: 1 (last value only)
    pub history: usize,

    /// Let subscribers detect this publisher appearing and disappearing.
    /// Default: true
    pub publisher_detection: bool,
}

impl Default for RetainedPublisherConfig {
    fn default() -> Self {
        Self {
            history: 1,
            publisher_detection: true,
        }
    }
}

/// A cached publisher bound to a single key expression.
pub struct RetainedPublisher {
    key: String,
    inner: AdvancedPublisher<'static>,
}

impl std::fmt::Debug for RetainedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedPublisher")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RetainedPublisher {
    /// Declare a cached publisher on `key`.
    pub async fn declare(
        session: &Session,
        key: impl Into<String>,
        config: RetainedPublisherConfig,
    ) -> Result<Self> {
        let key = key.into();
        let cache = CacheConfig::default().max_samples(config.history.max(1));

        // An owned key expression keeps the publisher free of borrowed lifetimes.
        let builder = session.declare_publisher(key.clone()).cache(cache);
        let declared = if config.publisher_detection {
            builder.publisher_detection().await
        } else {
            builder.await
        };
        let inner: AdvancedPublisher<'static> = declared.map_err(|e| {
            BridgeError::publish(&key, format!("Failed to declare publisher: {}", e))
        })?;

        tracing::debug!(key = %key, history = config.history, "Declared retained publisher");

        Ok(Self { key, inner })
    }

    /// Key expression this publisher writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish raw bytes.
    pub async fn put(&self, payload: Vec<u8>) -> Result<()> {
        self.inner
            .put(payload)
            .await
            .map_err(|e| BridgeError::publish(&self.key, e))
    }

    /// Publish a UTF-8 text payload.
    pub async fn put_text(&self, text: &str) -> Result<()> {
        self.put(text.as_bytes().to_vec()).await
    }

    /// Publish a value as a JSON document.
    pub async fn put_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.put(payload).await
    }
}
