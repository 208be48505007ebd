//! Availability reporting on the bridge's status key.

use screenmeter_common::Availability;
use zenoh::Session;

use crate::Result;
use crate::retained::{RetainedPublisher, RetainedPublisherConfig};

/// Publishes `online` / `offline` on a retained status key.
#[derive(Debug)]
pub struct StatusPublisher {
    publisher: RetainedPublisher,
}

impl StatusPublisher {
    /// Declare the status key.
    pub async fn declare(session: &Session, key: impl Into<String>) -> Result<Self> {
        let publisher =
            RetainedPublisher::declare(session, key, RetainedPublisherConfig::default()).await?;
        Ok(Self { publisher })
    }

    /// Status key expression.
    pub fn key(&self) -> &str {
        self.publisher.key()
    }

    /// Publish an availability state.
    pub async fn publish(&self, availability: Availability) -> Result<()> {
        self.publisher.put_text(availability.as_str()).await?;
        tracing::info!(key = %self.key(), status = %availability, "Published availability");
        Ok(())
    }
}
