//! Where accepted readings and availability changes go.

use std::collections::HashMap;
use std::future::Future;

use screenmeter_bridge_framework::{
    Availability, BridgeError, Publisher, RetainedPublisher, StatusPublisher, TelemetryPoint,
    TelemetryValue,
};

use crate::config::{MetricSettings, ScreenmeterConfig};
use crate::discovery;
use crate::metric::Metric;

/// Destination for readings and lifecycle state.
///
/// Publishing is fire-and-forget: an error means the sample was not handed
/// to the bus, and callers log it and move on.
pub trait PublicationSink: Send + Sync {
    fn publish_reading(
        &self,
        metric: Metric,
        value: i64,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    fn publish_availability(
        &self,
        availability: Availability,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Publishes to Zenoh.
#[derive(Debug)]
pub struct ZenohSink {
    publisher: Publisher,
    device: String,
    keys: HashMap<Metric, String>,
    status: StatusPublisher,
    // Held so late joiners keep receiving the documents.
    _discovery: Vec<RetainedPublisher>,
}

impl ZenohSink {
    /// Declare the status key and, when enabled, announce discovery documents.
    pub async fn declare(
        publisher: Publisher,
        config: &ScreenmeterConfig,
        metrics: &[MetricSettings],
    ) -> Result<Self, BridgeError> {
        let status = StatusPublisher::declare(publisher.session(), config.status_key()).await?;

        let discovery = if config.discovery.enabled {
            let documents = discovery::build_documents(config, metrics);
            discovery::announce(publisher.session(), &documents).await?
        } else {
            Vec::new()
        };

        Ok(Self {
            keys: metrics
                .iter()
                .map(|settings| (settings.metric, settings.key.clone()))
                .collect(),
            device: config.device.name.clone(),
            publisher,
            status,
            _discovery: discovery,
        })
    }
}

impl PublicationSink for ZenohSink {
    async fn publish_reading(&self, metric: Metric, value: i64) -> Result<(), BridgeError> {
        let key = self
            .keys
            .get(&metric)
            .ok_or_else(|| BridgeError::publish(metric.as_str(), "no key configured"))?;

        let point = TelemetryPoint::new(&self.device, metric.as_str(), TelemetryValue::Integer(value));
        self.publisher.publish_to_key(key, &point).await?;

        tracing::info!(key = %key, metric = %metric, value, "Published reading");
        Ok(())
    }

    async fn publish_availability(&self, availability: Availability) -> Result<(), BridgeError> {
        self.status.publish(availability).await
    }
}
