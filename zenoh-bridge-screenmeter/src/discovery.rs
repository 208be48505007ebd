//! Discovery documents describing each published metric.
//!
//! One retained JSON document per metric at
//! `<prefix>/@/discovery/<device>/<metric>`, carrying what an automation
//! platform needs to create a sensor: display name, unit, semantic classes,
//! icon, and where to find the value and the availability state.

use serde::{Deserialize, Serialize};
use zenoh::Session;

use screenmeter_bridge_framework::{Result, RetainedPublisher, RetainedPublisherConfig};

use crate::config::{MetricSettings, ScreenmeterConfig};

/// Metadata for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub name: String,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
    pub icon: String,
    pub state_topic: String,
    pub availability_topic: String,
    pub unique_id: String,
    pub device: DeviceInfo,
}

/// The physical device the metrics belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub sw_version: String,
}

/// Build the `(key, document)` pairs for `metrics`.
pub fn build_documents(
    config: &ScreenmeterConfig,
    metrics: &[MetricSettings],
) -> Vec<(String, DiscoveryDocument)> {
    let keys = config.keys();
    let device_id = format!("screenmeter_{}", config.device.name);
    let device = DeviceInfo {
        identifiers: vec![device_id.clone()],
        name: config.device.name.clone(),
        model: "screenmeter".to_string(),
        sw_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let availability_topic = config.status_key();

    metrics
        .iter()
        .map(|settings| {
            let document = DiscoveryDocument {
                name: settings.name.clone(),
                unit_of_measurement: settings.unit.clone(),
                device_class: settings.device_class.clone(),
                state_class: settings.state_class.clone(),
                icon: settings.icon.clone(),
                state_topic: settings.key.clone(),
                availability_topic: availability_topic.clone(),
                unique_id: format!("{}_{}", device_id, settings.metric),
                device: device.clone(),
            };
            (keys.discovery(settings.metric.as_str()), document)
        })
        .collect()
}

/// Declare one retained publisher per document and publish it once.
///
/// The returned publishers must be kept alive for late joiners to receive
/// the documents.
pub async fn announce(
    session: &Session,
    documents: &[(String, DiscoveryDocument)],
) -> Result<Vec<RetainedPublisher>> {
    let mut publishers = Vec::with_capacity(documents.len());

    for (key, document) in documents {
        let publisher =
            RetainedPublisher::declare(session, key.clone(), RetainedPublisherConfig::default())
                .await?;
        publisher.put_json(document).await?;
        tracing::debug!(key = %key, "Published discovery document");
        publishers.push(publisher);
    }

    Ok(publishers)
}
