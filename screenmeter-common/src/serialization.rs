use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::telemetry::TelemetryPoint;

/// Payload format for published readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Bare value as UTF-8 text (e.g., `12`). What MQTT-style consumers expect.
    #[default]
    Plain,

    /// JSON format (human-readable, good for debugging).
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Plain => "text/plain",
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
///
/// `Plain` has no structure of its own, so structured values fall back to
/// their JSON text; scalars come out bare (`42`, `"text"`).
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Plain | Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Encode a telemetry point.
///
/// `Plain` publishes only the value (`12`, `online`); the structured formats
/// publish the whole point.
pub fn encode_point(point: &TelemetryPoint, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Plain => Ok(point.value.to_string().into_bytes()),
        Format::Json | Format::Cbor => encode(point, format),
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Plain => {
            let text = std::str::from_utf8(data).map_err(|e| Error::Plain(e.to_string()))?;
            serde_json::from_str(text.trim()).map_err(Error::from)
        }
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}
