use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single reading emitted by a bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Unix epoch milliseconds when the reading was taken.
    pub timestamp: i64,

    /// Device identifier (e.g., "perla").
    pub source: String,

    /// Metric name (e.g., "throughput", "volume").
    pub metric: String,

    /// The measured value.
    pub value: TelemetryValue,

    /// Additional context labels (e.g., unit, capture region).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl TelemetryPoint {
    /// Create a new telemetry point with the current timestamp.
    pub fn new(source: impl Into<String>, metric: impl Into<String>, value: TelemetryValue) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            source: source.into(),
            metric: metric.into(),
            value,
            labels: HashMap::new(),
        }
    }

    /// Add a label to this telemetry point.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Typed telemetry value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// Whole-number reading, as extracted from a display.
    Integer(i64),

    /// Fractional reading.
    Gauge(f64),

    /// Text value.
    Text(String),

    /// Boolean value.
    Boolean(bool),
}

impl std::fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryValue::Integer(v) => write!(f, "{}", v),
            TelemetryValue::Gauge(v) => write!(f, "{}", v),
            TelemetryValue::Text(v) => f.write_str(v),
            TelemetryValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        TelemetryValue::Integer(v)
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Gauge(v)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        TelemetryValue::Text(v.to_string())
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Boolean(v)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
