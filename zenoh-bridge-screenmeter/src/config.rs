//! Configuration for the screenmeter bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use screenmeter_bridge_framework::{
    BridgeConfig, BridgeError, Format, LoggingConfig, Result, ZenohConfig,
};
use screenmeter_common::{DEFAULT_KEY_PREFIX, KeyExprBuilder};

use crate::display::{DeviceAddress, LoginScript, LoginStep, Point, Region};
use crate::metric::Metric;
use crate::recognition::ExtractionPattern;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenmeterBridgeConfig {
    /// Zenoh connection settings.
    pub zenoh: ZenohConfig,

    /// Device and acquisition settings.
    pub screenmeter: ScreenmeterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for ScreenmeterBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.screenmeter.key_prefix
    }

    fn validate(&self) -> Result<()> {
        self.screenmeter.validate()
    }
}

/// Device and acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenmeterConfig {
    /// Key expression prefix (default: "screenmeter").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// The device to read.
    pub device: DeviceConfig,

    /// Seconds between acquisition cycles (default: 10).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-metric capture and publication settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Availability key (default: `<prefix>/<device>/status`).
    #[serde(default)]
    pub status_key: Option<String>,

    /// Payload format for readings (default: plain).
    #[serde(default)]
    pub payload_format: Format,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub login: LoginConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_poll_interval() -> u64 {
    10
}

/// The device's RFB service and UI timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name, used in key expressions (default: "perla").
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Host name or IP address.
    pub host: String,

    /// RFB port (default: 5900).
    #[serde(default = "default_rfb_port")]
    pub port: u16,

    /// Code typed by the login macro (default: empty).
    #[serde(default)]
    pub secret: String,

    /// Connection and handshake timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Wait before each connection attempt, in seconds (default: 3).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Wait after the login macro, in milliseconds (default: 1000).
    #[serde(default = "default_login_settle")]
    pub login_settle_ms: u64,
}

fn default_device_name() -> String {
    "perla".to_string()
}

fn default_rfb_port() -> u16 {
    5900
}

fn default_timeout() -> u64 {
    60
}

fn default_settle_delay() -> u64 {
    3
}

fn default_login_settle() -> u64 {
    1000
}

impl DeviceConfig {
    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.host.clone(), self.port)
    }
}

/// Settings for both metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub throughput: MetricConfig,
    #[serde(default)]
    pub volume: MetricConfig,
}

impl MetricsConfig {
    pub fn get(&self, metric: Metric) -> &MetricConfig {
        match metric {
            Metric::Throughput => &self.throughput,
            Metric::Volume => &self.volume,
        }
    }
}

/// Overrides for one metric. Unset fields take the metric's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Screen region holding the value.
    #[serde(default)]
    pub region: Option<Region>,

    /// Extraction pattern with exactly one capture group.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Full key expression (default: `<prefix>/<device>/<metric>`).
    #[serde(default)]
    pub key: Option<String>,

    /// Discovery metadata.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Fully resolved settings for one metric.
#[derive(Debug, Clone)]
pub struct MetricSettings {
    pub metric: Metric,
    pub region: Region,
    pub pattern: ExtractionPattern,
    pub key: String,
    pub name: String,
    pub unit: String,
    pub device_class: String,
    pub state_class: String,
    pub icon: String,
}

/// OCR engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Engine executable (default: "tesseract").
    #[serde(default = "default_ocr_command")]
    pub command: String,

    /// Recognition language (default: "eng").
    #[serde(default = "default_ocr_language")]
    pub language: String,

    /// Extra engine arguments, whitespace separated.
    #[serde(default = "default_ocr_config")]
    pub config: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            language: default_ocr_language(),
            config: default_ocr_config(),
        }
    }
}

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_config() -> String {
    "-c page_separator=".to_string()
}

/// Login macro and keepalive target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "LoginScript::default_steps")]
    pub steps: Vec<LoginStep>,

    /// Where the keepalive click lands (default: 400,0).
    #[serde(default = "default_keepalive")]
    pub keepalive: Point,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            steps: LoginScript::default_steps(),
            keepalive: default_keepalive(),
        }
    }
}

fn default_keepalive() -> Point {
    Point::new(400, 0)
}

/// Discovery document publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Diagnostic PNG captures.
///
/// When enabled, every captured region is saved on every cycle (two files
/// per poll interval, about 17k a day at the default interval), so the
/// directory is pruned to `max_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory the captures are written to (default: "debug").
    #[serde(default = "default_debug_directory")]
    pub directory: PathBuf,

    /// Newest captures kept; older ones are deleted. `0` keeps everything.
    #[serde(default = "default_debug_max_files")]
    pub max_files: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_debug_directory(),
            max_files: default_debug_max_files(),
        }
    }
}

fn default_debug_directory() -> PathBuf {
    PathBuf::from("debug")
}

fn default_debug_max_files() -> usize {
    1000
}

impl ScreenmeterConfig {
    pub fn keys(&self) -> KeyExprBuilder {
        KeyExprBuilder::with_prefix(&self.key_prefix, &self.device.name)
    }

    pub fn status_key(&self) -> String {
        self.status_key
            .clone()
            .unwrap_or_else(|| self.keys().status())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.device.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.device.settle_delay_secs)
    }

    pub fn login_script(&self) -> LoginScript {
        LoginScript {
            steps: self.login.steps.clone(),
            settle: Duration::from_millis(self.device.login_settle_ms),
        }
    }

    /// Resolve one metric's settings against its defaults.
    pub fn metric_settings(&self, metric: Metric) -> Result<MetricSettings> {
        let overrides = self.metrics.get(metric);

        let region = match overrides.region {
            Some(region) => region,
            None => metric.default_region().parse().map_err(|e| {
                BridgeError::validation(format!("metrics.{}.region: {}", metric, e))
            })?,
        };

        let pattern_text = overrides
            .pattern
            .as_deref()
            .unwrap_or(metric.default_pattern());
        let pattern = ExtractionPattern::new(pattern_text).map_err(|e| {
            BridgeError::validation(format!(
                "metrics.{}.pattern {:?}: {}",
                metric, pattern_text, e
            ))
        })?;

        let text = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };

        Ok(MetricSettings {
            metric,
            region,
            pattern,
            key: overrides
                .key
                .clone()
                .unwrap_or_else(|| self.keys().metric(metric.as_str())),
            name: text(&overrides.name, metric.default_name()),
            unit: text(&overrides.unit, metric.default_unit()),
            device_class: text(&overrides.device_class, metric.default_device_class()),
            state_class: text(&overrides.state_class, metric.default_state_class()),
            icon: text(&overrides.icon, metric.default_icon()),
        })
    }

    /// Settings for every metric, in cycle order.
    pub fn all_metric_settings(&self) -> Result<Vec<MetricSettings>> {
        Metric::ALL
            .into_iter()
            .map(|metric| self.metric_settings(metric))
            .collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.trim().is_empty() {
            return Err(BridgeError::validation("key_prefix cannot be empty"));
        }

        if self.device.name.trim().is_empty() {
            return Err(BridgeError::validation("device.name cannot be empty"));
        }

        if self.device.host.trim().is_empty() {
            return Err(BridgeError::validation("device.host is required"));
        }

        if self.poll_interval_secs == 0 {
            return Err(BridgeError::validation(
                "poll_interval_secs must be greater than 0",
            ));
        }

        if self.device.timeout_secs == 0 {
            return Err(BridgeError::validation(
                "device.timeout_secs must be greater than 0",
            ));
        }

        if self.ocr.command.trim().is_empty() {
            return Err(BridgeError::validation("ocr.command cannot be empty"));
        }

        if !self.device.secret.is_empty() && !self.login_script().has_secret_step() {
            return Err(BridgeError::validation(
                "login.steps must contain a \"secret\" step when device.secret is set",
            ));
        }

        self.all_metric_settings()?;

        Ok(())
    }
}
