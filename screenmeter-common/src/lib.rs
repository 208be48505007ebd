//! Screenmeter Common Library
//!
//! Shared types and utilities for the screenmeter bridges:
//!
//! - [`telemetry`] - Reading data model (`TelemetryPoint`, `TelemetryValue`)
//! - [`serialization`] - Plain/JSON/CBOR payload encoding
//! - [`config`] - Zenoh and logging configuration (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`keyexpr`] - Key expression builder for metric, status and discovery keys
//! - [`availability`] - Online/offline availability states
//! - [`error`] - Error types

pub mod availability;
pub mod config;
pub mod error;
pub mod keyexpr;
pub mod serialization;
pub mod session;
pub mod telemetry;

pub use availability::Availability;
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use keyexpr::{DEFAULT_KEY_PREFIX, KeyExprBuilder};
pub use serialization::{Format, decode, encode, encode_point};
pub use session::connect;
pub use telemetry::{TelemetryPoint, TelemetryValue, current_timestamp_millis};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Output is either
/// human-readable text or one JSON object per line.
///
/// # Example
///
/// ```ignore
/// use screenmeter_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
