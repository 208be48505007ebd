//! Screenmeter Bridge Framework
//!
//! Lifecycle plumbing shared by bridges that read a device and publish to Zenoh.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for the bridge lifecycle (logging, Zenoh session, signal
//!   handling, cooperative shutdown through a [`CancellationToken`])
//! - [`Publisher`] for publishing readings with automatic serialization
//! - [`RetainedPublisher`] for keys whose last value late joiners must see
//! - [`StatusPublisher`] for the online/offline availability key
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use screenmeter_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
//!     let publisher = runner.publisher();
//!
//!     // The worker owns the loop and returns once the token is cancelled.
//!     runner.run(|shutdown| my_worker(publisher, shutdown)).await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod publisher;
mod retained;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use publisher::Publisher;
pub use retained::{RetainedPublisher, RetainedPublisherConfig};
pub use runner::{BridgeRunner, shutdown_signal};
pub use status::StatusPublisher;
pub use tokio_util::sync::CancellationToken;

// Re-export commonly used types from screenmeter-common
pub use screenmeter_common::{
    Availability, Format, LoggingConfig, TelemetryPoint, TelemetryValue, ZenohConfig,
};
