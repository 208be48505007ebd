//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use screenmeter_common::{Format, connect, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;

/// Bridge runner that manages the lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization
/// - Zenoh connection
/// - Translating SIGINT/SIGTERM into a [`CancellationToken`]
/// - Graceful shutdown once the worker returns
///
/// Unlike a spawn-and-abort runner, the worker is awaited to completion, so an
/// in-flight poll cycle is never cut in half by a signal. The worker is
/// expected to check the token between cycles.
///
/// # Example
///
/// ```ignore
/// let runner = BridgeRunner::new_with_args("screenmeter", config, Some(&args)).await?;
///
/// let publisher = runner.publisher();
/// runner.run(|shutdown| async move {
///     while !shutdown.is_cancelled() {
///         // poll and publish
///     }
/// }).await?;
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Zenoh session.
    session: Arc<zenoh::Session>,
    /// Publisher for readings.
    publisher: Publisher,
    /// Cancelled on shutdown signal.
    shutdown: CancellationToken,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    pub async fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None).await
    }

    /// Create a new bridge runner with CLI args for log level override.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Connect to Zenoh
    /// 3. Create the publisher
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let log_config = match args {
            Some(args) => args.logging_override(config.logging()),
            None => config.logging().clone(),
        };
        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let session = Arc::new(
            connect(config.zenoh())
                .await
                .map_err(|e| BridgeError::ZenohConnection(e.to_string()))?,
        );

        let publisher = Publisher::new(session.clone(), config.key_prefix(), Format::default());

        Ok(Self {
            name,
            version,
            config,
            session,
            publisher,
            shutdown: CancellationToken::new(),
        })
    }

    /// Set the serialization format for the publisher.
    pub fn with_format(mut self, format: Format) -> Self {
        self.publisher = self.publisher.with_format(format);
        self
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Token cancelled when a shutdown signal arrives.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run `worker` until it returns, then shut the bridge down.
    ///
    /// This will:
    /// 1. Listen for Ctrl+C / SIGTERM and cancel the token passed to `worker`
    /// 2. Await the worker, which owns (and drops) its publishers
    /// 3. Close the Zenoh session
    pub async fn run<F, Fut>(self, worker: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()>,
    {
        let listener = {
            let shutdown = self.shutdown.clone();
            let name = self.name.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown_signal() => {
                        tracing::info!(bridge = %name, "Received shutdown signal");
                        shutdown.cancel();
                    }
                    _ = shutdown.cancelled() => {}
                }
            })
        };

        tracing::info!(bridge = %self.name, "Bridge running. Press Ctrl+C to stop.");

        worker(self.shutdown.clone()).await;

        self.shutdown.cancel();
        if let Err(e) = listener.await {
            tracing::debug!(error = %e, "Signal listener ended abnormally");
        }

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Resolve when the process is asked to terminate.
///
/// Listens for Ctrl+C everywhere and SIGTERM on Unix (what container
/// supervisors send).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
