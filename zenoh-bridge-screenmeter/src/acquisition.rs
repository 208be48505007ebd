//! The acquisition-and-publication loop.
//!
//! One cycle per poll interval:
//!
//! 1. If disconnected: wait the settle delay, connect, play the login macro.
//!    Any failure leaves the loop disconnected and ends the cycle.
//! 2. For each metric, in order: capture its region, recognize a value, run
//!    it through the [`MetricFilter`], publish if accepted.
//! 3. After both metrics, one keepalive click.
//!
//! A capture failure or a reading that does not parse means the UI is not
//! where we expect it (logged out, dialog open, screen saver). The loop then
//! saves a full-screen snapshot when debug captures are enabled and the
//! stream is still in sync, replays the login macro on the old session,
//! abandons the session and ends the cycle.
//! The next cycle starts from a fresh connection. Any other fault only
//! abandons the session.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use screenmeter_bridge_framework::Availability;

use crate::config::{MetricSettings, ScreenmeterConfig};
use crate::diagnostics::DebugCaptures;
use crate::display::{
    DeviceAddress, DisplayConnector, DisplayError, LoginScript, Point, RemoteDisplay,
};
use crate::filter::{Decision, MetricFilter};
use crate::metric::Metric;
use crate::rfb::RfbError;
use crate::recognition::{OcrError, TextRecognizer, parse_reading};
use crate::sink::PublicationSink;

/// Immutable parameters of the loop.
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub address: DeviceAddress,
    pub secret: String,
    pub connect_timeout: Duration,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub login: LoginScript,
    pub keepalive: Point,
    /// Metrics in cycle order.
    pub metrics: Vec<MetricSettings>,
}

impl AcquisitionSettings {
    pub fn from_config(
        config: &ScreenmeterConfig,
    ) -> screenmeter_bridge_framework::Result<Self> {
        Ok(Self {
            address: config.device.address(),
            secret: config.device.secret.clone(),
            connect_timeout: config.connect_timeout(),
            settle_delay: config.settle_delay(),
            poll_interval: config.poll_interval(),
            login: config.login_script(),
            keepalive: config.login.keepalive,
            metrics: config.all_metric_settings()?,
        })
    }
}

/// Something that went wrong inside a connected cycle.
#[derive(Debug, Error)]
pub enum CycleFault {
    #[error("capturing {metric} failed: {source}")]
    Capture {
        metric: Metric,
        #[source]
        source: DisplayError,
    },
    #[error("no {metric} reading in OCR text {text:?}")]
    NoReading { metric: Metric, text: String },
    #[error("recognizing {metric} failed: {source}")]
    Recognition {
        metric: Metric,
        #[source]
        source: OcrError,
    },
    #[error("keepalive failed: {0}")]
    Keepalive(#[source] DisplayError),
}

impl CycleFault {
    /// The metric being read, for faults that mean the screen is not
    /// showing what we expect.
    pub fn session_metric(&self) -> Option<Metric> {
        match self {
            CycleFault::Capture { metric, .. } | CycleFault::NoReading { metric, .. } => {
                Some(*metric)
            }
            CycleFault::Recognition { .. } | CycleFault::Keepalive(_) => None,
        }
    }

    /// Whether the session can still be read after this fault.
    ///
    /// A capture that failed mid-update leaves unread pixel data in the
    /// stream; only a rejected region leaves it untouched.
    pub fn leaves_stream_in_sync(&self) -> bool {
        match self {
            CycleFault::Capture { source, .. } => matches!(
                source,
                DisplayError::Protocol(RfbError::OutOfBounds { .. })
            ),
            CycleFault::NoReading { .. } | CycleFault::Recognition { .. } => true,
            CycleFault::Keepalive(_) => false,
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Both metrics were read; `accepted` lists the readings the filter
    /// passed on to the sink, whether or not publishing succeeded.
    Completed { accepted: Vec<(Metric, i64)> },
    /// Connecting or logging in failed; still disconnected.
    ConnectFailed,
    /// A metric could not be read; the login macro was replayed and the
    /// session dropped.
    SessionReset { metric: Metric },
    /// Any other fault; the session was dropped.
    Faulted,
}

/// Drives the display session, recognition, filter and sink.
pub struct AcquisitionLoop<C: DisplayConnector, R, P> {
    connector: C,
    recognizer: R,
    sink: P,
    settings: AcquisitionSettings,
    diagnostics: Option<DebugCaptures>,
    filter: MetricFilter,
    session: Option<C::Session>,
}

impl<C, R, P> AcquisitionLoop<C, R, P>
where
    C: DisplayConnector,
    R: TextRecognizer,
    P: PublicationSink,
{
    pub fn new(connector: C, recognizer: R, sink: P, settings: AcquisitionSettings) -> Self {
        Self {
            connector,
            recognizer,
            sink,
            settings,
            diagnostics: None,
            filter: MetricFilter::new(),
            session: None,
        }
    }

    /// Save captures under a debug directory.
    pub fn with_diagnostics(mut self, diagnostics: Option<DebugCaptures>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn filter(&self) -> &MetricFilter {
        &self.filter
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// Publishes `online` before the first cycle and `offline` after the
    /// last. Cancellation is only observed between cycles.
    pub async fn run(mut self, shutdown: CancellationToken) {
        if let Err(e) = self.sink.publish_availability(Availability::Online).await {
            tracing::warn!(error = %e, "Failed to publish online status");
        }

        tracing::info!(
            address = %self.settings.address,
            interval_secs = self.settings.poll_interval.as_secs(),
            timeout_secs = self.settings.connect_timeout.as_secs(),
            "Acquisition loop started"
        );

        while !shutdown.is_cancelled() {
            let outcome = self.run_cycle().await;
            tracing::debug!(?outcome, "Cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Stopping acquisition loop");
        self.session = None;

        if let Err(e) = self.sink.publish_availability(Availability::Offline).await {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }
    }

    /// Run exactly one cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.session.is_none() {
            match self.establish().await {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    tracing::warn!(address = %self.settings.address, error = %e, "Connection failed");
                    return CycleOutcome::ConnectFailed;
                }
            }
        }

        match self.read_metrics().await {
            Ok(accepted) => CycleOutcome::Completed { accepted },
            Err(fault) => match fault.session_metric() {
                Some(metric) => {
                    tracing::warn!(error = %fault, "Reading failed, logging in again");
                    self.reset_session(fault.leaves_stream_in_sync()).await;
                    CycleOutcome::SessionReset { metric }
                }
                None => {
                    tracing::error!(error = %fault, "Cycle fault, dropping session");
                    self.session = None;
                    CycleOutcome::Faulted
                }
            },
        }
    }

    async fn establish(&self) -> Result<C::Session, DisplayError> {
        tokio::time::sleep(self.settings.settle_delay).await;
        tracing::info!(address = %self.settings.address, "Connecting to remote display");

        let mut session = self
            .connector
            .connect(&self.settings.address, self.settings.connect_timeout)
            .await?;
        session
            .authenticate(&self.settings.login, &self.settings.secret)
            .await?;

        tracing::info!("Login sequence executed");
        Ok(session)
    }

    async fn read_metrics(&mut self) -> Result<Vec<(Metric, i64)>, CycleFault> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };

        let mut accepted = Vec::new();

        for settings in &self.settings.metrics {
            let metric = settings.metric;

            let image = session
                .capture_region(settings.region)
                .await
                .map_err(|source| CycleFault::Capture { metric, source })?;

            if let Some(diagnostics) = &self.diagnostics {
                diagnostics.save(metric.as_str(), &image).await;
            }

            let text = self
                .recognizer
                .recognize(&image)
                .await
                .map_err(|source| CycleFault::Recognition { metric, source })?;
            let value = parse_reading(&text, &settings.pattern);
            tracing::debug!(metric = %metric, raw = ?text, parsed = ?value, "OCR result");

            let Some(value) = value else {
                return Err(CycleFault::NoReading { metric, text });
            };

            match self.filter.evaluate(metric, value) {
                decision if decision.is_accepted() => {
                    if let Err(e) = self.sink.publish_reading(metric, value).await {
                        tracing::warn!(metric = %metric, value, error = %e, "Failed to publish reading");
                    }
                    accepted.push((metric, value));
                }
                Decision::Jump { delta } => {
                    tracing::info!(metric = %metric, value, delta, "Suppressed implausible jump");
                }
                _ => {}
            }
        }

        session
            .keepalive(self.settings.keepalive)
            .await
            .map_err(CycleFault::Keepalive)?;

        Ok(accepted)
    }

    /// Snapshot, replay the login macro, then abandon the session.
    ///
    /// The snapshot needs a readable stream and is skipped otherwise.
    async fn reset_session(&mut self, readable: bool) {
        if let Some(mut session) = self.session.take() {
            match &self.diagnostics {
                Some(diagnostics) if readable => match session.capture_full().await {
                    Ok(screen) => diagnostics.save("fullscreen", &screen).await,
                    Err(e) => tracing::warn!(error = %e, "Full-screen snapshot failed"),
                },
                Some(_) => tracing::debug!("Stream out of sync, skipping full-screen snapshot"),
                None => {}
            }

            if let Err(e) = session
                .authenticate(&self.settings.login, &self.settings.secret)
                .await
            {
                tracing::warn!(error = %e, "Login replay failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfb::Rect;

    fn capture_fault(source: RfbError) -> CycleFault {
        CycleFault::Capture {
            metric: Metric::Volume,
            source: DisplayError::Protocol(source),
        }
    }

    #[test]
    fn test_fault_classification() {
        let rejected = capture_fault(RfbError::OutOfBounds {
            rect: Rect::new(0, 0, 500, 10),
            width: 320,
            height: 240,
        });
        assert_eq!(rejected.session_metric(), Some(Metric::Volume));
        assert!(rejected.leaves_stream_in_sync());

        let desync = capture_fault(RfbError::UnexpectedEncoding(5));
        assert_eq!(desync.session_metric(), Some(Metric::Volume));
        assert!(!desync.leaves_stream_in_sync());

        let miss = CycleFault::NoReading {
            metric: Metric::Throughput,
            text: String::new(),
        };
        assert_eq!(miss.session_metric(), Some(Metric::Throughput));
        assert!(miss.leaves_stream_in_sync());

        let keepalive = CycleFault::Keepalive(DisplayError::Protocol(RfbError::Io(
            std::io::ErrorKind::BrokenPipe.into(),
        )));
        assert_eq!(keepalive.session_metric(), None);
    }
}
