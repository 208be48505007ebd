//! Zenoh bridge for on-screen meter readings.
//!
//! Polls a device's VNC display, OCRs the throughput and volume readings and
//! publishes them to Zenoh.

use anyhow::{Context, Result};
use screenmeter_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use zenoh_bridge_screenmeter::acquisition::{AcquisitionLoop, AcquisitionSettings};
use zenoh_bridge_screenmeter::config::ScreenmeterBridgeConfig;
use zenoh_bridge_screenmeter::diagnostics::DebugCaptures;
use zenoh_bridge_screenmeter::display::RfbConnector;
use zenoh_bridge_screenmeter::recognition::TesseractOcr;
use zenoh_bridge_screenmeter::sink::ZenohSink;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("screenmeter.json5");

    let config = ScreenmeterBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let settings = AcquisitionSettings::from_config(&config.screenmeter)
        .context("Invalid acquisition settings")?;
    let format = config.screenmeter.payload_format;

    let runner = BridgeRunner::new_with_args("screenmeter", config, Some(&args))
        .await
        .context("Failed to start bridge")?
        .with_format(format);

    let screenmeter = runner.config().screenmeter.clone();

    let diagnostics = if screenmeter.debug.enabled {
        Some(
            DebugCaptures::create(&screenmeter.debug.directory)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create debug directory {:?}",
                        screenmeter.debug.directory
                    )
                })?
                .with_max_files(screenmeter.debug.max_files),
        )
    } else {
        None
    };

    let sink = ZenohSink::declare(runner.publisher(), &screenmeter, &settings.metrics)
        .await
        .context("Failed to declare publishers")?;

    tracing::info!(
        device = %screenmeter.device.name,
        address = %settings.address,
        interval_secs = screenmeter.poll_interval_secs,
        timeout_secs = screenmeter.device.timeout_secs,
        format = ?format,
        "Screenmeter bridge configured"
    );

    let acquisition = AcquisitionLoop::new(
        RfbConnector,
        TesseractOcr::from_config(&screenmeter.ocr),
        sink,
        settings,
    )
    .with_diagnostics(diagnostics);

    runner
        .run(|shutdown| acquisition.run(shutdown))
        .await
        .context("Bridge terminated abnormally")?;

    Ok(())
}
