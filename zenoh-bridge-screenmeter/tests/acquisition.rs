//! Acquisition loop behaviour against in-memory fakes.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbImage;
use screenmeter_bridge_framework::{Availability, BridgeConfig, BridgeError, CancellationToken};
use zenoh_bridge_screenmeter::acquisition::{AcquisitionLoop, AcquisitionSettings, CycleOutcome};
use zenoh_bridge_screenmeter::config::ScreenmeterBridgeConfig;
use zenoh_bridge_screenmeter::diagnostics::DebugCaptures;
use zenoh_bridge_screenmeter::display::{
    DeviceAddress, DisplayConnector, DisplayError, LoginScript, Point, Region, RemoteDisplay,
};
use zenoh_bridge_screenmeter::metric::Metric;
use zenoh_bridge_screenmeter::recognition::{OcrError, TextRecognizer};
use zenoh_bridge_screenmeter::rfb::RfbError;
use zenoh_bridge_screenmeter::sink::PublicationSink;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeviceState {
    log: Vec<String>,
    connect_failures: usize,
    auth_failures: usize,
    captures: usize,
    failing_captures: HashSet<usize>,
    rejected_captures: HashSet<usize>,
    keepalive_fails: bool,
}

/// Shared handle to the fake device.
#[derive(Clone, Default)]
struct FakeDevice(Arc<Mutex<DeviceState>>);

impl FakeDevice {
    fn log(&self) -> Vec<String> {
        self.0.lock().unwrap().log.clone()
    }

    fn clear_log(&self) {
        self.0.lock().unwrap().log.clear();
    }

    fn with<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }
}

fn io_error() -> DisplayError {
    DisplayError::Protocol(RfbError::Io(std::io::ErrorKind::ConnectionReset.into()))
}

struct FakeConnector(FakeDevice);

impl DisplayConnector for FakeConnector {
    type Session = FakeDisplay;

    async fn connect(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<FakeDisplay, DisplayError> {
        self.0.with(|s| {
            s.log.push("connect".to_string());
            if s.connect_failures > 0 {
                s.connect_failures -= 1;
                return Err(DisplayError::Timeout {
                    address: address.to_string(),
                    timeout,
                });
            }
            Ok(FakeDisplay(self.0.clone()))
        })
    }
}

struct FakeDisplay(FakeDevice);

impl RemoteDisplay for FakeDisplay {
    async fn capture_region(&mut self, region: Region) -> Result<RgbImage, DisplayError> {
        self.0.with(|s| {
            s.captures += 1;
            s.log.push(format!("capture {}", region));
            if s.failing_captures.contains(&s.captures) {
                return Err(io_error());
            }
            if s.rejected_captures.contains(&s.captures) {
                return Err(DisplayError::Protocol(RfbError::OutOfBounds {
                    rect: region.into(),
                    width: 320,
                    height: 240,
                }));
            }
            Ok(RgbImage::new(
                u32::from(region.width()),
                u32::from(region.height()),
            ))
        })
    }

    async fn capture_full(&mut self) -> Result<RgbImage, DisplayError> {
        self.0.with(|s| s.log.push("capture full".to_string()));
        Ok(RgbImage::new(8, 8))
    }

    async fn pointer(&mut self, x: u16, y: u16, buttons: u8) -> Result<(), DisplayError> {
        self.0
            .with(|s| s.log.push(format!("pointer {} {} {}", x, y, buttons)));
        Ok(())
    }

    async fn key_press(&mut self, ch: char) -> Result<(), DisplayError> {
        self.0.with(|s| s.log.push(format!("key {}", ch)));
        Ok(())
    }

    async fn authenticate(
        &mut self,
        _script: &LoginScript,
        secret: &str,
    ) -> Result<(), DisplayError> {
        self.0.with(|s| {
            s.log.push(format!("authenticate {}", secret));
            if s.auth_failures > 0 {
                s.auth_failures -= 1;
                return Err(io_error());
            }
            Ok(())
        })
    }

    async fn keepalive(&mut self, point: Point) -> Result<(), DisplayError> {
        self.0.with(|s| {
            s.log.push(format!("keepalive {} {}", point.x, point.y));
            if s.keepalive_fails {
                return Err(io_error());
            }
            Ok(())
        })
    }
}

/// Returns queued OCR texts in order; an exhausted queue reads as blank.
#[derive(Clone, Default)]
struct ScriptedOcr {
    texts: Arc<Mutex<VecDeque<Result<String, String>>>>,
}

impl ScriptedOcr {
    fn push(&self, text: &str) {
        self.texts.lock().unwrap().push_back(Ok(text.to_string()));
    }

    fn push_cycle(&self, throughput: &str, volume: &str) {
        self.push(throughput);
        self.push(volume);
    }

    fn push_error(&self) {
        self.texts
            .lock()
            .unwrap()
            .push_back(Err("engine crashed".to_string()));
    }
}

impl TextRecognizer for ScriptedOcr {
    async fn recognize(&self, _image: &RgbImage) -> Result<String, OcrError> {
        match self.texts.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(OcrError::Io(std::io::Error::other(msg))),
            None => Ok(String::new()),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    readings: Arc<Mutex<Vec<(Metric, i64)>>>,
    availability: Arc<Mutex<Vec<Availability>>>,
    fail_publish: bool,
    cancel: Option<(usize, CancellationToken)>,
}

impl RecordingSink {
    fn readings_of(&self, metric: Metric) -> Vec<i64> {
        self.readings
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl PublicationSink for RecordingSink {
    async fn publish_reading(&self, metric: Metric, value: i64) -> Result<(), BridgeError> {
        let count = {
            let mut readings = self.readings.lock().unwrap();
            readings.push((metric, value));
            readings.len()
        };
        if let Some((after, token)) = &self.cancel {
            if count >= *after {
                token.cancel();
            }
        }
        if self.fail_publish {
            return Err(BridgeError::publish(metric.as_str(), "bus unreachable"));
        }
        Ok(())
    }

    async fn publish_availability(&self, availability: Availability) -> Result<(), BridgeError> {
        self.availability.lock().unwrap().push(availability);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn settings() -> AcquisitionSettings {
    let config = ScreenmeterBridgeConfig::from_json5(
        r#"{
            zenoh: {},
            screenmeter: { device: { host: "perla.lan", secret: "1234" } },
        }"#,
    )
    .unwrap();

    let mut settings = AcquisitionSettings::from_config(&config.screenmeter).unwrap();
    settings.settle_delay = Duration::ZERO;
    settings.poll_interval = Duration::ZERO;
    settings.login.settle = Duration::ZERO;
    settings
}

struct Harness {
    device: FakeDevice,
    ocr: ScriptedOcr,
    sink: RecordingSink,
    acquisition: AcquisitionLoop<FakeConnector, ScriptedOcr, RecordingSink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_sink(RecordingSink::default())
    }

    fn with_sink(sink: RecordingSink) -> Self {
        let device = FakeDevice::default();
        let ocr = ScriptedOcr::default();
        let acquisition = AcquisitionLoop::new(
            FakeConnector(device.clone()),
            ocr.clone(),
            sink.clone(),
            settings(),
        );
        Self {
            device,
            ocr,
            sink,
            acquisition,
        }
    }
}

fn completed(accepted: &[(Metric, i64)]) -> CycleOutcome {
    CycleOutcome::Completed {
        accepted: accepted.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_first_cycle_connects_reads_and_keeps_alive() {
    let mut h = Harness::new();
    h.ocr.push_cycle("12.5|/h", "1000|.");

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(
        outcome,
        completed(&[(Metric::Throughput, 12), (Metric::Volume, 1000)])
    );
    assert!(h.acquisition.is_connected());
    assert_eq!(
        h.device.log(),
        vec![
            "connect",
            "authenticate 1234",
            "capture 60,70,80,25",
            "capture 70,150,60,24",
            "keepalive 400 0",
        ]
    );
}

#[tokio::test]
async fn test_identical_readings_are_published_once() {
    let mut h = Harness::new();
    h.ocr.push_cycle("12.5|/h", "1000|.");
    h.ocr.push_cycle("12.5|/h", "1000|.");

    h.acquisition.run_cycle().await;
    let second = h.acquisition.run_cycle().await;

    assert_eq!(second, completed(&[]));
    assert_eq!(h.sink.readings_of(Metric::Throughput), vec![12]);
    assert_eq!(h.sink.readings_of(Metric::Volume), vec![1000]);
    // The session is reused.
    assert_eq!(
        h.device.log().iter().filter(|e| *e == "connect").count(),
        1
    );
}

#[tokio::test]
async fn test_volume_sequence_suppresses_jump() {
    let mut h = Harness::new();
    for volume in ["1000|.", "1040|.", "1200|.", "0|."] {
        h.ocr.push_cycle("5/h", volume);
    }

    for _ in 0..4 {
        h.acquisition.run_cycle().await;
    }

    assert_eq!(h.sink.readings_of(Metric::Volume), vec![1000, 1040, 0]);
    assert_eq!(h.acquisition.filter().last_accepted(Metric::Volume), Some(0));
}

#[tokio::test]
async fn test_recognition_miss_resets_session() {
    let mut h = Harness::new();
    h.ocr.push("-- no reading --");

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::SessionReset {
            metric: Metric::Throughput
        }
    );
    assert!(!h.acquisition.is_connected());
    // Login replayed in the same cycle; volume never captured.
    assert_eq!(
        h.device.log(),
        vec![
            "connect",
            "authenticate 1234",
            "capture 60,70,80,25",
            "authenticate 1234",
        ]
    );
    assert!(h.sink.readings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_next_cycle_after_miss_starts_with_fresh_login() {
    let mut h = Harness::new();
    h.ocr.push("12.5|/h");
    h.ocr.push("unreadable");
    h.acquisition.run_cycle().await;

    h.device.clear_log();
    h.ocr.push_cycle("13/h", "1000|.");
    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(
        outcome,
        completed(&[(Metric::Throughput, 13), (Metric::Volume, 1000)])
    );
    assert_eq!(&h.device.log()[..3], &["connect", "authenticate 1234", "capture 60,70,80,25"]);
}

#[tokio::test]
async fn test_capture_failure_on_volume_keeps_throughput() {
    let mut h = Harness::new();
    h.device.with(|s| {
        s.failing_captures.insert(2);
    });
    h.ocr.push("12/h");

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::SessionReset {
            metric: Metric::Volume
        }
    );
    assert_eq!(h.sink.readings_of(Metric::Throughput), vec![12]);
    assert!(!h.device.log().iter().any(|e| e.starts_with("keepalive")));
    assert!(!h.acquisition.is_connected());
}

#[tokio::test]
async fn test_non_numeric_match_is_a_miss() {
    let mut h = Harness::new();
    h.ocr.push("abc./h");

    let outcome = h.acquisition.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::SessionReset {
            metric: Metric::Throughput
        }
    );
}

#[tokio::test]
async fn test_connect_failure_aborts_cycle() {
    let mut h = Harness::new();
    h.device.with(|s| s.connect_failures = 1);

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::ConnectFailed);
    assert!(!h.acquisition.is_connected());
    assert_eq!(h.device.log(), vec!["connect"]);

    h.ocr.push_cycle("1/h", "1|.");
    assert!(matches!(
        h.acquisition.run_cycle().await,
        CycleOutcome::Completed { .. }
    ));
}

#[tokio::test]
async fn test_login_failure_aborts_cycle() {
    let mut h = Harness::new();
    h.device.with(|s| s.auth_failures = 1);

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::ConnectFailed);
    assert!(!h.acquisition.is_connected());
    assert_eq!(h.device.log(), vec!["connect", "authenticate 1234"]);
}

#[tokio::test]
async fn test_ocr_engine_error_drops_session_without_replay() {
    let mut h = Harness::new();
    h.ocr.push_error();

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::Faulted);
    assert!(!h.acquisition.is_connected());
    assert_eq!(
        h.device.log(),
        vec!["connect", "authenticate 1234", "capture 60,70,80,25"]
    );
}

#[tokio::test]
async fn test_keepalive_failure_drops_session() {
    let mut h = Harness::new();
    h.device.with(|s| s.keepalive_fails = true);
    h.ocr.push_cycle("1/h", "1|.");

    let outcome = h.acquisition.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::Faulted);
    assert!(!h.acquisition.is_connected());
    // Readings were still published before the keepalive.
    assert_eq!(h.sink.readings.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_publish_failure_still_advances_filter() {
    let mut h = Harness::with_sink(RecordingSink {
        fail_publish: true,
        ..Default::default()
    });
    h.ocr.push_cycle("12/h", "1000|.");
    h.ocr.push_cycle("12/h", "1000|.");

    let first = h.acquisition.run_cycle().await;
    h.acquisition.run_cycle().await;

    // Accepted by the filter even though the sink refused them.
    assert_eq!(
        first,
        completed(&[(Metric::Throughput, 12), (Metric::Volume, 1000)])
    );
    assert_eq!(
        h.acquisition.filter().last_accepted(Metric::Throughput),
        Some(12)
    );
    // No retry flood: the unchanged throughput is not attempted again.
    assert_eq!(h.sink.readings_of(Metric::Throughput), vec![12]);
}

#[tokio::test]
async fn test_run_publishes_availability_around_cycles() {
    let token = CancellationToken::new();
    let h = Harness::with_sink(RecordingSink {
        cancel: Some((4, token.clone())),
        ..Default::default()
    });
    h.ocr.push_cycle("1/h", "100|.");
    h.ocr.push_cycle("2/h", "110|.");
    h.ocr.push_cycle("3/h", "120|.");

    let sink = h.sink.clone();
    tokio::time::timeout(Duration::from_secs(5), h.acquisition.run(token))
        .await
        .unwrap();

    assert_eq!(
        *sink.availability.lock().unwrap(),
        vec![Availability::Online, Availability::Offline]
    );
    // Cancellation is honoured at the cycle boundary, never mid-cycle.
    assert_eq!(sink.readings.lock().unwrap().len(), 4);
    assert_eq!(
        h.device.log().iter().filter(|e| e.starts_with("keepalive")).count(),
        2
    );
}

#[tokio::test]
async fn test_run_with_cancelled_token_never_connects() {
    let token = CancellationToken::new();
    token.cancel();
    let h = Harness::new();
    let sink = h.sink.clone();

    h.acquisition.run(token).await;

    assert!(h.device.log().is_empty());
    assert_eq!(
        *sink.availability.lock().unwrap(),
        vec![Availability::Online, Availability::Offline]
    );
}

#[tokio::test]
async fn test_debug_captures_on_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let captures = DebugCaptures::create(tmp.path()).await.unwrap();

    let h = Harness::new();
    let mut acquisition = h.acquisition.with_diagnostics(Some(captures));
    h.ocr.push("nothing here");

    acquisition.run_cycle().await;

    let mut names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("fullscreen-"));
    assert!(names[1].starts_with("throughput-"));
    assert!(h.device.log().contains(&"capture full".to_string()));
}

async fn debug_files_after_capture_fault(
    configure: impl FnOnce(&mut DeviceState),
) -> (Vec<String>, Vec<String>) {
    let tmp = tempfile::tempdir().unwrap();
    let captures = DebugCaptures::create(tmp.path()).await.unwrap();

    let h = Harness::new();
    h.device.with(configure);
    let mut acquisition = h.acquisition.with_diagnostics(Some(captures));

    let outcome = acquisition.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::SessionReset {
            metric: Metric::Throughput
        }
    );

    let mut names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    (names, h.device.log())
}

#[tokio::test]
async fn test_no_snapshot_after_broken_capture() {
    let (files, log) = debug_files_after_capture_fault(|s| {
        s.failing_captures.insert(1);
    })
    .await;

    assert!(files.is_empty());
    assert!(!log.contains(&"capture full".to_string()));
    // The login macro is still replayed.
    assert_eq!(log.last().map(String::as_str), Some("authenticate 1234"));
}

#[tokio::test]
async fn test_snapshot_after_rejected_region() {
    let (files, log) = debug_files_after_capture_fault(|s| {
        s.rejected_captures.insert(1);
    })
    .await;

    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("fullscreen-"));
    assert!(log.contains(&"capture full".to_string()));
}
