//! Zenoh bridge that reads a water meter off its VNC display.
//!
//! The bridge logs into the device's touch-screen UI over RFB, captures the
//! throughput and volume regions, runs OCR on them and publishes the values
//! to Zenoh.
//!
//! # Key Expressions
//!
//! ```text
//! screenmeter/<device>/throughput          plain integer (L/h)
//! screenmeter/<device>/volume              plain integer (L)
//! screenmeter/<device>/status              "online" / "offline" (retained)
//! screenmeter/@/discovery/<device>/<metric> JSON metadata (retained)
//! ```

pub mod acquisition;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod display;
pub mod filter;
pub mod metric;
pub mod recognition;
pub mod rfb;
pub mod sink;
