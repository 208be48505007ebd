//! Remote framebuffer (VNC) client.
//!
//! Implements the subset of RFB 3.3/3.7/3.8 needed to read a device screen:
//! version and security handshake (security type None only), Raw encoding,
//! full update requests, and pointer/key events.

mod client;
mod framebuffer;
pub mod protocol;

use thiserror::Error;

pub use client::{RfbClient, ServerInit};
pub use framebuffer::Framebuffer;
pub use protocol::{BUTTON_LEFT, PixelFormat, ProtocolVersion, Rect};

/// RFB protocol errors.
#[derive(Debug, Error)]
pub enum RfbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid protocol banner {0:?}")]
    InvalidVersion(String),
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(ProtocolVersion),
    #[error("Server refused connection: {0}")]
    Refused(String),
    #[error("No supported security type offered (server offered {0:?})")]
    NoSupportedSecurity(Vec<u8>),
    #[error("Security handshake failed: {0}")]
    SecurityFailed(String),
    #[error("Unexpected encoding {0}")]
    UnexpectedEncoding(i32),
    #[error("Unexpected server message type {0}")]
    UnexpectedMessage(u8),
    #[error("Region {rect} is outside the {width}x{height} screen")]
    OutOfBounds { rect: Rect, width: u16, height: u16 },
}
