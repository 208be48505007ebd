//! The remote display session: capture and synthetic input.
//!
//! [`DisplayConnector`] opens sessions and [`RemoteDisplay`] is what a
//! session can do. The acquisition loop only talks to these traits; the RFB
//! implementation lives at the bottom of this module.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::rfb::{BUTTON_LEFT, Rect, RfbClient, RfbError};

/// Display session errors.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: RfbError,
    },
    #[error("Connection to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error(transparent)]
    Protocol(#[from] RfbError),
}

/// Invalid screen region.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("expected \"x,y,width,height\", got {0:?}")]
    Syntax(String),
    #[error("region must have a non-zero width and height")]
    Empty,
    #[error("region exceeds 16-bit screen coordinates")]
    Overflow,
}

/// A rectangle on the device screen.
///
/// Always non-empty and addressable with 16-bit coordinates. Configured
/// either as `"x,y,width,height"` or as `{ x, y, width, height }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionSpec", into = "String")]
pub struct Region {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
}

impl Region {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Result<Self, RegionError> {
        Self::checked(x.into(), y.into(), width.into(), height.into())
    }

    fn checked(x: u64, y: u64, width: u64, height: u64) -> Result<Self, RegionError> {
        if width == 0 || height == 0 {
            return Err(RegionError::Empty);
        }
        let max = u64::from(u16::MAX);
        if x.saturating_add(width) > max || y.saturating_add(height) > max {
            return Err(RegionError::Overflow);
        }
        // Bounded by the check above.
        Ok(Self {
            x: x as u16,
            y: y as u16,
            width: width as u16,
            height: height as u16,
        })
    }

    pub fn x(&self) -> u16 {
        self.x
    }

    pub fn y(&self) -> u16 {
        self.y
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }
}

impl FromStr for Region {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || RegionError::Syntax(s.to_string());

        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u64>().map_err(|_| syntax()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts[..] {
            [x, y, width, height] => Self::checked(x, y, width, height),
            _ => Err(syntax()),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.to_string()
    }
}

impl From<Region> for Rect {
    fn from(region: Region) -> Self {
        Rect::new(region.x, region.y, region.width, region.height)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionSpec {
    Text(String),
    Object {
        x: u64,
        y: u64,
        width: u64,
        height: u64,
    },
}

impl TryFrom<RegionSpec> for Region {
    type Error = RegionError;

    fn try_from(spec: RegionSpec) -> Result<Self, Self::Error> {
        match spec {
            RegionSpec::Text(text) => text.parse(),
            RegionSpec::Object {
                x,
                y,
                width,
                height,
            } => Self::checked(x, y, width, height),
        }
    }
}

/// A point on the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// One step of the login macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LoginStep {
    /// Move to the point and click the left button.
    Click { x: u16, y: u16 },
    /// Type the device secret, one key press per character.
    Secret,
    /// Wait before the next step.
    Pause { ms: u64 },
}

/// The scripted input sequence that unlocks the device UI.
///
/// Success is not observable; the next capture is the only check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginScript {
    pub steps: Vec<LoginStep>,
    /// Delay after the last step before the screen is trusted.
    pub settle: Duration,
}

impl LoginScript {
    /// Touch-screen sequence for the device's stock firmware: open the menu,
    /// focus the code field, type the secret, confirm, close the dialog.
    pub fn default_steps() -> Vec<LoginStep> {
        vec![
            LoginStep::Click { x: 160, y: 100 },
            LoginStep::Click { x: 160, y: 50 },
            LoginStep::Secret,
            LoginStep::Click { x: 290, y: 217 },
            LoginStep::Click { x: 250, y: 210 },
        ]
    }

    pub fn has_secret_step(&self) -> bool {
        self.steps.contains(&LoginStep::Secret)
    }
}

impl Default for LoginScript {
    fn default() -> Self {
        Self {
            steps: Self::default_steps(),
            settle: Duration::from_secs(1),
        }
    }
}

/// Network location of the device's RFB service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens display sessions.
pub trait DisplayConnector: Send + Sync {
    type Session: RemoteDisplay;

    /// Connect and run the protocol handshake, bounded by `timeout`.
    fn connect(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Session, DisplayError>> + Send;
}

/// A live session with the device screen.
pub trait RemoteDisplay: Send {
    /// Capture a region of the current screen.
    fn capture_region(
        &mut self,
        region: Region,
    ) -> impl Future<Output = Result<RgbImage, DisplayError>> + Send;

    /// Capture the whole screen.
    fn capture_full(&mut self) -> impl Future<Output = Result<RgbImage, DisplayError>> + Send;

    /// Move the pointer with `buttons` held.
    fn pointer(
        &mut self,
        x: u16,
        y: u16,
        buttons: u8,
    ) -> impl Future<Output = Result<(), DisplayError>> + Send;

    /// Press and release the key for `ch`.
    fn key_press(&mut self, ch: char) -> impl Future<Output = Result<(), DisplayError>> + Send;

    /// Move, press, release.
    fn click(&mut self, point: Point) -> impl Future<Output = Result<(), DisplayError>> + Send {
        async move {
            self.pointer(point.x, point.y, 0).await?;
            self.pointer(point.x, point.y, BUTTON_LEFT).await?;
            self.pointer(point.x, point.y, 0).await
        }
    }

    /// Play the login macro, then wait for the UI to settle.
    fn authenticate(
        &mut self,
        script: &LoginScript,
        secret: &str,
    ) -> impl Future<Output = Result<(), DisplayError>> + Send {
        async move {
            for step in &script.steps {
                match *step {
                    LoginStep::Click { x, y } => self.click(Point::new(x, y)).await?,
                    LoginStep::Secret => {
                        for ch in secret.chars() {
                            self.key_press(ch).await?;
                        }
                    }
                    LoginStep::Pause { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
                }
            }
            tokio::time::sleep(script.settle).await;
            Ok(())
        }
    }

    /// Click somewhere harmless so the device keeps the session open.
    fn keepalive(&mut self, point: Point) -> impl Future<Output = Result<(), DisplayError>> + Send {
        self.click(point)
    }
}

/// Connects to the device over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RfbConnector;

async fn open_session(address: &DeviceAddress) -> Result<RfbClient<TcpStream>, RfbError> {
    let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
    stream.set_nodelay(true)?;
    RfbClient::handshake(stream).await
}

impl DisplayConnector for RfbConnector {
    type Session = RfbClient<TcpStream>;

    async fn connect(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<Self::Session, DisplayError> {
        match tokio::time::timeout(timeout, open_session(address)).await {
            Ok(Ok(client)) => {
                tracing::info!(
                    address = %address,
                    version = %client.version(),
                    width = client.width(),
                    height = client.height(),
                    "Connected to remote display"
                );
                Ok(client)
            }
            Ok(Err(source)) => Err(DisplayError::Connect {
                address: address.to_string(),
                source,
            }),
            Err(_) => Err(DisplayError::Timeout {
                address: address.to_string(),
                timeout,
            }),
        }
    }
}

impl<S> RemoteDisplay for RfbClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn capture_region(&mut self, region: Region) -> Result<RgbImage, DisplayError> {
        Ok(self.capture(region.into()).await?)
    }

    async fn capture_full(&mut self) -> Result<RgbImage, DisplayError> {
        Ok(RfbClient::capture_full(self).await?)
    }

    async fn pointer(&mut self, x: u16, y: u16, buttons: u8) -> Result<(), DisplayError> {
        Ok(self.pointer_event(buttons, x, y).await?)
    }

    async fn key_press(&mut self, ch: char) -> Result<(), DisplayError> {
        Ok(RfbClient::key_press(self, ch).await?)
    }
}
