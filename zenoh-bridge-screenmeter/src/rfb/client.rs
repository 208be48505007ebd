//! RFB client over any async byte stream.

use image::RgbImage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::RfbError;
use super::framebuffer::Framebuffer;
use super::protocol::{self, PixelFormat, ProtocolVersion, Rect};

/// Longest reason string or desktop name we keep; the rest is discarded.
const MAX_TEXT_LEN: u32 = 64 * 1024;

const MSG_FRAMEBUFFER_UPDATE: u8 = 0;
const MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
const MSG_BELL: u8 = 2;
const MSG_SERVER_CUT_TEXT: u8 = 3;

/// Server parameters received after the handshake.
#[derive(Debug, Clone)]
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

/// A connected, initialised RFB session.
///
/// Only the Raw encoding is requested, and pixels are always requested in
/// [`PixelFormat::RGB888`].
#[derive(Debug)]
pub struct RfbClient<S> {
    stream: S,
    version: ProtocolVersion,
    name: String,
    pixel_format: PixelFormat,
    framebuffer: Framebuffer,
}

impl<S> RfbClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the protocol handshake on a freshly opened stream.
    pub async fn handshake(mut stream: S) -> Result<Self, RfbError> {
        let mut banner = [0u8; 12];
        stream.read_exact(&mut banner).await?;
        let server_version = ProtocolVersion::parse(&banner)?;
        let version = ProtocolVersion::negotiate(server_version)?;
        stream.write_all(version.banner().as_bytes()).await?;
        stream.flush().await?;

        tracing::debug!(server = %server_version, using = %version, "RFB version negotiated");

        negotiate_security(&mut stream, version).await?;

        // ClientInit: ask to share the desktop with other viewers.
        stream.write_all(&[1]).await?;
        stream.flush().await?;

        let init = read_server_init(&mut stream).await?;
        tracing::debug!(
            width = init.width,
            height = init.height,
            name = %init.name,
            "RFB server initialised"
        );

        let pixel_format = PixelFormat::RGB888;
        stream
            .write_all(&protocol::set_pixel_format(&pixel_format))
            .await?;
        stream
            .write_all(&protocol::set_encodings(&[protocol::ENCODING_RAW]))
            .await?;
        stream.flush().await?;

        Ok(Self {
            stream,
            version,
            name: init.name,
            pixel_format,
            framebuffer: Framebuffer::new(init.width, init.height),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u16 {
        self.framebuffer.width()
    }

    pub fn height(&self) -> u16 {
        self.framebuffer.height()
    }

    /// Fetch a fresh copy of `rect` from the server.
    pub async fn capture(&mut self, rect: Rect) -> Result<RgbImage, RfbError> {
        if !rect.fits_within(self.width(), self.height()) {
            return Err(RfbError::OutOfBounds {
                rect,
                width: self.width(),
                height: self.height(),
            });
        }
        self.refresh(rect).await?;
        self.framebuffer.crop(rect)
    }

    /// Fetch a fresh copy of the whole screen.
    pub async fn capture_full(&mut self) -> Result<RgbImage, RfbError> {
        let screen = Rect::new(0, 0, self.width(), self.height());
        self.refresh(screen).await?;
        Ok(self.framebuffer.snapshot())
    }

    /// Move the pointer to `(x, y)` with `buttons` held.
    pub async fn pointer_event(&mut self, buttons: u8, x: u16, y: u16) -> Result<(), RfbError> {
        self.send(&protocol::pointer_event(buttons, x, y)).await
    }

    /// Press and release the key producing `ch`.
    pub async fn key_press(&mut self, ch: char) -> Result<(), RfbError> {
        let keysym = protocol::keysym_for(ch);
        self.send(&protocol::key_event(true, keysym)).await?;
        self.send(&protocol::key_event(false, keysym)).await
    }

    async fn send(&mut self, msg: &[u8]) -> Result<(), RfbError> {
        self.stream.write_all(msg).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Request a full (non-incremental) update of `rect` and wait for it.
    async fn refresh(&mut self, rect: Rect) -> Result<(), RfbError> {
        self.send(&protocol::framebuffer_update_request(false, rect))
            .await?;
        while !self.read_server_message().await? {}
        Ok(())
    }

    /// Read one server message; returns `true` for a framebuffer update.
    async fn read_server_message(&mut self) -> Result<bool, RfbError> {
        match self.stream.read_u8().await? {
            MSG_FRAMEBUFFER_UPDATE => {
                self.read_framebuffer_update().await?;
                Ok(true)
            }
            MSG_SET_COLOUR_MAP_ENTRIES => {
                let mut header = [0u8; 5];
                self.stream.read_exact(&mut header).await?;
                let colours = u16::from_be_bytes([header[3], header[4]]);
                skip(&mut self.stream, u64::from(colours) * 6).await?;
                Ok(false)
            }
            MSG_BELL => Ok(false),
            MSG_SERVER_CUT_TEXT => {
                let mut padding = [0u8; 3];
                self.stream.read_exact(&mut padding).await?;
                let len = self.stream.read_u32().await?;
                skip(&mut self.stream, u64::from(len)).await?;
                Ok(false)
            }
            other => Err(RfbError::UnexpectedMessage(other)),
        }
    }

    async fn read_framebuffer_update(&mut self) -> Result<(), RfbError> {
        let _padding = self.stream.read_u8().await?;
        let rects = self.stream.read_u16().await?;

        for _ in 0..rects {
            let rect = Rect::new(
                self.stream.read_u16().await?,
                self.stream.read_u16().await?,
                self.stream.read_u16().await?,
                self.stream.read_u16().await?,
            );
            let encoding = self.stream.read_i32().await?;
            if encoding != protocol::ENCODING_RAW {
                return Err(RfbError::UnexpectedEncoding(encoding));
            }

            // Row by row keeps memory bounded whatever size the server claims.
            let mut row = vec![0u8; usize::from(rect.width) * self.pixel_format.bytes_per_pixel()];
            for line in 0..rect.height {
                self.stream.read_exact(&mut row).await?;
                let target = Rect::new(rect.x, rect.y.saturating_add(line), rect.width, 1);
                self.framebuffer
                    .paint_raw(target, &row, &self.pixel_format);
            }
        }

        Ok(())
    }
}

async fn negotiate_security<S>(stream: &mut S, version: ProtocolVersion) -> Result<(), RfbError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if !version.negotiates_security_list() {
        // 3.3: the server decides.
        return match stream.read_u32().await? {
            0 => Err(RfbError::Refused(read_text(stream).await?)),
            1 => Ok(()),
            other => Err(RfbError::NoSupportedSecurity(vec![
                u8::try_from(other).unwrap_or(u8::MAX),
            ])),
        };
    }

    let count = stream.read_u8().await?;
    if count == 0 {
        return Err(RfbError::Refused(read_text(stream).await?));
    }
    let mut offered = vec![0u8; usize::from(count)];
    stream.read_exact(&mut offered).await?;

    if !offered.contains(&protocol::SECURITY_NONE) {
        return Err(RfbError::NoSupportedSecurity(offered));
    }
    stream.write_all(&[protocol::SECURITY_NONE]).await?;
    stream.flush().await?;

    if version.reports_security_result() && stream.read_u32().await? != 0 {
        return Err(RfbError::SecurityFailed(read_text(stream).await?));
    }

    Ok(())
}

async fn read_server_init<S>(stream: &mut S) -> Result<ServerInit, RfbError>
where
    S: AsyncRead + Unpin,
{
    let width = stream.read_u16().await?;
    let height = stream.read_u16().await?;
    let mut format = [0u8; 16];
    stream.read_exact(&mut format).await?;
    let name = read_text(stream).await?;

    Ok(ServerInit {
        width,
        height,
        pixel_format: PixelFormat::from_bytes(&format),
        name,
    })
}

/// Read a `u32` length-prefixed string.
async fn read_text<S>(stream: &mut S) -> Result<String, RfbError>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u32().await?;
    let kept = len.min(MAX_TEXT_LEN);
    let mut buf = vec![0u8; kept as usize];
    stream.read_exact(&mut buf).await?;
    skip(stream, u64::from(len - kept)).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn skip<S>(stream: &mut S, len: u64) -> Result<(), RfbError>
where
    S: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut stream.take(len), &mut tokio::io::sink()).await?;
    if copied < len {
        return Err(RfbError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    Ok(())
}
