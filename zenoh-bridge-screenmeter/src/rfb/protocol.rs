//! RFB wire constants and client message encoding (RFC 6143).

use super::RfbError;

/// Security type: the server refused the connection.
pub const SECURITY_INVALID: u8 = 0;
/// Security type: no authentication.
pub const SECURITY_NONE: u8 = 1;

/// Raw pixel encoding.
pub const ENCODING_RAW: i32 = 0;

/// Pointer button mask for the left button.
pub const BUTTON_LEFT: u8 = 1;

const MSG_SET_PIXEL_FORMAT: u8 = 0;
const MSG_SET_ENCODINGS: u8 = 2;
const MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
const MSG_KEY_EVENT: u8 = 4;
const MSG_POINTER_EVENT: u8 = 5;

/// Protocol version exchanged in the 12-byte `RFB xxx.yyy\n` banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const V3_3: Self = Self { major: 3, minor: 3 };
    pub const V3_7: Self = Self { major: 3, minor: 7 };
    pub const V3_8: Self = Self { major: 3, minor: 8 };

    /// Parse a server banner.
    pub fn parse(banner: &[u8; 12]) -> Result<Self, RfbError> {
        let invalid = || RfbError::InvalidVersion(String::from_utf8_lossy(banner).into_owned());

        let text = std::str::from_utf8(banner).map_err(|_| invalid())?;
        let (major, minor) = text
            .strip_prefix("RFB ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .and_then(|rest| rest.split_once('.'))
            .ok_or_else(invalid)?;

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }

    /// Pick the version to speak with a server announcing `server`.
    ///
    /// 3.4 to 3.6 are nonstandard and handled as 3.3. Servers announcing a
    /// newer major version are expected to accept 3.8.
    pub fn negotiate(server: Self) -> Result<Self, RfbError> {
        match (server.major, server.minor) {
            (3, 8..) => Ok(Self::V3_8),
            (3, 7) => Ok(Self::V3_7),
            (3, 3..=6) => Ok(Self::V3_3),
            (4.., _) => Ok(Self::V3_8),
            _ => Err(RfbError::UnsupportedVersion(server)),
        }
    }

    /// 3.7 and later let the client choose among offered security types.
    pub fn negotiates_security_list(&self) -> bool {
        *self >= Self::V3_7
    }

    /// 3.8 sends a SecurityResult even for security type None.
    pub fn reports_security_result(&self) -> bool {
        *self >= Self::V3_8
    }

    pub fn banner(&self) -> String {
        format!("RFB {:03}.{:03}\n", self.major, self.minor)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A screen rectangle in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle lies inside a `width` x `height` screen.
    pub fn fits_within(&self, width: u16, height: u16) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(height)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Pixel layout on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32 bits per pixel, 8 bits per channel, little-endian `xRGB`.
    pub const RGB888: Self = Self {
        bits_per_pixel: 32,
        depth: 24,
        big_endian: false,
        true_colour: true,
        red_max: 255,
        green_max: 255,
        blue_max: 255,
        red_shift: 16,
        green_shift: 8,
        blue_shift: 0,
    };

    pub fn from_bytes(b: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: b[0],
            depth: b[1],
            big_endian: b[2] != 0,
            true_colour: b[3] != 0,
            red_max: u16::from_be_bytes([b[4], b[5]]),
            green_max: u16::from_be_bytes([b[6], b[7]]),
            blue_max: u16::from_be_bytes([b[8], b[9]]),
            red_shift: b[10],
            green_shift: b[11],
            blue_shift: b[12],
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let [rh, rl] = self.red_max.to_be_bytes();
        let [gh, gl] = self.green_max.to_be_bytes();
        let [bh, bl] = self.blue_max.to_be_bytes();
        [
            self.bits_per_pixel,
            self.depth,
            u8::from(self.big_endian),
            u8::from(self.true_colour),
            rh,
            rl,
            gh,
            gl,
            bh,
            bl,
            self.red_shift,
            self.green_shift,
            self.blue_shift,
            0,
            0,
            0,
        ]
    }

    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8)
    }

    /// Decode one pixel into 8-bit RGB.
    ///
    /// `pixel` must hold exactly [`bytes_per_pixel`](Self::bytes_per_pixel)
    /// bytes; anything else decodes as black.
    pub fn decode(&self, pixel: &[u8]) -> [u8; 3] {
        if pixel.len() != self.bytes_per_pixel() {
            return [0, 0, 0];
        }
        let raw = match *pixel {
            [a] => u32::from(a),
            [a, b] if self.big_endian => u32::from(u16::from_be_bytes([a, b])),
            [a, b] => u32::from(u16::from_le_bytes([a, b])),
            [a, b, c, d] if self.big_endian => u32::from_be_bytes([a, b, c, d]),
            [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
            _ => return [0, 0, 0],
        };
        [
            scale_channel(raw, self.red_shift, self.red_max),
            scale_channel(raw, self.green_shift, self.green_max),
            scale_channel(raw, self.blue_shift, self.blue_max),
        ]
    }
}

fn scale_channel(raw: u32, shift: u8, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    let value = raw.checked_shr(u32::from(shift)).unwrap_or(0) & u32::from(max);
    (value * 255 / u32::from(max)) as u8
}

pub fn set_pixel_format(format: &PixelFormat) -> Vec<u8> {
    let mut msg = vec![MSG_SET_PIXEL_FORMAT, 0, 0, 0];
    msg.extend_from_slice(&format.to_bytes());
    msg
}

pub fn set_encodings(encodings: &[i32]) -> Vec<u8> {
    let count = u16::try_from(encodings.len()).unwrap_or(u16::MAX);
    let mut msg = vec![MSG_SET_ENCODINGS, 0];
    msg.extend_from_slice(&count.to_be_bytes());
    for encoding in encodings.iter().take(usize::from(count)) {
        msg.extend_from_slice(&encoding.to_be_bytes());
    }
    msg
}

pub fn framebuffer_update_request(incremental: bool, rect: Rect) -> Vec<u8> {
    let mut msg = vec![MSG_FRAMEBUFFER_UPDATE_REQUEST, u8::from(incremental)];
    for field in [rect.x, rect.y, rect.width, rect.height] {
        msg.extend_from_slice(&field.to_be_bytes());
    }
    msg
}

pub fn key_event(down: bool, keysym: u32) -> Vec<u8> {
    let mut msg = vec![MSG_KEY_EVENT, u8::from(down), 0, 0];
    msg.extend_from_slice(&keysym.to_be_bytes());
    msg
}

pub fn pointer_event(buttons: u8, x: u16, y: u16) -> Vec<u8> {
    let mut msg = vec![MSG_POINTER_EVENT, buttons];
    msg.extend_from_slice(&x.to_be_bytes());
    msg.extend_from_slice(&y.to_be_bytes());
    msg
}

/// X11 keysym for a typed character.
pub fn keysym_for(ch: char) -> u32 {
    match ch {
        '\u{8}' => 0xff08,
        '\t' => 0xff09,
        '\n' | '\r' => 0xff0d,
        '\u{1b}' => 0xff1b,
        // Latin-1 keysyms equal their code points.
        ' '..='~' | '\u{a0}'..='\u{ff}' => ch as u32,
        _ => 0x0100_0000 | ch as u32,
    }
}
