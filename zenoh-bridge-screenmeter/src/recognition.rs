//! Turning a captured region into an integer reading.
//!
//! The pipeline has four steps:
//!
//! 1. OCR the image into text ([`TextRecognizer`])
//! 2. Take the first capture group of the metric's [`ExtractionPattern`]
//! 3. Normalize the group into a numeric-looking string ([`normalize_token`])
//! 4. Coerce it to an integer, truncating toward zero ([`to_integer`])
//!
//! Steps 2 to 4 are pure and live in [`parse_reading`].

use std::future::Future;
use std::io::Cursor;
use std::process::Stdio;

use image::{ImageFormat, RgbImage};
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::OcrConfig;

/// OCR engine errors.
///
/// An image the engine cannot read is not an error; it yields empty text.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Failed to run OCR engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid extraction pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("pattern must have exactly one capture group, found {0}")]
    GroupCount(usize),
}

/// A regular expression with exactly one capture group.
#[derive(Debug, Clone)]
pub struct ExtractionPattern {
    regex: Regex,
}

impl ExtractionPattern {
    /// Compile `pattern`, rejecting anything without exactly one group.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern)?;
        // captures_len counts the implicit whole-match group.
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(PatternError::GroupCount(groups));
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// First match anywhere in `text`, group 1, trimmed.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|group| group.as_str().trim())
    }
}

/// Keep only `[0-9.,-]` and turn decimal commas into points.
pub fn clean_numeric(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

/// Normalize an extracted group; `None` when nothing numeric is left.
///
/// A lone `O`/`o` is the glyph the OCR engine most often returns for `0`.
pub fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim();
    let token = if token == "O" || token == "o" {
        "0"
    } else {
        token
    };

    let cleaned = clean_numeric(token);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Parse a decimal string and truncate toward zero.
pub fn to_integer(token: &str) -> Option<i64> {
    let value: f64 = token.parse().ok()?;
    // i64::MAX as f64 rounds up to 2^63, which no longer fits.
    if !value.is_finite() || value >= i64::MAX as f64 || value < i64::MIN as f64 {
        return None;
    }
    Some(value.trunc() as i64)
}

/// Run steps 2 to 4 over OCR output.
pub fn parse_reading(text: &str, pattern: &ExtractionPattern) -> Option<i64> {
    let group = pattern.extract(text)?;
    let token = normalize_token(group)?;
    to_integer(&token)
}

/// An OCR engine.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in `image`, with surrounding whitespace trimmed.
    fn recognize(&self, image: &RgbImage) -> impl Future<Output = Result<String, OcrError>> + Send;
}

/// Tesseract, driven through its command-line interface.
///
/// Equivalent to `tesseract stdin stdout -l <language> <config...>` with the
/// PNG-encoded region on standard input.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
    extra_args: Vec<String>,
}

impl TesseractOcr {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            language: config.language.clone(),
            extra_args: config.config.split_whitespace().map(String::from).collect(),
        }
    }

    /// Arguments passed to the engine, excluding the command itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl TextRecognizer for TesseractOcr {
    async fn recognize(&self, image: &RgbImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            tracing::warn!(
                command = %self.command,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "OCR engine could not read image"
            );
            return Ok(String::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
