use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

const DEFAULT_MIME: &str = "application/octet-stream";

/// A fully materialized `data:<mime>;base64,<payload>` image.
///
/// Every image that crosses the gateway boundary is held in this form so the
/// session never references an external URL or a file on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataUriError {
    #[error("image data must start with `data:`")]
    MissingScheme,
    #[error("image data is missing the `,` payload separator")]
    MissingSeparator,
    #[error("image data must be base64 encoded")]
    NotBase64,
    #[error("image data payload is empty")]
    Empty,
    #[error("image data payload is not valid base64: {0}")]
    InvalidBase64(String),
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_MIME.to_string()
        } else {
            mime_type.trim().to_ascii_lowercase()
        };
        Self { mime_type, bytes }
    }

    pub fn parse(raw: &str) -> Result<Self, DataUriError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or(DataUriError::MissingScheme)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(DataUriError::MissingSeparator)?;
        let mut segments = header.split(';');
        let mime_type = segments.next().unwrap_or_default().to_string();
        if !segments.any(|segment| segment.trim().eq_ignore_ascii_case("base64")) {
            return Err(DataUriError::NotBase64);
        }
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(DataUriError::Empty);
        }
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|err| DataUriError::InvalidBase64(err.to_string()))?;
        if bytes.is_empty() {
            return Err(DataUriError::Empty);
        }
        Ok(Self::new(mime_type, bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the declared mime type.
    pub fn extension(&self) -> &'static str {
        let lowered = self.mime_type.as_str();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("png") {
            return "png";
        }
        "bin"
    }

    /// Short content hash used to tie derived artifacts to their source.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.mime_type.as_bytes());
        hasher.update(&self.bytes);
        hex::encode(&hasher.finalize()[..8])
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

// Payloads run to megabytes; keep debug output readable.
impl fmt::Debug for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUri")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
