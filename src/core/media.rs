use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose};

use crate::error::DataUriError;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// An inline `data:<mimetype>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    data: String,
}

impl DataUri {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 payload exactly as carried by the URI.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        Ok(general_purpose::STANDARD.decode(&self.data)?)
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(SCHEME).ok_or(DataUriError::MissingScheme)?;
        let (media_type, data) = rest
            .split_once(BASE64_MARKER)
            .ok_or(DataUriError::NotBase64)?;

        // Parameters such as `;charset=utf-8` are dropped; only `type/subtype`
        // is forwarded as the MIME type.
        let mime_type = media_type.split(';').next().unwrap_or_default().trim();
        let valid_mime = mime_type
            .split_once('/')
            .is_some_and(|(kind, sub)| !kind.is_empty() && !sub.is_empty())
            && !mime_type.contains(char::is_whitespace);
        if !valid_mime {
            return Err(DataUriError::MissingMimeType);
        }
        if data.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        general_purpose::STANDARD.decode(data)?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{BASE64_MARKER}{}", self.mime_type, self.data)
    }
}

/// Best-effort MIME type for an image file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}
