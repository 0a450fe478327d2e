use std::fmt;
use std::str::FromStr;

use super::SerializationError;

/// The content types a `SerializationManager` can encode and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Json,
    Bitcode,
    PlainText,
}

impl ContentType {
    pub const JSON: &'static str = "application/json";
    pub const BITCODE: &'static str = "application/x-bitcode";
    pub const PLAIN_TEXT: &'static str = "text/plain";

    /// The MIME value written to transport envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => Self::JSON,
            ContentType::Bitcode => Self::BITCODE,
            ContentType::PlainText => Self::PLAIN_TEXT,
        }
    }

    /// Whether the encoded form is readable text (used by message logs).
    pub fn is_textual(&self) -> bool {
        !matches!(self, ContentType::Bitcode)
    }
}

impl FromStr for ContentType {
    type Err = SerializationError;

    /// Parse a MIME value, ignoring parameters such as `; charset=utf-8`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            Self::JSON | "text/json" => Ok(ContentType::Json),
            Self::BITCODE => Ok(ContentType::Bitcode),
            Self::PLAIN_TEXT => Ok(ContentType::PlainText),
            _ => Err(SerializationError::UnsupportedContentType(value.to_string())),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
