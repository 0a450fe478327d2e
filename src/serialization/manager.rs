use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ContentType, SerializationError};

/// Encodes and decodes values for a negotiated `ContentType`.
///
/// Shared by the messaging service and every broker plugin through
/// `Arc<SerializationManager>`.
#[derive(Debug, Clone, Default)]
pub struct SerializationManager {
    default_content_type: ContentType,
}

impl SerializationManager {
    /// Create a manager that falls back to JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type used when neither message nor entity declare one.
    pub fn with_default_content_type(mut self, content_type: ContentType) -> Self {
        self.default_content_type = content_type;
        self
    }

    pub fn default_content_type(&self) -> ContentType {
        self.default_content_type
    }

    /// Pick the content type for a send: the first declared value wins.
    pub fn negotiate(&self, declared: &[Option<&str>]) -> Result<ContentType, SerializationError> {
        match declared.iter().flatten().next() {
            Some(value) => value.parse(),
            None => Ok(self.default_content_type),
        }
    }

    /// Encode a value.
    pub fn serialize<T: Serialize + ?Sized>(
        &self,
        value: &T,
        content_type: ContentType,
    ) -> Result<Vec<u8>, SerializationError> {
        let encode_err = |reason: String| SerializationError::Encode {
            content_type: content_type.to_string(),
            reason,
        };

        match content_type {
            ContentType::Json => serde_json::to_vec(value).map_err(|e| encode_err(e.to_string())),
            ContentType::Bitcode => bitcode::serialize(value).map_err(|e| encode_err(e.to_string())),
            ContentType::PlainText => {
                let json = serde_json::to_value(value).map_err(|e| encode_err(e.to_string()))?;
                match json {
                    serde_json::Value::String(text) => Ok(text.into_bytes()),
                    other => Ok(other.to_string().into_bytes()),
                }
            }
        }
    }

    /// Decode a body.
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        body: &[u8],
        content_type: ContentType,
    ) -> Result<T, SerializationError> {
        let decode_err = |reason: String| SerializationError::Decode {
            content_type: content_type.to_string(),
            reason,
        };

        match content_type {
            ContentType::Json => serde_json::from_slice(body).map_err(|e| decode_err(e.to_string())),
            ContentType::Bitcode => bitcode::deserialize(body).map_err(|e| decode_err(e.to_string())),
            ContentType::PlainText => {
                let text = std::str::from_utf8(body).map_err(|e| decode_err(e.to_string()))?;
                // Structured values written as text round-trip through JSON.
                serde_json::from_str(text)
                    .or_else(|_| serde_json::from_value(serde_json::Value::String(text.to_string())))
                    .map_err(|e| decode_err(e.to_string()))
            }
        }
    }
}
