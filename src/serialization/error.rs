use thiserror::Error;

/// Errors raised while encoding or decoding message bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// The content type is not one of the supported codecs.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Encoding a value failed.
    #[error("failed to encode as {content_type}: {reason}")]
    Encode { content_type: String, reason: String },

    /// Decoding a body failed.
    #[error("failed to decode {content_type}: {reason}")]
    Decode { content_type: String, reason: String },

    /// No decoder is registered for the logical message name.
    #[error("no message type registered for name: {0}")]
    UnknownMessageType(String),
}
