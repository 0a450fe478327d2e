//! Serialization - content-type negotiated encoding of messages and replies.
//!
//! Every message crossing a broker boundary is encoded with one of a closed
//! set of content types:
//!
//! | Content type             | Codec        |
//! |--------------------------|--------------|
//! | `application/json`       | serde_json   |
//! | `application/x-bitcode`  | bitcode      |
//! | `text/plain`             | UTF-8 text   |
//!
//! The content type is negotiated per send: the message metadata wins, then
//! the entity default, then the manager default.

mod content_type;
mod error;
mod manager;

pub use content_type::ContentType;
pub use error::SerializationError;
pub use manager::SerializationManager;
