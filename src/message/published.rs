use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{AnyMessage, AnyReply, Message, MessageMeta};
use crate::serialization::{ContentType, SerializationError, SerializationManager};

/// Decodes a reply body received over a broker into the command's result type.
pub type ResultDecoder = fn(
    &SerializationManager,
    &[u8],
    ContentType,
) -> Result<Box<dyn AnyReply>, SerializationError>;

/// Decoder for a concrete result type.
pub fn decode_result<T>(
    serializer: &SerializationManager,
    body: &[u8],
    content_type: ContentType,
) -> Result<Box<dyn AnyReply>, SerializationError>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let value: T = serializer.deserialize(body, content_type)?;
    Ok(Box::new(value))
}

/// A message in flight: the frozen payload, its metadata and the slot the
/// handling side fills with a result.
pub struct PublishedMessage {
    message: Arc<dyn AnyMessage>,
    meta: MessageMeta,
    result: OnceLock<Box<dyn AnyReply>>,
    result_decoder: Option<ResultDecoder>,
}

impl PublishedMessage {
    pub fn new<M: Message>(message: M, meta: MessageMeta) -> Self {
        Self::from_arc(Arc::new(message), meta)
    }

    pub fn from_arc(message: Arc<dyn AnyMessage>, meta: MessageMeta) -> Self {
        Self {
            message,
            meta,
            result: OnceLock::new(),
            result_decoder: None,
        }
    }

    pub(crate) fn with_result_decoder(mut self, decoder: ResultDecoder) -> Self {
        self.result_decoder = Some(decoder);
        self
    }

    pub fn message(&self) -> &Arc<dyn AnyMessage> {
        &self.message
    }

    pub fn name(&self) -> &'static str {
        self.message.message_name()
    }

    pub fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    /// Metadata stays mutable until the message reaches the publishers.
    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        &mut self.meta
    }

    /// Route key from metadata, else from the message itself.
    pub fn route_key(&self) -> Option<String> {
        self.meta.route_key.clone().or_else(|| self.message.route_key())
    }

    pub fn result_decoder(&self) -> Option<ResultDecoder> {
        self.result_decoder
    }

    /// Store the handler result. Returns `false` if one was already set.
    pub fn set_result(&self, result: Box<dyn AnyReply>) -> bool {
        self.result.set(result).is_ok()
    }

    pub fn result(&self) -> Option<&dyn AnyReply> {
        self.result.get().map(|r| r.as_ref())
    }

    pub fn take_result(&mut self) -> Option<Box<dyn AnyReply>> {
        self.result.take()
    }
}

impl fmt::Debug for PublishedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishedMessage")
            .field("name", &self.name())
            .field("meta", &self.meta)
            .field("has_result", &self.result.get().is_some())
            .finish()
    }
}
