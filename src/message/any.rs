use std::any::{Any, TypeId};
use std::sync::Arc;

use serde::Serialize;

use super::{Message, MessageKind};
use crate::serialization::{ContentType, SerializationError, SerializationManager};

/// Object-safe view of a `Message`, used once the concrete type is erased
/// by the dispatcher table and the publisher pipeline.
pub trait AnyMessage: Send + Sync + 'static {
    fn message_name(&self) -> &'static str;
    fn message_type(&self) -> TypeId;
    fn kind(&self) -> MessageKind;
    fn route_key(&self) -> Option<String>;
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn encode(
        &self,
        serializer: &SerializationManager,
        content_type: ContentType,
    ) -> Result<Vec<u8>, SerializationError>;
    fn to_json(&self) -> Result<serde_json::Value, SerializationError>;
}

impl<M: Message> AnyMessage for M {
    fn message_name(&self) -> &'static str {
        M::NAME
    }

    fn message_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn kind(&self) -> MessageKind {
        M::KIND
    }

    fn route_key(&self) -> Option<String> {
        Message::route_key(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn encode(
        &self,
        serializer: &SerializationManager,
        content_type: ContentType,
    ) -> Result<Vec<u8>, SerializationError> {
        serializer.serialize(self, content_type)
    }

    fn to_json(&self) -> Result<serde_json::Value, SerializationError> {
        serde_json::to_value(self).map_err(|e| SerializationError::Encode {
            content_type: ContentType::JSON.to_string(),
            reason: e.to_string(),
        })
    }
}

impl dyn AnyMessage {
    /// Borrow the concrete message if it is an `M`.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// Object-safe view of a handler result.
pub trait AnyReply: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn encode(
        &self,
        serializer: &SerializationManager,
        content_type: ContentType,
    ) -> Result<Vec<u8>, SerializationError>;
    fn to_json(&self) -> Result<serde_json::Value, SerializationError>;

    /// Unit and `None` results carry no response.
    fn is_empty(&self) -> bool {
        matches!(self.to_json(), Ok(serde_json::Value::Null))
    }
}

impl<T> AnyReply for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn encode(
        &self,
        serializer: &SerializationManager,
        content_type: ContentType,
    ) -> Result<Vec<u8>, SerializationError> {
        serializer.serialize(self, content_type)
    }

    fn to_json(&self) -> Result<serde_json::Value, SerializationError> {
        serde_json::to_value(self).map_err(|e| SerializationError::Encode {
            content_type: ContentType::JSON.to_string(),
            reason: e.to_string(),
        })
    }

    fn is_empty(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<()>()
            || matches!(self.to_json(), Ok(serde_json::Value::Null))
    }
}
