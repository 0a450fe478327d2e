use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{MessageDispatcher, Route};
use crate::error::BootstrapError;
use crate::message::{AnyMessage, Command, DomainEvent, Message, MessageKind, Query};
use crate::serialization::{ContentType, SerializationError, SerializationManager};

/// Decodes a transport body into the concrete message type it names.
pub type MessageDecoder =
    fn(&SerializationManager, &[u8], ContentType) -> Result<Arc<dyn AnyMessage>, SerializationError>;

fn decode_message<M: Message>(
    serializer: &SerializationManager,
    body: &[u8],
    content_type: ContentType,
) -> Result<Arc<dyn AnyMessage>, SerializationError> {
    let message: M = serializer.deserialize(body, content_type)?;
    Ok(Arc::new(message))
}

/// A message type known to the registry.
#[derive(Clone, Copy)]
pub struct MessageType {
    pub type_id: TypeId,
    pub name: &'static str,
    pub kind: MessageKind,
    pub decoder: MessageDecoder,
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl MessageType {
    pub fn of<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: M::NAME,
            kind: M::KIND,
            decoder: decode_message::<M>,
        }
    }
}

/// The dispatcher table, built once at startup and read-only afterwards.
///
/// Commands and queries have exactly one dispatcher; domain events have
/// zero or more, kept in registration order.
#[derive(Default)]
pub struct DispatchRegistry {
    dispatchers: HashMap<TypeId, Vec<Arc<MessageDispatcher>>>,
    types: HashMap<&'static str, MessageType>,
}

impl DispatchRegistry {
    pub fn builder() -> DispatchRegistryBuilder {
        DispatchRegistryBuilder::default()
    }

    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Dispatchers for the exact message type.
    pub fn dispatchers_for(&self, message_type: TypeId) -> &[Arc<MessageDispatcher>] {
        self.dispatchers
            .get(&message_type)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_message_type_dispatchers(&self) -> &HashMap<TypeId, Vec<Arc<MessageDispatcher>>> {
        &self.dispatchers
    }

    /// Every dispatcher in the table.
    pub fn all_dispatchers(&self) -> impl Iterator<Item = &Arc<MessageDispatcher>> {
        self.dispatchers.values().flatten()
    }

    pub fn message_type(&self, name: &str) -> Option<&MessageType> {
        self.types.get(name)
    }

    pub fn is_routed(&self, message_type: TypeId) -> bool {
        !self.dispatchers_for(message_type).is_empty()
    }

    /// Decode a body for a registered message name.
    pub fn decode(
        &self,
        name: &str,
        serializer: &SerializationManager,
        body: &[u8],
        content_type: ContentType,
    ) -> Result<Arc<dyn AnyMessage>, SerializationError> {
        let message_type = self
            .types
            .get(name)
            .ok_or_else(|| SerializationError::UnknownMessageType(name.to_string()))?;
        (message_type.decoder)(serializer, body, content_type)
    }
}

/// Collects routes and enforces cardinality as each one is added.
#[derive(Default)]
pub struct DispatchRegistryBuilder {
    registry: DispatchRegistry,
}

impl DispatchRegistryBuilder {
    /// Route a command. A second route for the same command is rejected.
    pub fn command<C: Command>(self, route: Route<C, C::Output>) -> Result<Self, BootstrapError> {
        self.add_single(route.into_dispatcher(), MessageType::of::<C>())
    }

    /// Route a query. A second route for the same query is rejected.
    pub fn query<Q: Query>(self, route: Route<Q, Q::Output>) -> Result<Self, BootstrapError> {
        self.add_single(route.into_dispatcher(), MessageType::of::<Q>())
    }

    /// Add a domain event handler. Events accept any number of handlers.
    pub fn event<E: DomainEvent>(mut self, route: Route<E>) -> Self {
        self.register_type(MessageType::of::<E>());
        self.registry
            .dispatchers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Arc::new(route.into_dispatcher()));
        self
    }

    /// Make a message type decodable without routing it, for messages that
    /// are only published or only answered.
    pub fn message<M: Message>(mut self) -> Self {
        self.register_type(MessageType::of::<M>());
        self
    }

    pub fn build(self) -> DispatchRegistry {
        self.registry
    }

    fn add_single(mut self, dispatcher: MessageDispatcher, message_type: MessageType) -> Result<Self, BootstrapError> {
        let entry = self.registry.dispatchers.entry(message_type.type_id).or_default();
        if let Some(existing) = entry.first() {
            return Err(BootstrapError::MessageAlreadyRouted {
                message: message_type.name.to_string(),
                existing: format!("{}::{}", existing.consumer_type(), existing.handler_name()),
                attempted: format!("{}::{}", dispatcher.consumer_type(), dispatcher.handler_name()),
            });
        }
        entry.push(Arc::new(dispatcher));
        self.register_type(message_type);
        Ok(self)
    }

    fn register_type(&mut self, message_type: MessageType) {
        self.registry.types.entry(message_type.name).or_insert(message_type);
    }
}
