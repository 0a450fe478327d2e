//! Bus entities and the strategies attached to them.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BusEntityContext, EntityAddress, EntityDeclaration};
use crate::cancellation::CancellationToken;
use crate::error::{BootstrapError, BrokerError};
use crate::message::PublishedMessage;

/// Lifecycle of a bus entity. Transitions follow module start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Declared,
    Created,
    Subscribed,
    Disposed,
}

/// Creates or updates the broker-side object.
#[async_trait]
pub trait CreationStrategy: Send + Sync {
    async fn create_entity(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError>;
}

/// Attaches a message processor to the entity.
#[async_trait]
pub trait SubscriptionStrategy: Send + Sync {
    async fn subscribe_entity(&self, ctx: &BusEntityContext, entity: &Arc<BusEntity>) -> Result<(), BrokerError>;

    /// Re-attach after the connection the processor was bound to dropped.
    /// Returns `false` when the processor was already bound to the current
    /// connection.
    async fn relink(&self, _ctx: &BusEntityContext, _entity: &Arc<BusEntity>) -> Result<bool, BrokerError> {
        Ok(false)
    }
}

/// Sends a published message to the entity.
#[async_trait]
pub trait PublishStrategy: Send + Sync {
    async fn send_to_entity(
        &self,
        ctx: &BusEntityContext,
        entity: &BusEntity,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), BrokerError>;
}

/// Releases handles and transient broker objects.
#[async_trait]
pub trait DisposeStrategy: Send + Sync {
    async fn on_dispose(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError>;
}

/// A strategy attached to an entity.
#[derive(Clone)]
pub enum EntityStrategy {
    Create(Arc<dyn CreationStrategy>),
    Subscribe(Arc<dyn SubscriptionStrategy>),
    Publish(Arc<dyn PublishStrategy>),
    Dispose(Arc<dyn DisposeStrategy>),
}

impl EntityStrategy {
    fn label(&self) -> &'static str {
        match self {
            EntityStrategy::Create(_) => "create",
            EntityStrategy::Subscribe(_) => "subscribe",
            EntityStrategy::Publish(_) => "publish",
            EntityStrategy::Dispose(_) => "dispose",
        }
    }
}

/// A queue, topic or subscription owned by one bus.
///
/// Built during module configure and never changed afterwards except for
/// its state and strategy-internal handles.
pub struct BusEntity {
    bus_name: String,
    declaration: EntityDeclaration,
    content_type: Option<String>,
    message_names: Vec<&'static str>,
    strategies: Vec<EntityStrategy>,
    state: Mutex<EntityState>,
}

impl BusEntity {
    pub fn new(bus_name: impl Into<String>, declaration: EntityDeclaration) -> Self {
        Self {
            bus_name: bus_name.into(),
            declaration,
            content_type: None,
            message_names: Vec::new(),
            strategies: Vec::new(),
            state: Mutex::new(EntityState::Declared),
        }
    }

    /// Default content type for messages sent to this entity.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// A message type published to or received from this entity.
    pub fn with_message(mut self, name: &'static str) -> Self {
        if !self.message_names.contains(&name) {
            self.message_names.push(name);
        }
        self
    }

    pub fn with_messages(self, names: impl IntoIterator<Item = &'static str>) -> Self {
        names.into_iter().fold(self, |entity, name| entity.with_message(name))
    }

    /// Attach a strategy. An entity accepts at most one publish strategy.
    pub fn add_strategy(mut self, strategy: EntityStrategy) -> Result<Self, BootstrapError> {
        if matches!(strategy, EntityStrategy::Publish(_)) && self.publish_strategy().is_some() {
            return Err(BootstrapError::DuplicatePublishStrategy {
                bus: self.bus_name.clone(),
                entity: self.declaration.name().to_string(),
            });
        }
        self.strategies.push(strategy);
        Ok(self)
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn declaration(&self) -> &EntityDeclaration {
        &self.declaration
    }

    pub fn address(&self) -> EntityAddress {
        self.declaration.address()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn message_names(&self) -> &[&'static str] {
        &self.message_names
    }

    /// The single message type, when the entity carries exactly one.
    pub fn default_message_name(&self) -> Option<&'static str> {
        match self.message_names.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn state(&self) -> EntityState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn set_state(&self, state: EntityState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub fn strategies(&self) -> &[EntityStrategy] {
        &self.strategies
    }

    pub fn strategy_labels(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.label()).collect()
    }

    pub fn creation_strategies(&self) -> impl Iterator<Item = &Arc<dyn CreationStrategy>> {
        self.strategies.iter().filter_map(|s| match s {
            EntityStrategy::Create(c) => Some(c),
            _ => None,
        })
    }

    pub fn subscription_strategies(&self) -> impl Iterator<Item = &Arc<dyn SubscriptionStrategy>> {
        self.strategies.iter().filter_map(|s| match s {
            EntityStrategy::Subscribe(c) => Some(c),
            _ => None,
        })
    }

    pub fn publish_strategy(&self) -> Option<&Arc<dyn PublishStrategy>> {
        self.strategies.iter().find_map(|s| match s {
            EntityStrategy::Publish(c) => Some(c),
            _ => None,
        })
    }

    pub fn dispose_strategies(&self) -> impl Iterator<Item = &Arc<dyn DisposeStrategy>> {
        self.strategies.iter().filter_map(|s| match s {
            EntityStrategy::Dispose(c) => Some(c),
            _ => None,
        })
    }

    pub fn is_subscriber(&self) -> bool {
        self.subscription_strategies().next().is_some()
    }
}

impl fmt::Debug for BusEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEntity")
            .field("bus", &self.bus_name)
            .field("declaration", &self.declaration)
            .field("messages", &self.message_names)
            .field("strategies", &self.strategy_labels())
            .field("state", &self.state())
            .finish()
    }
}
