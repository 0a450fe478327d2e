//! Strategies shared by the broker technologies.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    connection_id, BusEntity, BusEntityContext, CreationStrategy, DisposeStrategy, EntityDeclaration,
    EntityOptions, EntityReceiver, PublishStrategy, ReceiverHandle, SubscriptionStrategy, TopicKind,
    TransportEnvelope,
};
use crate::cancellation::CancellationToken;
use crate::error::BrokerError;
use crate::logging::MessageLog;
use crate::message::PublishedMessage;

/// Declares the entity, merging its options over technology defaults.
#[derive(Debug, Default, Clone)]
pub struct DeclareStrategy {
    defaults: EntityOptions,
}

impl DeclareStrategy {
    pub fn new(defaults: EntityOptions) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl CreationStrategy for DeclareStrategy {
    async fn create_entity(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError> {
        let declaration = match entity.declaration().options() {
            Some(options) => entity
                .declaration()
                .clone()
                .with_options(options.merged_over(&self.defaults)),
            None => entity.declaration().clone(),
        };
        let connection = ctx.connection(entity.bus_name()).await?;
        connection.declare(&declaration).await?;
        tracing::debug!(bus = %entity.bus_name(), entity = %entity.address(), "entity declared");
        Ok(())
    }
}

/// Declares a subscription, creating a placeholder topic first if the
/// owning service has not declared the topic yet.
///
/// A placeholder never replaces a topic that already exists.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionDeclareStrategy {
    topic_kind: TopicKind,
    defaults: EntityOptions,
}

impl SubscriptionDeclareStrategy {
    pub fn new(topic_kind: TopicKind, defaults: EntityOptions) -> Self {
        Self { topic_kind, defaults }
    }
}

#[async_trait]
impl CreationStrategy for SubscriptionDeclareStrategy {
    async fn create_entity(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError> {
        let EntityDeclaration::Subscription { topic, options, .. } = entity.declaration() else {
            return DeclareStrategy::new(self.defaults.clone()).create_entity(ctx, entity).await;
        };
        let declaration = entity
            .declaration()
            .clone()
            .with_options(options.merged_over(&self.defaults));
        let connection = ctx.connection(entity.bus_name()).await?;

        match connection.declare(&declaration).await {
            Err(BrokerError::EntityNotFound(missing)) if &missing == topic => {
                tracing::info!(bus = %entity.bus_name(), topic = %topic, "creating placeholder topic");
                connection
                    .declare(&EntityDeclaration::placeholder_topic(topic.clone(), self.topic_kind))
                    .await?;
                connection.declare(&declaration).await?;
            }
            other => other?,
        }
        tracing::debug!(bus = %entity.bus_name(), entity = %entity.address(), "subscription declared");
        Ok(())
    }
}

/// Encodes a message and sends it to the entity.
pub struct SendStrategy {
    hint: &'static str,
}

impl SendStrategy {
    pub fn new(hint: &'static str) -> Self {
        Self { hint }
    }

    /// Encode a message for an entity: the message's declared content type
    /// wins over the entity's, which wins over the serializer default.
    pub fn encode(
        ctx: &BusEntityContext,
        entity: &BusEntity,
        message: &PublishedMessage,
    ) -> Result<TransportEnvelope, BrokerError> {
        let serializer = ctx.serializer();
        let content_type =
            serializer.negotiate(&[message.meta().content_type.as_deref(), entity.content_type()])?;
        let body = message.message().encode(serializer, content_type)?;
        Ok(TransportEnvelope::for_message(message, content_type, body))
    }

    pub fn log_published(ctx: &BusEntityContext, entity: &BusEntity, message: &PublishedMessage, hint: &str) {
        let logger = ctx.logger();
        if logger.is_enabled() {
            logger.log(
                MessageLog::published(message.message().as_ref(), message.meta(), hint)
                    .with_detail("Bus", entity.bus_name())
                    .with_detail("Entity", entity.name()),
            );
        }
    }
}

#[async_trait]
impl PublishStrategy for SendStrategy {
    async fn send_to_entity(
        &self,
        ctx: &BusEntityContext,
        entity: &BusEntity,
        message: &PublishedMessage,
        _token: &CancellationToken,
    ) -> Result<(), BrokerError> {
        let envelope = Self::encode(ctx, entity, message)?;
        Self::log_published(ctx, entity, message, self.hint);
        let connection = ctx.connection(entity.bus_name()).await?;
        connection.send(&entity.address(), envelope).await
    }
}

/// Attaches an `EntityReceiver` and releases it on dispose.
///
/// Holds at most one receiver handle. Subscribing again while a handle is
/// active does nothing.
pub struct ReceiveStrategy {
    hint: &'static str,
    handle: tokio::sync::Mutex<Option<ReceiverHandle>>,
}

impl ReceiveStrategy {
    pub fn new(hint: &'static str) -> Self {
        Self {
            hint,
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.handle.lock().await.as_ref().is_some_and(|h| h.is_active())
    }

    async fn attach(
        &self,
        ctx: &BusEntityContext,
        entity: &Arc<BusEntity>,
        handle: &mut Option<ReceiverHandle>,
    ) -> Result<(), BrokerError> {
        let connection = ctx.connection(entity.bus_name()).await?;
        let receiver = Arc::new(EntityReceiver::new(ctx.clone(), entity.clone(), self.hint));
        let new_handle = connection.receive(&entity.address(), receiver).await?;
        if let Some(old) = handle.replace(new_handle) {
            old.stop().await;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStrategy for ReceiveStrategy {
    async fn subscribe_entity(&self, ctx: &BusEntityContext, entity: &Arc<BusEntity>) -> Result<(), BrokerError> {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| h.is_active()) {
            return Ok(());
        }
        self.attach(ctx, entity, &mut handle).await?;
        tracing::info!(bus = %entity.bus_name(), entity = %entity.address(), "subscribed");
        Ok(())
    }

    async fn relink(&self, ctx: &BusEntityContext, entity: &Arc<BusEntity>) -> Result<bool, BrokerError> {
        let mut handle = self.handle.lock().await;
        let connection = ctx.connection(entity.bus_name()).await?;
        if handle
            .as_ref()
            .is_some_and(|h| h.connection_id() == connection_id(&connection) && h.is_active())
        {
            return Ok(false);
        }
        self.attach(ctx, entity, &mut handle).await?;
        tracing::info!(bus = %entity.bus_name(), entity = %entity.address(), "subscription relinked");
        Ok(true)
    }
}

#[async_trait]
impl DisposeStrategy for ReceiveStrategy {
    async fn on_dispose(&self, _ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError> {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop().await;
            tracing::debug!(bus = %entity.bus_name(), entity = %entity.address(), "receiver stopped");
        }
        Ok(())
    }
}

/// Deletes the entity from the broker on dispose. Used for subscriptions
/// unique to one running instance.
#[derive(Debug, Default, Clone)]
pub struct DeleteOnDisposeStrategy;

#[async_trait]
impl DisposeStrategy for DeleteOnDisposeStrategy {
    async fn on_dispose(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError> {
        let connection = ctx.connection(entity.bus_name()).await?;
        connection.delete(&entity.address()).await?;
        tracing::info!(bus = %entity.bus_name(), entity = %entity.address(), "transient entity deleted");
        Ok(())
    }
}
