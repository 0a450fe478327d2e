use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ServiceBusRouter, ServiceBusSettings};
use crate::bus::{
    BusEntity, BusEntityContext, BusRuntime, ConnectionCache, Connector, DeclareStrategy, DeleteOnDisposeStrategy,
    EntityDeclaration, EntityOptions, EntityRegistry, EntityStrategy, ReceiveStrategy, SendStrategy,
    SubscriptionDeclareStrategy, TopicKind,
};
use crate::error::BootstrapError;
use crate::logging::hints;
use crate::plugin::{PluginContext, PluginModule};

const TECHNOLOGY: &str = "servicebus";

/// Idle time after which an abandoned fan-out subscription is removed by
/// the broker, if the instance never got to delete it.
const FANOUT_IDLE_DELETE: Duration = Duration::from_secs(300);

/// Plugin module wiring Service Bus queues, topics and subscriptions to the
/// messaging service.
///
/// Topics filter subscriptions by exact route key.
pub struct ServiceBusModule {
    connector: Arc<dyn Connector>,
    router: ServiceBusRouter,
    settings: ServiceBusSettings,
    runtime: Option<BusRuntime>,
}

impl ServiceBusModule {
    pub fn new(connector: Arc<dyn Connector>, router: ServiceBusRouter) -> Self {
        Self {
            connector,
            router,
            settings: ServiceBusSettings::default(),
            runtime: None,
        }
    }

    pub fn runtime(&self) -> Option<&BusRuntime> {
        self.runtime.as_ref()
    }

    fn defaults(&self, bus_name: &str) -> EntityOptions {
        self.settings
            .namespace(bus_name)
            .map(|n| n.entity_defaults.clone())
            .unwrap_or_default()
    }

    fn build_registry(&self, ctx: &PluginContext) -> Result<EntityRegistry, BootstrapError> {
        for bus in self.router.bus_names() {
            if self.settings.namespace(bus).is_none() {
                return Err(BootstrapError::UnknownBus(bus.to_string()));
            }
        }
        let mut registry = EntityRegistry::new();

        for routed in &self.router.send_queues {
            let queue = &routed.meta;
            let mut entity = BusEntity::new(
                &routed.bus,
                EntityDeclaration::queue(queue.name.clone()).with_options(queue.options.clone()),
            )
            .with_messages(routed.messages.iter().copied());
            if let Some(content_type) = &queue.content_type {
                entity = entity.with_content_type(content_type.clone());
            }
            registry.add(
                entity
                    .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::new(self.defaults(&routed.bus)))))?
                    .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::SERVICEBUS_PUBLISH))))?,
            )?;
        }

        for routed in &self.router.topics {
            let topic = &routed.meta;
            let mut entity = BusEntity::new(&routed.bus, EntityDeclaration::topic(topic.name.clone(), TopicKind::Direct))
                .with_messages(routed.messages.iter().copied());
            if let Some(content_type) = &topic.content_type {
                entity = entity.with_content_type(content_type.clone());
            }
            registry.add(
                entity
                    .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::default())))?
                    .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::SERVICEBUS_PUBLISH))))?,
            )?;
        }

        for routed in &self.router.receive_queues {
            let queue = &routed.meta;
            let receiver = Arc::new(ReceiveStrategy::new(hints::SERVICEBUS_RECEIVE));
            let mut entity = BusEntity::new(
                &routed.bus,
                EntityDeclaration::queue(queue.name.clone()).with_options(queue.options.clone()),
            )
            .with_messages(routed.messages.iter().copied());
            if let Some(content_type) = &queue.content_type {
                entity = entity.with_content_type(content_type.clone());
            }
            registry.add(
                entity
                    .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::new(self.defaults(&routed.bus)))))?
                    .add_strategy(EntityStrategy::Subscribe(receiver.clone()))?
                    .add_strategy(EntityStrategy::Dispose(receiver))?,
            )?;
        }

        for routed in &self.router.subscriptions {
            let subscription = &routed.meta;
            let mut options = subscription.options.clone();
            let name = match &subscription.name {
                Some(name) => name.clone(),
                None => {
                    options.auto_delete_on_idle.get_or_insert(FANOUT_IDLE_DELETE);
                    format!("{}_{}", ctx.app_name(), ctx.host_id())
                }
            };
            let receiver = Arc::new(ReceiveStrategy::new(hints::SERVICEBUS_RECEIVE));
            let mut entity = BusEntity::new(
                &routed.bus,
                EntityDeclaration::subscription(subscription.topic.clone(), name, subscription.filters.clone())
                    .with_options(options),
            )
            .with_messages(routed.messages.iter().copied())
            .add_strategy(EntityStrategy::Create(Arc::new(SubscriptionDeclareStrategy::new(
                TopicKind::Direct,
                self.defaults(&routed.bus),
            ))))?
            .add_strategy(EntityStrategy::Subscribe(receiver.clone()))?
            .add_strategy(EntityStrategy::Dispose(receiver))?;
            if subscription.is_fanout() {
                entity = entity.add_strategy(EntityStrategy::Dispose(Arc::new(DeleteOnDisposeStrategy)))?;
            }
            registry.add(entity)?;
        }

        Ok(registry)
    }
}

#[async_trait]
impl PluginModule for ServiceBusModule {
    fn name(&self) -> &str {
        "netfusion-servicebus"
    }

    async fn initialize(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        self.settings = ctx.get_settings::<ServiceBusSettings>()?;
        Ok(())
    }

    async fn configure(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        let targets = self.settings.namespaces.iter().map(|n| n.target()).collect();
        let connections = Arc::new(ConnectionCache::from_targets(self.connector.clone(), targets)?);
        let registry = self.build_registry(ctx)?;
        let context = BusEntityContext::new(
            TECHNOLOGY,
            ctx.app_name(),
            ctx.host_id(),
            ctx.messaging().clone(),
            connections,
        );
        self.runtime = Some(BusRuntime::new(TECHNOLOGY, context, Arc::new(registry)));
        Ok(())
    }

    async fn start(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        BusRuntime::configured(&self.runtime, TECHNOLOGY)?.start().await?;
        Ok(())
    }

    async fn stop(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        BusRuntime::configured(&self.runtime, TECHNOLOGY)?.stop().await?;
        Ok(())
    }
}
