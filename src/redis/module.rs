use std::sync::Arc;

use async_trait::async_trait;

use super::{RedisRouter, RedisSettings};
use crate::bus::{
    BusEntity, BusEntityContext, BusRuntime, ConnectionCache, Connector, DeclareStrategy, DeleteOnDisposeStrategy,
    EntityDeclaration, EntityRegistry, EntityStrategy, ReceiveStrategy, SendStrategy, SubscriptionDeclareStrategy,
    TopicKind,
};
use crate::error::BootstrapError;
use crate::logging::hints;
use crate::plugin::{PluginContext, PluginModule};

const TECHNOLOGY: &str = "redis";

/// Plugin module publishing and subscribing domain events over Redis
/// pub/sub.
pub struct RedisModule {
    connector: Arc<dyn Connector>,
    router: RedisRouter,
    settings: RedisSettings,
    runtime: Option<BusRuntime>,
}

impl RedisModule {
    pub fn new(connector: Arc<dyn Connector>, router: RedisRouter) -> Self {
        Self {
            connector,
            router,
            settings: RedisSettings::default(),
            runtime: None,
        }
    }

    pub fn runtime(&self) -> Option<&BusRuntime> {
        self.runtime.as_ref()
    }

    fn build_registry(&self, ctx: &PluginContext) -> Result<EntityRegistry, BootstrapError> {
        for bus in self.router.bus_names() {
            if self.settings.connection(bus).is_none() {
                return Err(BootstrapError::UnknownBus(bus.to_string()));
            }
        }
        let mut registry = EntityRegistry::new();

        for route in &self.router.channels {
            let entity = BusEntity::new(
                &route.bus,
                EntityDeclaration::topic(route.channel.clone(), TopicKind::Pattern),
            )
            .with_messages(route.messages.iter().copied())
            .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::default())))?
            .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::REDIS_PUBLISH))))?;
            registry.add(entity)?;
        }

        for subscription in &self.router.subscriptions {
            // Pub/sub subscriptions belong to one connection, so every
            // instance gets its own.
            let name = format!(
                "{}.{}.{}",
                ctx.app_name(),
                ctx.host_id(),
                subscription.pattern.as_deref().unwrap_or("*")
            );
            let filters = subscription.pattern.iter().cloned().collect();
            let receiver = Arc::new(ReceiveStrategy::new(hints::REDIS_RECEIVE));
            let entity = BusEntity::new(
                &subscription.bus,
                EntityDeclaration::subscription(subscription.channel.clone(), name, filters),
            )
            .with_messages(subscription.messages.iter().copied())
            .add_strategy(EntityStrategy::Create(Arc::new(SubscriptionDeclareStrategy::new(
                TopicKind::Pattern,
                Default::default(),
            ))))?
            .add_strategy(EntityStrategy::Subscribe(receiver.clone()))?
            .add_strategy(EntityStrategy::Dispose(receiver))?
            .add_strategy(EntityStrategy::Dispose(Arc::new(DeleteOnDisposeStrategy)))?;
            registry.add(entity)?;
        }

        Ok(registry)
    }
}

#[async_trait]
impl PluginModule for RedisModule {
    fn name(&self) -> &str {
        "netfusion-redis"
    }

    async fn initialize(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        self.settings = ctx.get_settings::<RedisSettings>()?;
        Ok(())
    }

    async fn configure(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        let targets = self.settings.connections.iter().map(|c| c.target()).collect();
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
