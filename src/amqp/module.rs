use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::{AmqpRouter, AmqpSettings};
use crate::bus::{
    BusEntity, BusEntityContext, BusRuntime, ConnectionCache, Connector, EntityRegistry, EntityStrategy,
    HostSession, ReceiveStrategy, SendStrategy,
};
use crate::cancellation::CancellationToken;
use crate::error::BootstrapError;
use crate::logging::hints;
use crate::plugin::{PluginContext, PluginModule};

const TECHNOLOGY: &str = "amqp";

/// Plugin module linking senders and receivers to AMQP 1.0 hosts.
///
/// Each host with receivers gets a `HostSession` that relinks them after
/// a connection drop.
pub struct AmqpModule {
    connector: Arc<dyn Connector>,
    router: AmqpRouter,
    settings: AmqpSettings,
    runtime: Option<BusRuntime>,
    sessions: Vec<HostSession>,
    watchers: Vec<JoinHandle<()>>,
    stop: CancellationToken,
}

impl AmqpModule {
    pub fn new(connector: Arc<dyn Connector>, router: AmqpRouter) -> Self {
        Self {
            connector,
            router,
            settings: AmqpSettings::default(),
            runtime: None,
            sessions: Vec::new(),
            watchers: Vec::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn runtime(&self) -> Option<&BusRuntime> {
        self.runtime.as_ref()
    }

    pub fn session(&self, bus_name: &str) -> Option<&HostSession> {
        self.sessions.iter().find(|s| s.bus_name() == bus_name)
    }

    fn build_registry(&self) -> Result<EntityRegistry, BootstrapError> {
        for bus in self.router.bus_names() {
            if self.settings.host(bus).is_none() {
                return Err(BootstrapError::UnknownBus(bus.to_string()));
            }
        }
        let mut registry = EntityRegistry::new();

        for link in &self.router.senders {
            let entity = BusEntity::new(&link.bus, link.declaration())
                .with_messages(link.messages.iter().copied())
                .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::AMQP_PUBLISH))))?;
            registry.add(entity)?;
        }

        for link in &self.router.receivers {
            let receiver = Arc::new(ReceiveStrategy::new(hints::AMQP_RECEIVE));
            let entity = BusEntity::new(&link.bus, link.declaration())
                .with_messages(link.messages.iter().copied())
                .add_strategy(EntityStrategy::Subscribe(receiver.clone()))?
                .add_strategy(EntityStrategy::Dispose(receiver))?;
            registry.add(entity)?;
        }

        Ok(registry)
    }
}

#[async_trait]
impl PluginModule for AmqpModule {
    fn name(&self) -> &str {
        "netfusion-amqp"
    }

    async fn initialize(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        self.settings = ctx.get_settings::<AmqpSettings>()?;
        Ok(())
    }

    async fn configure(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        let targets = self.settings.hosts.iter().map(|h| h.target()).collect();
        let connections = Arc::new(ConnectionCache::from_targets(self.connector.clone(), targets)?);
        let registry = Arc::new(self.build_registry()?);
        let context = BusEntityContext::new(
            TECHNOLOGY,
            ctx.app_name(),
            ctx.host_id(),
            ctx.messaging().clone(),
            connections,
        );

        self.sessions = self
            .settings
            .hosts
            .iter()
            .filter(|h| registry.subscribers_on(&h.bus_name).next().is_some())
            .map(|h| HostSession::new(&h.bus_name, context.clone(), registry.clone(), h.reconnect_delay()))
            .collect();
        self.runtime = Some(BusRuntime::new(TECHNOLOGY, context, registry));
        Ok(())
    }

    async fn start(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        BusRuntime::configured(&self.runtime, TECHNOLOGY)?.start().await?;
        self.stop = CancellationToken::new();
        self.watchers = self.sessions.iter().map(|s| s.watch(self.stop.clone())).collect();
        Ok(())
    }

    async fn stop(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        self.stop.cancel();
        for watcher in self.watchers.drain(..) {
            let _ = watcher.await;
        }
        BusRuntime::configured(&self.runtime, TECHNOLOGY)?.stop().await?;
        Ok(())
    }
}
