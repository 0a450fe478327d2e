use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::router::{QueueSource, RabbitMqRouter};
use super::{RabbitMqSettings, RpcClient};
use crate::bus::{
    BusEntity, BusEntityContext, BusRuntime, ConnectionCache, Connector, CreationStrategy, DeclareStrategy,
    DeleteOnDisposeStrategy, EntityDeclaration, EntityOptions, EntityRegistry, EntityStrategy, HostSession,
    ReceiveStrategy, SendStrategy, TopicKind,
};
use crate::cancellation::CancellationToken;
use crate::error::{BootstrapError, BrokerError};
use crate::logging::hints;
use crate::plugin::{PluginContext, PluginModule};

const TECHNOLOGY: &str = "rabbitmq";

/// Declares the exchange, then the consumer queue bound to it with the
/// subscription's route keys.
#[derive(Debug, Default, Clone)]
pub struct BindQueueStrategy {
    exchange_kind: TopicKind,
    defaults: EntityOptions,
}

impl BindQueueStrategy {
    pub fn new(exchange_kind: TopicKind, defaults: EntityOptions) -> Self {
        Self { exchange_kind, defaults }
    }
}

#[async_trait]
impl CreationStrategy for BindQueueStrategy {
    async fn create_entity(&self, ctx: &BusEntityContext, entity: &BusEntity) -> Result<(), BrokerError> {
        let EntityDeclaration::Subscription { topic, options, .. } = entity.declaration() else {
            return DeclareStrategy::new(self.defaults.clone()).create_entity(ctx, entity).await;
        };
        let connection = ctx.connection(entity.bus_name()).await?;
        connection
            .declare(&EntityDeclaration::topic(topic.clone(), self.exchange_kind))
            .await?;
        connection
            .declare(
                &entity
                    .declaration()
                    .clone()
                    .with_options(options.merged_over(&self.defaults)),
            )
            .await?;
        tracing::debug!(bus = %entity.bus_name(), exchange = %topic, queue = %entity.name(), "queue bound");
        Ok(())
    }
}

fn routed_entity(
    bus: &str,
    declaration: EntityDeclaration,
    content_type: Option<&str>,
    messages: &[&'static str],
) -> BusEntity {
    let entity = BusEntity::new(bus, declaration).with_messages(messages.iter().copied());
    match content_type {
        Some(content_type) => entity.with_content_type(content_type),
        None => entity,
    }
}

/// Plugin module wiring RabbitMQ exchanges and queues to the messaging
/// service.
///
/// Consumers and RPC reply queues are relinked by a `HostSession` per bus
/// after a connection drop.
pub struct RabbitMqModule {
    connector: Arc<dyn Connector>,
    router: RabbitMqRouter,
    settings: RabbitMqSettings,
    rpc_clients: HashMap<String, Arc<RpcClient>>,
    runtime: Option<BusRuntime>,
    sessions: Vec<HostSession>,
    watchers: Vec<JoinHandle<()>>,
    stop: CancellationToken,
}

impl RabbitMqModule {
    pub fn new(connector: Arc<dyn Connector>, router: RabbitMqRouter) -> Self {
        Self {
            connector,
            router,
            settings: RabbitMqSettings::default(),
            rpc_clients: HashMap::new(),
            runtime: None,
            sessions: Vec::new(),
            watchers: Vec::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &RabbitMqSettings {
        &self.settings
    }

    pub fn runtime(&self) -> Option<&BusRuntime> {
        self.runtime.as_ref()
    }

    pub fn rpc_client(&self, bus_name: &str) -> Option<&Arc<RpcClient>> {
        self.rpc_clients.get(bus_name)
    }

    pub fn session(&self, bus_name: &str) -> Option<&HostSession> {
        self.sessions.iter().find(|s| s.bus_name() == bus_name)
    }

    fn queue_defaults(&self, bus_name: &str) -> EntityOptions {
        EntityOptions {
            prefetch_count: self.settings.connection(bus_name).and_then(|c| c.prefetch_count),
            ..EntityOptions::default()
        }
    }

    fn build_registry(
        &self,
        ctx: &PluginContext,
    ) -> Result<(EntityRegistry, HashMap<String, Arc<RpcClient>>), BootstrapError> {
        for bus in self.router.bus_names() {
            if self.settings.connection(bus).is_none() {
                return Err(BootstrapError::UnknownBus(bus.to_string()));
            }
        }
        let mut registry = EntityRegistry::new();

        for route in &self.router.exchanges {
            let exchange = &route.definition;
            let entity = routed_entity(
                &route.bus,
                EntityDeclaration::topic(exchange.name.clone(), exchange.kind),
                exchange.content_type.as_deref(),
                &route.messages,
            )
            .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::default())))?
            .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::RABBITMQ_PUBLISH))))?;
            registry.add(entity)?;
        }

        for route in &self.router.queues {
            let queue = &route.definition;
            let entity = routed_entity(
                &route.bus,
                EntityDeclaration::queue(queue.name.clone()).with_options(queue.options.clone()),
                queue.content_type.as_deref(),
                &route.messages,
            )
            .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::new(
                self.queue_defaults(&route.bus),
            ))))?
            .add_strategy(EntityStrategy::Publish(Arc::new(SendStrategy::new(hints::RABBITMQ_PUBLISH))))?;
            registry.add(entity)?;
        }

        for route in &self.router.subscriptions {
            let subscription = &route.definition;
            let defaults = self.queue_defaults(&route.bus);
            let (declaration, creation): (EntityDeclaration, Arc<dyn CreationStrategy>) = match &subscription.source {
                QueueSource::WorkQueue => (
                    EntityDeclaration::queue(subscription.queue.name.clone())
                        .with_options(subscription.queue.options.clone()),
                    Arc::new(DeclareStrategy::new(defaults)) as Arc<dyn CreationStrategy>,
                ),
                QueueSource::Exchange { name, kind } => {
                    let mut options = subscription.queue.options.clone();
                    let queue_name = if subscription.is_per_instance() {
                        options.exclusive.get_or_insert(true);
                        options.auto_delete.get_or_insert(true);
                        format!("{}.{}", subscription.queue.name, ctx.host_id())
                    } else {
                        subscription.queue.name.clone()
                    };
                    (
                        EntityDeclaration::subscription(name.clone(), queue_name, subscription.route_keys.clone())
                            .with_options(options),
                        Arc::new(BindQueueStrategy::new(*kind, defaults)) as Arc<dyn CreationStrategy>,
                    )
                }
            };

            let receiver = Arc::new(ReceiveStrategy::new(hints::RABBITMQ_RECEIVE));
            let mut entity = routed_entity(
                &route.bus,
                declaration,
                subscription.queue.content_type.as_deref(),
                &route.messages,
            )
            .add_strategy(EntityStrategy::Create(creation))?
            .add_strategy(EntityStrategy::Subscribe(receiver.clone()))?
            .add_strategy(EntityStrategy::Dispose(receiver))?;
            if subscription.is_per_instance() {
                entity = entity.add_strategy(EntityStrategy::Dispose(Arc::new(DeleteOnDisposeStrategy)))?;
            }
            registry.add(entity)?;
        }

        let mut clients: HashMap<String, Arc<RpcClient>> = HashMap::new();
        for route in &self.router.rpc_queues {
            let client = match clients.get(&route.bus) {
                Some(client) => client.clone(),
                None => {
                    let timeout = self
                        .settings
                        .connection(&route.bus)
                        .map(|c| c.rpc_timeout())
                        .ok_or_else(|| BootstrapError::UnknownBus(route.bus.clone()))?;
                    let client = Arc::new(RpcClient::new(
                        route.bus.clone(),
                        format!("{}.rpc.{}", route.bus, ctx.host_id()),
                        timeout,
                    ));
                    let reply_options = EntityOptions {
                        exclusive: Some(true),
                        auto_delete: Some(true),
                        ..EntityOptions::default()
                    };
                    let reply_queue = BusEntity::new(
                        &route.bus,
                        EntityDeclaration::queue(client.reply_queue()).with_options(reply_options),
                    )
                    .add_strategy(EntityStrategy::Create(Arc::new(DeclareStrategy::default())))?
                    .add_strategy(EntityStrategy::Subscribe(client.clone()))?
                    .add_strategy(EntityStrategy::Dispose(client.clone()))?
                    .add_strategy(EntityStrategy::Dispose(Arc::new(DeleteOnDisposeStrategy)))?;
                    registry.add(reply_queue)?;
                    clients.insert(route.bus.clone(), client.clone());
                    client
                }
            };

            let request = routed_entity(
                &route.bus,
                EntityDeclaration::queue(route.definition.clone()),
                None,
                &route.messages,
            )
            .add_strategy(EntityStrategy::Publish(client))?;
            registry.add(request)?;
        }

        Ok((registry, clients))
    }
}

#[async_trait]
impl PluginModule for RabbitMqModule {
    fn name(&self) -> &str {
        "netfusion-rabbitmq"
    }

    async fn initialize(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        self.settings = ctx.get_settings::<RabbitMqSettings>()?;
        Ok(())
    }

    async fn configure(&mut self, ctx: &PluginContext) -> Result<(), BootstrapError> {
        let targets = self.settings.connections.iter().map(|c| c.target()).collect();
        let connections = Arc::new(ConnectionCache::from_targets(self.connector.clone(), targets)?);
        let (registry, clients) = self.build_registry(ctx)?;
        tracing::debug!(entities = registry.entities().len(), rpc_clients = clients.len(), "rabbitmq entities built");

        let registry = Arc::new(registry);
        let context = BusEntityContext::new(
            TECHNOLOGY,
            ctx.app_name(),
            ctx.host_id(),
            ctx.messaging().clone(),
            connections,
        );
        self.sessions = self
            .settings
            .connections
            .iter()
            .filter(|c| registry.subscribers_on(&c.bus_name).next().is_some())
            .map(|c| HostSession::new(&c.bus_name, context.clone(), registry.clone(), c.reconnect_delay()))
            .collect();
        self.rpc_clients = clients;
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
