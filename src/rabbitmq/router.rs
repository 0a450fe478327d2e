//! Route definitions for RabbitMQ.

use crate::bus::{EntityOptions, TopicKind};
use crate::message::{Command, Message};

/// An exchange messages are published to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub name: String,
    pub kind: TopicKind,
    pub content_type: Option<String>,
}

impl ExchangeDefinition {
    fn new(name: impl Into<String>, kind: TopicKind) -> Self {
        Self {
            name: name.into(),
            kind,
            content_type: None,
        }
    }

    /// Delivers to queues bound with exactly the message route key.
    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, TopicKind::Direct)
    }

    /// Delivers to queues whose binding pattern matches the route key.
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, TopicKind::Topic)
    }

    /// Delivers to every bound queue.
    pub fn fanout(name: impl Into<String>) -> Self {
        Self::new(name, TopicKind::Fanout)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A named queue on the default exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDefinition {
    pub name: String,
    pub options: EntityOptions,
    pub content_type: Option<String>,
}

impl QueueDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: EntityOptions::default(),
            content_type: None,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.options.durable = Some(durable);
        self
    }

    pub fn with_prefetch_count(mut self, count: u16) -> Self {
        self.options.prefetch_count = Some(count);
        self
    }

    pub fn with_options(mut self, options: EntityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Where a consumer queue gets its messages from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueSource {
    /// Messages sent directly to the queue.
    WorkQueue,
    /// Messages published to an exchange the queue is bound to.
    Exchange { name: String, kind: TopicKind },
}

/// A queue consumed by this application.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSubscription {
    pub source: QueueSource,
    pub queue: QueueDefinition,
    pub route_keys: Vec<String>,
}

impl QueueSubscription {
    pub fn work_queue(queue: QueueDefinition) -> Self {
        Self {
            source: QueueSource::WorkQueue,
            queue,
            route_keys: Vec::new(),
        }
    }

    /// Bind `queue` to an exchange. For fanout exchanges each running
    /// instance gets its own queue, deleted when the instance stops.
    pub fn exchange(exchange: &ExchangeDefinition, queue: QueueDefinition) -> Self {
        Self {
            source: QueueSource::Exchange {
                name: exchange.name.clone(),
                kind: exchange.kind,
            },
            queue,
            route_keys: Vec::new(),
        }
    }

    pub fn with_route_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_per_instance(&self) -> bool {
        matches!(
            self.source,
            QueueSource::Exchange {
                kind: TopicKind::Fanout,
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RouteEntry<D> {
    pub bus: String,
    pub definition: D,
    pub messages: Vec<&'static str>,
}

fn add_route<D>(
    routes: &mut Vec<RouteEntry<D>>,
    bus: String,
    definition: D,
    message: &'static str,
    same: impl Fn(&D, &D) -> bool,
) {
    match routes
        .iter_mut()
        .find(|r| r.bus == bus && same(&r.definition, &definition))
    {
        Some(route) => {
            if !route.messages.contains(&message) {
                route.messages.push(message);
            }
        }
        None => routes.push(RouteEntry {
            bus,
            definition,
            messages: vec![message],
        }),
    }
}

/// Which messages go to and come from which RabbitMQ entities.
///
/// Routing several messages to the same exchange or queue of a bus shares
/// one entity.
#[derive(Debug, Clone, Default)]
pub struct RabbitMqRouter {
    pub(crate) exchanges: Vec<RouteEntry<ExchangeDefinition>>,
    pub(crate) queues: Vec<RouteEntry<QueueDefinition>>,
    pub(crate) subscriptions: Vec<RouteEntry<QueueSubscription>>,
    pub(crate) rpc_queues: Vec<RouteEntry<String>>,
}

impl RabbitMqRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `M` to an exchange.
    pub fn exchange<M: Message>(mut self, bus: impl Into<String>, exchange: ExchangeDefinition) -> Self {
        add_route(&mut self.exchanges, bus.into(), exchange, M::NAME, |a, b| a.name == b.name);
        self
    }

    /// Send `C` to a work queue.
    pub fn queue<C: Command>(mut self, bus: impl Into<String>, queue: QueueDefinition) -> Self {
        add_route(&mut self.queues, bus.into(), queue, C::NAME, |a, b| a.name == b.name);
        self
    }

    /// Consume `M` from a queue. A consumed command that arrives with a
    /// reply-to address is answered with its result.
    pub fn subscribe<M: Message>(mut self, bus: impl Into<String>, subscription: QueueSubscription) -> Self {
        add_route(&mut self.subscriptions, bus.into(), subscription, M::NAME, |a, b| {
            a.queue.name == b.queue.name && a.source == b.source
        });
        self
    }

    /// Send `C` to a queue as an RPC request and wait for the reply.
    ///
    /// The consumer only replies with a non-empty result, so `C::Output`
    /// should not be `()`.
    pub fn rpc<C: Command>(mut self, bus: impl Into<String>, queue: impl Into<String>) -> Self {
        add_route(&mut self.rpc_queues, bus.into(), queue.into(), C::NAME, |a, b| a == b);
        self
    }

    /// Every bus name a route refers to.
    pub fn bus_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .exchanges
            .iter()
            .map(|r| r.bus.as_str())
            .chain(self.queues.iter().map(|r| r.bus.as_str()))
            .chain(self.subscriptions.iter().map(|r| r.bus.as_str()))
            .chain(self.rpc_queues.iter().map(|r| r.bus.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
