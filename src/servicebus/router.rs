//! Route definitions for Azure Service Bus.

use crate::bus::EntityOptions;
use crate::message::{Command, Message};

/// A queue, either sent to or consumed from.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMeta {
    pub name: String,
    pub options: EntityOptions,
    pub content_type: Option<String>,
}

impl QueueMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: EntityOptions::default(),
            content_type: None,
        }
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

/// A topic messages are published to.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMeta {
    pub name: String,
    pub content_type: Option<String>,
}

impl TopicMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A subscription to a topic.
///
/// A fan-out subscription has no fixed name: each running instance gets
/// its own, deleted when the instance stops.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionMeta {
    pub topic: String,
    pub name: Option<String>,
    /// Route keys the subscription accepts. Empty accepts everything.
    pub filters: Vec<String>,
    pub options: EntityOptions,
}

impl SubscriptionMeta {
    pub fn new(topic: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: Some(name.into()),
            filters: Vec::new(),
            options: EntityOptions::default(),
        }
    }

    pub fn fanout(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: None,
            filters: Vec::new(),
            options: EntityOptions::default(),
        }
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: EntityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_fanout(&self) -> bool {
        self.name.is_none()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Routed<D> {
    pub bus: String,
    pub meta: D,
    pub messages: Vec<&'static str>,
}

fn route<D: PartialEq>(routes: &mut Vec<Routed<D>>, bus: String, meta: D, message: &'static str) {
    match routes.iter_mut().find(|r| r.bus == bus && r.meta == meta) {
        Some(routed) if !routed.messages.contains(&message) => routed.messages.push(message),
        Some(_) => {}
        None => routes.push(Routed {
            bus,
            meta,
            messages: vec![message],
        }),
    }
}

/// Which messages go to and come from which Service Bus entities.
#[derive(Debug, Clone, Default)]
pub struct ServiceBusRouter {
    pub(crate) send_queues: Vec<Routed<QueueMeta>>,
    pub(crate) topics: Vec<Routed<TopicMeta>>,
    pub(crate) receive_queues: Vec<Routed<QueueMeta>>,
    pub(crate) subscriptions: Vec<Routed<SubscriptionMeta>>,
}

impl ServiceBusRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `C` to a queue.
    pub fn send_to_queue<C: Command>(mut self, bus: impl Into<String>, queue: QueueMeta) -> Self {
        route(&mut self.send_queues, bus.into(), queue, C::NAME);
        self
    }

    /// Publish `M` to a topic.
    pub fn publish_to_topic<M: Message>(mut self, bus: impl Into<String>, topic: TopicMeta) -> Self {
        route(&mut self.topics, bus.into(), topic, M::NAME);
        self
    }

    /// Consume `M` from a queue.
    pub fn receive_from_queue<M: Message>(mut self, bus: impl Into<String>, queue: QueueMeta) -> Self {
        route(&mut self.receive_queues, bus.into(), queue, M::NAME);
        self
    }

    /// Consume `M` from a topic subscription.
    pub fn subscribe<M: Message>(mut self, bus: impl Into<String>, subscription: SubscriptionMeta) -> Self {
        route(&mut self.subscriptions, bus.into(), subscription, M::NAME);
        self
    }

    pub fn bus_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .send_queues
            .iter()
            .map(|r| r.bus.as_str())
            .chain(self.topics.iter().map(|r| r.bus.as_str()))
            .chain(self.receive_queues.iter().map(|r| r.bus.as_str()))
            .chain(self.subscriptions.iter().map(|r| r.bus.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
