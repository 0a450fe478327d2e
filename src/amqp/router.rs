use crate::bus::{EntityAddress, EntityDeclaration, TopicKind};
use crate::message::{Command, Message};

#[derive(Debug, Clone)]
pub(crate) struct AmqpLink {
    pub bus: String,
    pub address: EntityAddress,
    pub messages: Vec<&'static str>,
}

impl AmqpLink {
    pub fn declaration(&self) -> EntityDeclaration {
        match &self.address {
            EntityAddress::Queue(name) => EntityDeclaration::queue(name.clone()),
            EntityAddress::Topic(name) => EntityDeclaration::topic(name.clone(), TopicKind::Topic),
            EntityAddress::Subscription { topic, name } => {
                EntityDeclaration::subscription(topic.clone(), name.clone(), Vec::new())
            }
        }
    }
}

fn link(links: &mut Vec<AmqpLink>, bus: String, address: EntityAddress, message: &'static str) {
    match links.iter_mut().find(|l| l.bus == bus && l.address == address) {
        Some(link) if !link.messages.contains(&message) => link.messages.push(message),
        Some(_) => {}
        None => links.push(AmqpLink {
            bus,
            address,
            messages: vec![message],
        }),
    }
}

/// Sender and receiver links to existing AMQP entities.
///
/// AMQP 1.0 does not create entities; they must exist on the host.
#[derive(Debug, Clone, Default)]
pub struct AmqpRouter {
    pub(crate) senders: Vec<AmqpLink>,
    pub(crate) receivers: Vec<AmqpLink>,
}

impl AmqpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_to_queue<C: Command>(mut self, bus: impl Into<String>, queue: impl Into<String>) -> Self {
        link(&mut self.senders, bus.into(), EntityAddress::queue(queue), C::NAME);
        self
    }

    pub fn publish_to_topic<M: Message>(mut self, bus: impl Into<String>, topic: impl Into<String>) -> Self {
        link(&mut self.senders, bus.into(), EntityAddress::topic(topic), M::NAME);
        self
    }

    pub fn receive_from_queue<M: Message>(mut self, bus: impl Into<String>, queue: impl Into<String>) -> Self {
        link(&mut self.receivers, bus.into(), EntityAddress::queue(queue), M::NAME);
        self
    }

    pub fn receive_from_subscription<M: Message>(
        mut self,
        bus: impl Into<String>,
        topic: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        link(
            &mut self.receivers,
            bus.into(),
            EntityAddress::subscription(topic, subscription),
            M::NAME,
        );
        self
    }

    pub fn bus_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .senders
            .iter()
            .chain(self.receivers.iter())
            .map(|l| l.bus.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
