use crate::message::DomainEvent;

#[derive(Debug, Clone)]
pub(crate) struct ChannelRoute {
    pub bus: String,
    pub channel: String,
    pub messages: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelSubscription {
    pub bus: String,
    pub channel: String,
    /// Glob matched against the route key. `None` receives everything.
    pub pattern: Option<String>,
    pub messages: Vec<&'static str>,
}

/// Which events are published to and received from which Redis channels.
///
/// Published events go to `channel.route_key`; subscribers match the
/// route key against a glob pattern (`*`, `?`).
#[derive(Debug, Clone, Default)]
pub struct RedisRouter {
    pub(crate) channels: Vec<ChannelRoute>,
    pub(crate) subscriptions: Vec<ChannelSubscription>,
}

impl RedisRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish<E: DomainEvent>(mut self, bus: impl Into<String>, channel: impl Into<String>) -> Self {
        let (bus, channel) = (bus.into(), channel.into());
        match self
            .channels
            .iter_mut()
            .find(|r| r.bus == bus && r.channel == channel)
        {
            Some(route) => route.messages.push(E::NAME),
            None => self.channels.push(ChannelRoute {
                bus,
                channel,
                messages: vec![E::NAME],
            }),
        }
        self
    }

    pub fn subscribe<E: DomainEvent>(mut self, bus: impl Into<String>, channel: impl Into<String>) -> Self {
        self.add_subscription::<E>(bus.into(), channel.into(), None);
        self
    }

    pub fn subscribe_pattern<E: DomainEvent>(
        mut self,
        bus: impl Into<String>,
        channel: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.add_subscription::<E>(bus.into(), channel.into(), Some(pattern.into()));
        self
    }

    fn add_subscription<E: DomainEvent>(&mut self, bus: String, channel: String, pattern: Option<String>) {
        match self
            .subscriptions
            .iter_mut()
            .find(|s| s.bus == bus && s.channel == channel && s.pattern == pattern)
        {
            Some(subscription) => subscription.messages.push(E::NAME),
            None => self.subscriptions.push(ChannelSubscription {
                bus,
                channel,
                pattern,
                messages: vec![E::NAME],
            }),
        }
    }

    pub fn bus_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .iter()
            .map(|r| r.bus.as_str())
            .chain(self.subscriptions.iter().map(|s| s.bus.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
