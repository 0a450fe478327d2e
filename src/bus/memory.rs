//! In-memory broker for testing and single-process scenarios.
//!
//! Implements `Connector` for every broker technology, so plugin modules can
//! run against it unchanged:
//!
//! - queues deliver to one consumer at a time, round-robin, and keep a
//!   backlog while nobody is receiving
//! - topics copy each message to every subscription whose filters match
//! - the latest declarations, sends and receives are recorded for
//!   inspection, up to a record limit per log
//! - `drop_connections` simulates a broker-side connection drop
//!
//! Entities are kept per bus name. Declarations are strict (a subscription
//! needs its topic). Sending and receiving create missing queues and topics
//! on first use.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::filter::route_matches;
use super::{
    BrokerConnection, ConnectionTarget, Connector, DeliveryHandler, EntityAddress, EntityDeclaration,
    EntityOptions, ReceiverHandle, TopicKind, TransportEnvelope,
};
use crate::cancellation::CancellationToken;
use crate::error::BrokerError;

/// Entries kept per inspection log unless `with_record_limit` says otherwise.
pub const DEFAULT_RECORD_LIMIT: usize = 4096;

/// A message accepted by the broker.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub host: String,
    pub connection_id: usize,
    pub address: EntityAddress,
    pub envelope: TransportEnvelope,
}

/// A receiver attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRecord {
    pub host: String,
    pub connection_id: usize,
    pub address: EntityAddress,
}

struct Consumer {
    connection_id: usize,
    tx: mpsc::UnboundedSender<TransportEnvelope>,
    stop: CancellationToken,
}

impl Consumer {
    fn is_live(&self) -> bool {
        !self.stop.is_cancelled() && !self.tx.is_closed()
    }
}

#[derive(Default)]
struct Endpoint {
    options: EntityOptions,
    backlog: VecDeque<TransportEnvelope>,
    consumers: Vec<Consumer>,
    next: usize,
}

impl Endpoint {
    fn deliver(&mut self, envelope: TransportEnvelope) {
        self.consumers.retain(|c| c.is_live());
        if self.consumers.is_empty() {
            self.backlog.push_back(envelope);
            return;
        }
        let index = self.next % self.consumers.len();
        self.next = self.next.wrapping_add(1);
        if let Err(mpsc::error::SendError(envelope)) = self.consumers[index].tx.send(envelope) {
            self.backlog.push_back(envelope);
        }
    }

    fn attach(&mut self, consumer: Consumer) {
        while let Some(envelope) = self.backlog.pop_front() {
            if let Err(mpsc::error::SendError(envelope)) = consumer.tx.send(envelope) {
                self.backlog.push_front(envelope);
                break;
            }
        }
        self.consumers.push(consumer);
    }
}

struct Topic {
    kind: TopicKind,
    placeholder: bool,
}

struct Subscription {
    filters: Vec<String>,
    endpoint: Endpoint,
}

#[derive(Default)]
struct Host {
    queues: HashMap<String, Endpoint>,
    topics: HashMap<String, Topic>,
    subscriptions: HashMap<(String, String), Subscription>,
}

struct ConnectionRecord {
    id: usize,
    host: String,
    open: Arc<AtomicBool>,
    closed: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct State {
    hosts: HashMap<String, Host>,
    connections: Vec<ConnectionRecord>,
    connect_counts: HashMap<String, usize>,
    declarations: VecDeque<(String, EntityDeclaration)>,
    deletions: VecDeque<(String, EntityAddress)>,
    sent: VecDeque<SentRecord>,
    receives: VecDeque<ReceiveRecord>,
    failing_entities: HashSet<String>,
    unreachable_hosts: HashSet<String>,
    connect_delay: Option<Duration>,
    record_limit: Option<usize>,
}

impl State {
    fn limit(&self) -> usize {
        self.record_limit.unwrap_or(DEFAULT_RECORD_LIMIT)
    }
}

/// Append to an inspection log, dropping the oldest entries past `limit`.
fn record<T>(log: &mut VecDeque<T>, limit: usize, entry: T) {
    log.push_back(entry);
    while log.len() > limit {
        log.pop_front();
    }
}

/// In-memory broker shared by every connection it opens.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    connection_ids: Arc<AtomicU64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Delay each connect, to widen races in tests.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    /// Keep at most `limit` entries in each inspection log.
    pub fn with_record_limit(self, limit: usize) -> Self {
        self.lock().record_limit = Some(limit);
        self
    }

    /// Make sends to the named entity fail.
    pub fn fail_sends_to(&self, entity_name: impl Into<String>) {
        self.lock().failing_entities.insert(entity_name.into());
    }

    pub fn set_unreachable(&self, host: impl Into<String>, unreachable: bool) {
        let host = host.into();
        let mut state = self.lock();
        if unreachable {
            state.unreachable_hosts.insert(host);
        } else {
            state.unreachable_hosts.remove(&host);
        }
    }

    /// Close every open connection to `host` and stop its receivers, as if
    /// the broker dropped them. Returns how many connections were dropped.
    pub fn drop_connections(&self, host: &str) -> usize {
        let mut state = self.lock();
        let dropped: Vec<usize> = state
            .connections
            .iter()
            .filter(|c| c.host == host && c.open.load(Ordering::SeqCst))
            .map(|c| c.id)
            .collect();

        if let Some(entities) = state.hosts.get_mut(host) {
            let detach = |endpoint: &mut Endpoint| {
                for consumer in endpoint.consumers.iter().filter(|c| dropped.contains(&c.connection_id)) {
                    consumer.stop.cancel();
                }
                endpoint.consumers.retain(|c| !dropped.contains(&c.connection_id));
            };
            entities.queues.values_mut().for_each(detach);
            entities.subscriptions.values_mut().for_each(|s| detach(&mut s.endpoint));
        }

        for record in state.connections.iter().filter(|c| dropped.contains(&c.id)) {
            record.open.store(false, Ordering::SeqCst);
            record.closed.send_replace(true);
        }
        state.connections.retain(|c| !dropped.contains(&c.id));
        tracing::debug!(host = %host, count = dropped.len(), "in-memory connections dropped");
        dropped.len()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn connect_count(&self, host: &str) -> usize {
        self.lock().connect_counts.get(host).copied().unwrap_or(0)
    }

    pub fn open_connections(&self, host: &str) -> usize {
        self.lock()
            .connections
            .iter()
            .filter(|c| c.host == host && c.open.load(Ordering::SeqCst))
            .count()
    }

    pub fn declarations(&self, host: &str) -> Vec<EntityDeclaration> {
        self.lock()
            .declarations
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn deletions(&self, host: &str) -> Vec<EntityAddress> {
        self.lock()
            .deletions
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.lock().sent.iter().cloned().collect()
    }

    pub fn sent_to(&self, address: &EntityAddress) -> Vec<TransportEnvelope> {
        self.lock()
            .sent
            .iter()
            .filter(|r| &r.address == address)
            .map(|r| r.envelope.clone())
            .collect()
    }

    pub fn receives(&self) -> Vec<ReceiveRecord> {
        self.lock().receives.iter().cloned().collect()
    }

    /// Connections the broker still tracks. Closed and dropped ones are
    /// forgotten.
    pub fn tracked_connections(&self) -> usize {
        self.lock().connections.len()
    }

    fn forget_connection(&self, id: usize) {
        self.lock().connections.retain(|c| c.id != id);
    }

    pub fn has_queue(&self, host: &str, name: &str) -> bool {
        self.lock().hosts.get(host).is_some_and(|h| h.queues.contains_key(name))
    }

    pub fn has_subscription(&self, host: &str, topic: &str, name: &str) -> bool {
        self.lock()
            .hosts
            .get(host)
            .is_some_and(|h| h.subscriptions.contains_key(&(topic.to_string(), name.to_string())))
    }

    /// `Some(true)` for a placeholder topic, `None` if it does not exist.
    pub fn topic_is_placeholder(&self, host: &str, name: &str) -> Option<bool> {
        self.lock()
            .hosts
            .get(host)
            .and_then(|h| h.topics.get(name))
            .map(|t| t.placeholder)
    }

    pub fn queue_options(&self, host: &str, name: &str) -> Option<EntityOptions> {
        self.lock()
            .hosts
            .get(host)
            .and_then(|h| h.queues.get(name))
            .map(|q| q.options.clone())
    }

    /// Live consumers attached to an entity.
    pub fn active_consumers(&self, host: &str, address: &EntityAddress) -> usize {
        let state = self.lock();
        let Some(entities) = state.hosts.get(host) else {
            return 0;
        };
        let endpoint = match address {
            EntityAddress::Queue(name) => entities.queues.get(name),
            EntityAddress::Subscription { topic, name } => entities
                .subscriptions
                .get(&(topic.clone(), name.clone()))
                .map(|s| &s.endpoint),
            EntityAddress::Topic(_) => None,
        };
        endpoint.map_or(0, |e| e.consumers.iter().filter(|c| c.is_live()).count())
    }

    // =========================================================================
    // Connection operations
    // =========================================================================

    fn declare(&self, host: &str, declaration: &EntityDeclaration) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let limit = state.limit();
        record(&mut state.declarations, limit, (host.to_string(), declaration.clone()));
        let entities = state.hosts.entry(host.to_string()).or_default();

        match declaration {
            EntityDeclaration::Queue { name, options } => {
                entities.queues.entry(name.clone()).or_default().options = options.clone();
            }
            EntityDeclaration::Topic { name, kind, placeholder } => {
                let topic = entities.topics.entry(name.clone()).or_insert(Topic {
                    kind: *kind,
                    placeholder: *placeholder,
                });
                if !*placeholder {
                    topic.kind = *kind;
                    topic.placeholder = false;
                }
            }
            EntityDeclaration::Subscription {
                topic,
                name,
                filters,
                options,
            } => {
                if !entities.topics.contains_key(topic) {
                    return Err(BrokerError::EntityNotFound(topic.clone()));
                }
                let subscription = entities
                    .subscriptions
                    .entry((topic.clone(), name.clone()))
                    .or_insert_with(|| Subscription {
                        filters: Vec::new(),
                        endpoint: Endpoint::default(),
                    });
                subscription.filters = filters.clone();
                subscription.endpoint.options = options.clone();
            }
        }
        Ok(())
    }

    fn delete(&self, host: &str, address: &EntityAddress) {
        let mut state = self.lock();
        let limit = state.limit();
        record(&mut state.deletions, limit, (host.to_string(), address.clone()));
        let Some(entities) = state.hosts.get_mut(host) else {
            return;
        };
        match address {
            EntityAddress::Queue(name) => {
                entities.queues.remove(name);
            }
            EntityAddress::Topic(name) => {
                entities.topics.remove(name);
                entities.subscriptions.retain(|(topic, _), _| topic != name);
            }
            EntityAddress::Subscription { topic, name } => {
                entities.subscriptions.remove(&(topic.clone(), name.clone()));
            }
        }
    }

    fn send(
        &self,
        host: &str,
        connection_id: usize,
        address: &EntityAddress,
        envelope: TransportEnvelope,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if state.failing_entities.contains(address.name()) {
            return Err(BrokerError::Send {
                entity: address.name().to_string(),
                reason: "send rejected by broker".to_string(),
            });
        }
        let limit = state.limit();
        record(
            &mut state.sent,
            limit,
            SentRecord {
                host: host.to_string(),
                connection_id,
                address: address.clone(),
                envelope: envelope.clone(),
            },
        );
        let entities = state.hosts.entry(host.to_string()).or_default();

        match address {
            EntityAddress::Queue(name) => {
                entities.queues.entry(name.clone()).or_default().deliver(envelope);
            }
            EntityAddress::Topic(name) => {
                let kind = entities
                    .topics
                    .entry(name.clone())
                    .or_insert(Topic {
                        kind: TopicKind::default(),
                        placeholder: false,
                    })
                    .kind;
                for ((topic, _), subscription) in entities.subscriptions.iter_mut() {
                    if topic == name && route_matches(kind, &subscription.filters, envelope.subject.as_deref()) {
                        subscription.endpoint.deliver(envelope.clone());
                    }
                }
            }
            EntityAddress::Subscription { .. } => {
                return Err(BrokerError::Send {
                    entity: address.to_string(),
                    reason: "cannot send to a subscription".to_string(),
                });
            }
        }
        Ok(())
    }

    fn attach(&self, host: &str, address: &EntityAddress, consumer: Consumer) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let limit = state.limit();
        record(
            &mut state.receives,
            limit,
            ReceiveRecord {
                host: host.to_string(),
                connection_id: consumer.connection_id,
                address: address.clone(),
            },
        );
        let entities = state.hosts.entry(host.to_string()).or_default();

        match address {
            EntityAddress::Queue(name) => entities.queues.entry(name.clone()).or_default().attach(consumer),
            EntityAddress::Subscription { topic, name } => {
                entities.topics.entry(topic.clone()).or_insert(Topic {
                    kind: TopicKind::default(),
                    placeholder: false,
                });
                entities
                    .subscriptions
                    .entry((topic.clone(), name.clone()))
                    .or_insert_with(|| Subscription {
                        filters: Vec::new(),
                        endpoint: Endpoint::default(),
                    })
                    .endpoint
                    .attach(consumer);
            }
            EntityAddress::Topic(name) => {
                return Err(BrokerError::Receive {
                    entity: name.clone(),
                    reason: "receive from a subscription of the topic".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let host = target.bus_name.clone();
        let delay = {
            let mut state = self.lock();
            *state.connect_counts.entry(host.clone()).or_default() += 1;
            if state.unreachable_hosts.contains(&host) {
                return Err(BrokerError::Connection {
                    host,
                    reason: "host unreachable".to_string(),
                });
            }
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (closed, _) = watch::channel(false);
        let connection = Arc::new(InMemoryConnection {
            host: host.clone(),
            broker: self.clone(),
            open: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(closed),
            serial: self.connection_ids.fetch_add(1, Ordering::SeqCst),
        });
        let as_dyn: Arc<dyn BrokerConnection> = connection.clone();
        self.lock().connections.push(ConnectionRecord {
            id: super::connection_id(&as_dyn),
            host,
            open: connection.open.clone(),
            closed: connection.closed.clone(),
        });
        Ok(as_dyn)
    }
}

/// A connection opened by `InMemoryBroker`.
pub struct InMemoryConnection {
    host: String,
    broker: InMemoryBroker,
    open: Arc<AtomicBool>,
    closed: Arc<watch::Sender<bool>>,
    serial: u64,
}

impl InMemoryConnection {
    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Order in which the broker opened this connection.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ConnectionClosed(self.host.clone()))
        }
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    fn host_name(&self) -> &str {
        &self.host
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare(&self, declaration: &EntityDeclaration) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker.declare(&self.host, declaration)
    }

    async fn delete(&self, address: &EntityAddress) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker.delete(&self.host, address);
        Ok(())
    }

    async fn send(&self, address: &EntityAddress, envelope: TransportEnvelope) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker.send(&self.host, self.id(), address, envelope)
    }

    async fn receive(
        &self,
        address: &EntityAddress,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<ReceiverHandle, BrokerError> {
        self.ensure_open()?;
        let (tx, mut rx) = mpsc::unbounded_channel::<TransportEnvelope>();
        let stop = CancellationToken::new();

        self.broker.attach(
            &self.host,
            address,
            Consumer {
                connection_id: self.id(),
                tx,
                stop: stop.clone(),
            },
        )?;

        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    envelope = rx.recv() => match envelope {
                        Some(envelope) => handler.deliver(envelope).await,
                        None => break,
                    },
                }
            }
        });

        Ok(ReceiverHandle::new(address.clone(), self.id(), stop, task))
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.broker.forget_connection(self.id());
    }
}
