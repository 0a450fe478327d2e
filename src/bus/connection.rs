//! Broker connections and the per-host connection cache.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{EntityAddress, EntityDeclaration, TransportEnvelope};
use crate::cancellation::CancellationToken;
use crate::error::{BootstrapError, BrokerError};

/// Receives envelopes delivered to a subscribed entity.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, envelope: TransportEnvelope);
}

/// A live connection to one broker host.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn host_name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Create or update an entity. Declaring an existing entity is not an error.
    async fn declare(&self, declaration: &EntityDeclaration) -> Result<(), BrokerError>;

    async fn delete(&self, address: &EntityAddress) -> Result<(), BrokerError>;

    async fn send(&self, address: &EntityAddress, envelope: TransportEnvelope) -> Result<(), BrokerError>;

    /// Start delivering messages from `address` to `handler`.
    async fn receive(
        &self,
        address: &EntityAddress,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<ReceiverHandle, BrokerError>;

    /// Flips to `true` when the connection drops.
    fn closed(&self) -> watch::Receiver<bool>;

    async fn close(&self);
}

/// Identity of a connection, for comparing trait objects.
pub fn connection_id(connection: &Arc<dyn BrokerConnection>) -> usize {
    Arc::as_ptr(connection) as *const () as usize
}

/// A running receiver. Stopping it ends delivery to its handler.
pub struct ReceiverHandle {
    address: EntityAddress,
    connection_id: usize,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    pub fn new(address: EntityAddress, connection_id: usize, stop: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            address,
            connection_id,
            stop,
            task: Some(task),
        }
    }

    /// A handle with no task, for clients that manage delivery themselves.
    pub fn detached(address: EntityAddress, connection_id: usize, stop: CancellationToken) -> Self {
        Self {
            address,
            connection_id,
            stop,
            task: None,
        }
    }

    pub fn address(&self) -> &EntityAddress {
        &self.address
    }

    pub fn connection_id(&self) -> usize {
        self.connection_id
    }

    pub fn is_active(&self) -> bool {
        !self.stop.is_cancelled() && self.task.as_ref().map_or(true, |t| !t.is_finished())
    }

    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl fmt::Debug for ReceiverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverHandle")
            .field("address", &self.address)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Everything a connector needs to reach one configured bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionTarget {
    /// The configured name messages are routed by.
    pub bus_name: String,
    /// Host name or address of the broker.
    pub host_name: String,
    pub port: Option<u16>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Client-specific settings (virtual host, database, retry options).
    pub properties: BTreeMap<String, String>,
}

impl ConnectionTarget {
    pub fn new(bus_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            host_name: host_name.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Opens connections for one broker technology.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

type Slot = Arc<tokio::sync::Mutex<Option<Arc<dyn BrokerConnection>>>>;

/// Holds at most one live connection per configured bus.
///
/// Connections are opened lazily. The per-bus async mutex is held while
/// connecting, so concurrent callers wait for the first one and reuse its
/// connection.
pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    targets: HashMap<String, ConnectionTarget>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn Connector>, targets: impl IntoIterator<Item = ConnectionTarget>) -> Self {
        Self {
            connector,
            targets: targets.into_iter().map(|t| (t.bus_name.clone(), t)).collect(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Like `new`, but rejects a bus name configured twice.
    pub fn from_targets(connector: Arc<dyn Connector>, targets: Vec<ConnectionTarget>) -> Result<Self, BootstrapError> {
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.bus_name.as_str()) {
                return Err(BootstrapError::DuplicateBusName(target.bus_name.clone()));
            }
        }
        Ok(Self::new(connector, targets))
    }

    pub fn target(&self, bus_name: &str) -> Option<&ConnectionTarget> {
        self.targets.get(bus_name)
    }

    pub fn bus_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(|k| k.as_str())
    }

    fn slot(&self, bus_name: &str) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(bus_name.to_string())
            .or_default()
            .clone()
    }

    /// The open connection for a bus, connecting if needed.
    pub async fn get(&self, bus_name: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let slot = self.slot(bus_name);
        let mut current = slot.lock().await;
        if let Some(connection) = current.as_ref() {
            if connection.is_open() {
                return Ok(connection.clone());
            }
        }
        let connection = self.open(bus_name).await?;
        *current = Some(connection.clone());
        Ok(connection)
    }

    /// The connection currently cached for a bus, without connecting.
    pub async fn current(&self, bus_name: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.slot(bus_name).lock().await.clone()
    }

    /// Replace a dropped connection.
    ///
    /// If another caller already replaced `stale`, the newer connection is
    /// returned instead of opening a third.
    pub async fn reconnect(
        &self,
        bus_name: &str,
        stale: &Arc<dyn BrokerConnection>,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let slot = self.slot(bus_name);
        let mut current = slot.lock().await;
        if let Some(connection) = current.as_ref() {
            if connection_id(connection) != connection_id(stale) && connection.is_open() {
                return Ok(connection.clone());
            }
        }
        tracing::info!(bus = %bus_name, "reconnecting to broker");
        let connection = self.open(bus_name).await?;
        *current = Some(connection.clone());
        Ok(connection)
    }

    async fn open(&self, bus_name: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let target = self.targets.get(bus_name).ok_or_else(|| BrokerError::Connection {
            host: bus_name.to_string(),
            reason: "bus is not configured".to_string(),
        })?;
        let connection = self.connector.connect(target).await?;
        tracing::info!(bus = %bus_name, host = %target.host_name, "broker connection opened");
        Ok(connection)
    }

    /// Close and forget every cached connection.
    pub async fn close_all(&self) {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain()
            .collect();
        for (bus_name, slot) in slots {
            if let Some(connection) = slot.lock().await.take() {
                connection.close().await;
                tracing::info!(bus = %bus_name, "broker connection closed");
            }
        }
    }
}
