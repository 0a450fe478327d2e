//! Recovery of receivers after a broker connection drop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{BrokerConnection, BusEntityContext, EntityRegistry};
use crate::cancellation::CancellationToken;
use crate::error::BrokerError;

struct SessionInner {
    bus_name: String,
    context: BusEntityContext,
    registry: Arc<EntityRegistry>,
    relink_lock: tokio::sync::Mutex<()>,
    reconnect_delay: Duration,
    relinked: AtomicUsize,
}

/// The session to one broker host.
///
/// Watches the host's connection and, when it closes, opens a new one and
/// relinks every receiver bound to the host. Any connection the session
/// picks up is checked for unlinked receivers first, so a drop that
/// happens before the watch starts is recovered as well.
#[derive(Clone)]
pub struct HostSession {
    inner: Arc<SessionInner>,
}

impl HostSession {
    pub fn new(
        bus_name: impl Into<String>,
        context: BusEntityContext,
        registry: Arc<EntityRegistry>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                bus_name: bus_name.into(),
                context,
                registry,
                relink_lock: tokio::sync::Mutex::new(()),
                reconnect_delay,
                relinked: AtomicUsize::new(0),
            }),
        }
    }

    pub fn bus_name(&self) -> &str {
        &self.inner.bus_name
    }

    /// Receivers relinked over the session's lifetime.
    pub fn relinked_count(&self) -> usize {
        self.inner.relinked.load(Ordering::SeqCst)
    }

    /// Replace the dropped connection `stale` and relink receivers.
    ///
    /// Serialized per host. A second call for a connection that was already
    /// replaced finds every receiver linked and relinks nothing.
    pub async fn on_connection_closed(&self, stale: &Arc<dyn BrokerConnection>) -> Result<usize, BrokerError> {
        let inner = &self.inner;
        let _guard = inner.relink_lock.lock().await;
        let connection = inner.context.connections().reconnect(&inner.bus_name, stale).await?;
        self.relink(&connection).await
    }

    /// The host's open connection, with every receiver linked to it.
    pub async fn ensure_linked(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let inner = &self.inner;
        let _guard = inner.relink_lock.lock().await;
        let connection = inner.context.connection(&inner.bus_name).await?;
        self.relink(&connection).await?;
        Ok(connection)
    }

    async fn relink(&self, connection: &Arc<dyn BrokerConnection>) -> Result<usize, BrokerError> {
        let inner = &self.inner;
        let relinked = inner.registry.relink_bus(&inner.context, &inner.bus_name).await?;
        inner.relinked.fetch_add(relinked, Ordering::SeqCst);
        if relinked > 0 {
            tracing::info!(
                technology = inner.context.technology(),
                bus = %inner.bus_name,
                host = %connection.host_name(),
                relinked,
                "receivers relinked"
            );
        }
        Ok(relinked)
    }

    /// Watch the host connection until `stop` is cancelled.
    pub fn watch(&self, stop: CancellationToken) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run(stop).await })
    }

    async fn run(self, stop: CancellationToken) {
        let technology = self.inner.context.technology();
        let bus = self.inner.bus_name.clone();
        loop {
            let connection = match self.ensure_linked().await {
                Ok(connection) => connection,
                Err(err) => {
                    tracing::error!(technology, bus = %bus, error = %err, "relink failed");
                    if self.pause(&stop).await {
                        return;
                    }
                    continue;
                }
            };

            let mut closed = connection.closed();
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = closed.wait_for(|closed| *closed) => {}
            }
            tracing::warn!(technology, bus = %bus, host = %connection.host_name(), "broker connection closed");
        }
    }

    /// Returns `true` when stopped during the pause.
    async fn pause(&self, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = stop.cancelled() => true,
            _ = tokio::time::sleep(self.inner.reconnect_delay) => false,
        }
    }
}
