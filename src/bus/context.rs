use std::sync::Arc;

use super::{BrokerConnection, ConnectionCache};
use crate::error::BrokerError;
use crate::logging::MessageLogger;
use crate::messaging::MessagingService;
use crate::serialization::SerializationManager;

/// Shared services handed to every strategy of one broker technology.
///
/// Lives as long as the plugin module that created it.
#[derive(Clone)]
pub struct BusEntityContext {
    technology: &'static str,
    app_name: String,
    host_id: String,
    messaging: MessagingService,
    connections: Arc<ConnectionCache>,
}

impl BusEntityContext {
    pub fn new(
        technology: &'static str,
        app_name: impl Into<String>,
        host_id: impl Into<String>,
        messaging: MessagingService,
        connections: Arc<ConnectionCache>,
    ) -> Self {
        Self {
            technology,
            app_name: app_name.into(),
            host_id: host_id.into(),
            messaging,
            connections,
        }
    }

    pub fn technology(&self) -> &'static str {
        self.technology
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Unique id of this running instance.
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.messaging
    }

    pub fn serializer(&self) -> &Arc<SerializationManager> {
        self.messaging.serializer()
    }

    pub fn logger(&self) -> &Arc<dyn MessageLogger> {
        self.messaging.logger()
    }

    pub fn connections(&self) -> &Arc<ConnectionCache> {
        &self.connections
    }

    pub async fn connection(&self, bus_name: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        self.connections.get(bus_name).await
    }
}
