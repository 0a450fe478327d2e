use std::sync::Arc;

use super::{BusEntityContext, BusPublisher, EntityRegistry};
use crate::error::{BootstrapError, BrokerError};

/// Start and stop sequencing shared by the broker plugin modules.
///
/// Start creates every entity, then subscribes, then registers the bus
/// publisher. A failed start disposes what it set up and closes the
/// connections before returning the error. Stop unregisters the publisher, disposes every entity and
/// closes the cached connections.
pub struct BusRuntime {
    publisher_name: String,
    context: BusEntityContext,
    registry: Arc<EntityRegistry>,
}

impl BusRuntime {
    pub fn new(publisher_name: impl Into<String>, context: BusEntityContext, registry: Arc<EntityRegistry>) -> Self {
        Self {
            publisher_name: publisher_name.into(),
            context,
            registry,
        }
    }

    /// The runtime a module built during configure.
    pub fn configured<'a>(runtime: &'a Option<BusRuntime>, technology: &str) -> Result<&'a BusRuntime, BootstrapError> {
        runtime
            .as_ref()
            .ok_or_else(|| BootstrapError::InvalidState(format!("{technology} module has not been configured")))
    }

    pub fn context(&self) -> &BusEntityContext {
        &self.context
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub async fn start(&self) -> Result<(), BrokerError> {
        let dispatch = self.context.messaging().registry();
        for entity in self.registry.entities().iter().filter(|e| e.is_subscriber()) {
            for name in entity.message_names() {
                if dispatch.message_type(name).is_none() {
                    tracing::warn!(
                        bus = %entity.bus_name(),
                        entity = %entity.name(),
                        message_name = %name,
                        "subscribed message type is not registered and cannot be decoded"
                    );
                }
            }
        }
        if let Err(err) = self.link_entities().await {
            tracing::error!(technology = %self.context.technology(), error = %err, "bus start failed");
            self.release().await;
            return Err(err);
        }
        self.context.messaging().add_publisher(Arc::new(BusPublisher::new(
            self.publisher_name.clone(),
            self.context.clone(),
            self.registry.clone(),
        )));
        tracing::info!(
            technology = %self.context.technology(),
            entities = self.registry.entities().len(),
            "bus entities started"
        );
        Ok(())
    }

    async fn link_entities(&self) -> Result<(), BrokerError> {
        self.registry.create_entities(&self.context).await?;
        self.registry.subscribe_entities(&self.context).await
    }

    async fn release(&self) -> Vec<BrokerError> {
        let errors = self.registry.dispose_entities(&self.context).await;
        self.context.connections().close_all().await;
        errors
    }

    /// Disposes every entity even if some fail; returns the first failure.
    pub async fn stop(&self) -> Result<(), BrokerError> {
        self.context.messaging().remove_publisher(&self.publisher_name);
        let mut errors = self.release().await;
        tracing::info!(technology = %self.context.technology(), "bus entities disposed");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }
}
