use std::collections::HashMap;
use std::sync::Arc;

use super::{BusEntity, BusEntityContext, EntityState};
use crate::error::{BootstrapError, BrokerError};

/// The entities of one broker technology and the message routes to them.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: Vec<Arc<BusEntity>>,
    publish_routes: HashMap<&'static str, Arc<BusEntity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Messages it publishes are routed to it. A message
    /// can be published to one entity per registry, so routing it to a
    /// second entity is rejected even when that entity is on another bus.
    pub fn add(&mut self, entity: BusEntity) -> Result<Arc<BusEntity>, BootstrapError> {
        let entity = Arc::new(entity);
        if entity.publish_strategy().is_some() {
            for name in entity.message_names() {
                if let Some(existing) = self.publish_routes.get(name) {
                    return Err(BootstrapError::MessageRoutedToMultipleEntities {
                        message: name.to_string(),
                        first: format!("{}/{}", existing.bus_name(), existing.name()),
                        second: format!("{}/{}", entity.bus_name(), entity.name()),
                    });
                }
            }
            for name in entity.message_names() {
                self.publish_routes.insert(name, entity.clone());
            }
        }
        self.entities.push(entity.clone());
        Ok(entity)
    }

    pub fn entities(&self) -> &[Arc<BusEntity>] {
        &self.entities
    }

    pub fn entity_for(&self, message_name: &str) -> Option<&Arc<BusEntity>> {
        self.publish_routes.get(message_name)
    }

    pub fn find(&self, bus_name: &str, entity_name: &str) -> Option<&Arc<BusEntity>> {
        self.entities
            .iter()
            .find(|e| e.bus_name() == bus_name && e.name() == entity_name)
    }

    pub fn subscribers_on(&self, bus_name: &str) -> impl Iterator<Item = &Arc<BusEntity>> + '_ {
        let bus_name = bus_name.to_string();
        self.entities
            .iter()
            .filter(move |e| e.bus_name() == bus_name && e.is_subscriber())
    }

    /// Run every creation strategy. Stops at the first failure.
    pub async fn create_entities(&self, ctx: &BusEntityContext) -> Result<(), BrokerError> {
        for entity in &self.entities {
            for strategy in entity.creation_strategies() {
                strategy.create_entity(ctx, entity).await?;
            }
            entity.set_state(EntityState::Created);
        }
        Ok(())
    }

    /// Run every subscription strategy. Stops at the first failure.
    pub async fn subscribe_entities(&self, ctx: &BusEntityContext) -> Result<(), BrokerError> {
        for entity in &self.entities {
            if !entity.is_subscriber() {
                continue;
            }
            for strategy in entity.subscription_strategies() {
                strategy.subscribe_entity(ctx, entity).await?;
            }
            entity.set_state(EntityState::Subscribed);
        }
        Ok(())
    }

    /// Run every dispose strategy, continuing past failures.
    pub async fn dispose_entities(&self, ctx: &BusEntityContext) -> Vec<BrokerError> {
        let mut errors = Vec::new();
        for entity in &self.entities {
            for strategy in entity.dispose_strategies() {
                if let Err(err) = strategy.on_dispose(ctx, entity).await {
                    tracing::warn!(bus = %entity.bus_name(), entity = %entity.address(), error = %err, "dispose failed");
                    errors.push(err);
                }
            }
            entity.set_state(EntityState::Disposed);
        }
        errors
    }

    /// Relink every subscriber bound to a bus. Returns the number relinked.
    pub async fn relink_bus(&self, ctx: &BusEntityContext, bus_name: &str) -> Result<usize, BrokerError> {
        let mut relinked = 0;
        for entity in self.subscribers_on(bus_name) {
            for strategy in entity.subscription_strategies() {
                if strategy.relink(ctx, entity).await? {
                    relinked += 1;
                }
            }
        }
        Ok(relinked)
    }
}
