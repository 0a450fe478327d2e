use std::sync::Arc;

use async_trait::async_trait;

use super::{BusEntityContext, EntityRegistry};
use crate::cancellation::CancellationToken;
use crate::dispatch::DispatchError;
use crate::error::BrokerError;
use crate::message::PublishedMessage;
use crate::messaging::{MessagePublisher, MessagingService, PublisherType};

/// Sends published messages to the entity they are routed to.
///
/// Messages with no route are ignored. Send failures are returned to the
/// publishing caller.
pub struct BusPublisher {
    name: String,
    context: BusEntityContext,
    registry: Arc<EntityRegistry>,
}

impl BusPublisher {
    pub fn new(name: impl Into<String>, context: BusEntityContext, registry: Arc<EntityRegistry>) -> Self {
        Self {
            name: name.into(),
            context,
            registry,
        }
    }
}

#[async_trait]
impl MessagePublisher for BusPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn publisher_type(&self) -> PublisherType {
        PublisherType::Integration
    }

    async fn publish(
        &self,
        _messaging: &MessagingService,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let Some(entity) = self.registry.entity_for(message.name()) else {
            return Ok(());
        };
        let Some(strategy) = entity.publish_strategy() else {
            return Ok(());
        };

        strategy
            .send_to_entity(&self.context, entity, message, token)
            .await
            .map_err(|err| {
                tracing::error!(
                    bus = %entity.bus_name(),
                    entity = %entity.address(),
                    message_name = %message.name(),
                    error = %err,
                    "error sending message to broker"
                );
                match err {
                    BrokerError::RemoteDispatch { .. } => {
                        DispatchError::remote_dispatch(entity.bus_name(), entity.name(), message.name(), err)
                    }
                    err => DispatchError::broker(entity.bus_name(), entity.name(), message.name(), err),
                }
            })
    }
}
