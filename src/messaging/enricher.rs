//! Message enrichers run before a message reaches the publishers.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::dispatch::HandlerError;
use crate::message::{AnyMessage, MessageMeta};

/// Header carrying the id of the publishing host.
pub const MICROSERVICE_ID_HEADER: &str = "Microservice-Id";

/// Augments message metadata before publishing.
///
/// All enrichers are attempted even if one fails; failures are reported
/// together.
#[async_trait]
pub trait MessageEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, message: &dyn AnyMessage, meta: &mut MessageMeta) -> Result<(), HandlerError>;
}

/// Assigns a message id and defaults the correlation id to it.
#[derive(Debug, Default, Clone)]
pub struct CorrelationEnricher;

#[async_trait]
impl MessageEnricher for CorrelationEnricher {
    fn name(&self) -> &str {
        "CorrelationEnricher"
    }

    async fn enrich(&self, _message: &dyn AnyMessage, meta: &mut MessageMeta) -> Result<(), HandlerError> {
        let message_id = meta
            .message_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        meta.correlation_id.get_or_insert(message_id);
        Ok(())
    }
}

/// Stamps the time the message was published.
#[derive(Debug, Default, Clone)]
pub struct DateOccurredEnricher;

#[async_trait]
impl MessageEnricher for DateOccurredEnricher {
    fn name(&self) -> &str {
        "DateOccurredEnricher"
    }

    async fn enrich(&self, _message: &dyn AnyMessage, meta: &mut MessageMeta) -> Result<(), HandlerError> {
        meta.occurred_at.get_or_insert_with(Utc::now);
        Ok(())
    }
}

/// Records which microservice published the message.
#[derive(Debug, Clone)]
pub struct MicroserviceEnricher {
    app_name: String,
    host_id: String,
}

impl MicroserviceEnricher {
    pub fn new(app_name: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            host_id: host_id.into(),
        }
    }
}

#[async_trait]
impl MessageEnricher for MicroserviceEnricher {
    fn name(&self) -> &str {
        "MicroserviceEnricher"
    }

    async fn enrich(&self, _message: &dyn AnyMessage, meta: &mut MessageMeta) -> Result<(), HandlerError> {
        meta.published_by.get_or_insert_with(|| self.app_name.clone());
        meta.headers
            .entry(MICROSERVICE_ID_HEADER.to_string())
            .or_insert_with(|| self.host_id.clone());
        Ok(())
    }
}
