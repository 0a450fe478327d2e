use async_trait::async_trait;

use super::MessagingService;
use crate::cancellation::CancellationToken;
use crate::dispatch::DispatchError;
use crate::message::PublishedMessage;

/// Where a publisher delivers messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherType {
    /// In-process handlers.
    Local,
    /// Publishers owned by the host application.
    Host,
    /// Broker integrations.
    Integration,
}

/// Delivers a published message somewhere.
///
/// The messaging service runs every publisher concurrently and aggregates
/// their failures into one `Publisher` error.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    fn name(&self) -> &str;

    fn publisher_type(&self) -> PublisherType;

    async fn publish(
        &self,
        messaging: &MessagingService,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError>;
}

/// Dispatches to in-process handlers.
#[derive(Debug, Default, Clone)]
pub struct LocalPublisher;

#[async_trait]
impl MessagePublisher for LocalPublisher {
    fn name(&self) -> &str {
        "LocalPublisher"
    }

    fn publisher_type(&self) -> PublisherType {
        PublisherType::Local
    }

    async fn publish(
        &self,
        messaging: &MessagingService,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        messaging.dispatch_local(message, token).await
    }
}
