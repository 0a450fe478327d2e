//! Context passed to message handlers.

use std::sync::Arc;

use super::{MessagingService, Scope};
use crate::cancellation::CancellationToken;
use crate::dispatch::{DispatchError, HandlerError};
use crate::message::{Command, DomainEvent, MessageMeta, Query};

/// The context passed to every handler invocation.
///
/// Holds the per-dispatch scope, the metadata of the message being handled
/// and the cancellation token (a never-cancelled one unless the handler was
/// declared cancellable). Messages published through the context keep the
/// current correlation id.
#[derive(Clone)]
pub struct HandlerContext {
    scope: Arc<Scope>,
    messaging: MessagingService,
    meta: MessageMeta,
    token: CancellationToken,
}

impl HandlerContext {
    pub(crate) fn new(scope: Scope, messaging: MessagingService, meta: MessageMeta, token: CancellationToken) -> Self {
        Self {
            scope: Arc::new(scope),
            messaging,
            meta,
            token,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.scope.resolve::<T>()
    }

    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, HandlerError> {
        self.scope.require::<T>()
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.messaging
    }

    pub fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with `Cancelled` if the token was cancelled.
    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.token.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }
        Ok(())
    }

    /// Publish a child event correlated with the message being handled.
    pub async fn publish<E: DomainEvent>(&self, event: E) -> Result<(), DispatchError> {
        self.messaging
            .publish_with(event, MessageMeta::correlated_with(&self.meta), self.token.clone())
            .await
    }

    /// Send a child command correlated with the message being handled.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.messaging
            .send_with(command, MessageMeta::correlated_with(&self.meta), self.token.clone())
            .await
    }

    pub async fn execute<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.messaging
            .execute_with(query, MessageMeta::correlated_with(&self.meta), self.token.clone())
            .await
    }
}
