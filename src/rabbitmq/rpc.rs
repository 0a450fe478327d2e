//! Request/reply over RabbitMQ queues.
//!
//! The client sends a command with its message id as correlation id and a
//! per-instance reply queue as reply-to, then waits for the consumer's
//! reply on that queue. Replies are matched to waiting callers by
//! correlation id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::bus::{
    connection_id, BusEntity, BusEntityContext, DeliveryHandler, DisposeStrategy, PublishStrategy,
    ReceiverHandle, SendStrategy, SubscriptionStrategy, TransportEnvelope,
};
use crate::cancellation::CancellationToken;
use crate::error::BrokerError;
use crate::logging::{hints, LogContext, MessageLog};
use crate::message::PublishedMessage;

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<TransportEnvelope>>>>;

/// RPC client for one bus.
///
/// Attached to the reply queue as its subscription and dispose strategy,
/// and to each request queue as its publish strategy.
pub struct RpcClient {
    bus_name: String,
    reply_queue: String,
    timeout: Duration,
    pending: Pending,
    receiver: tokio::sync::Mutex<Option<ReceiverHandle>>,
}

impl RpcClient {
    pub fn new(bus_name: impl Into<String>, reply_queue: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus_name: bus_name.into(),
            reply_queue: reply_queue.into(),
            timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            receiver: tokio::sync::Mutex::new(None),
        }
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn register(&self, correlation_id: &str) -> oneshot::Receiver<TransportEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(correlation_id.to_string(), tx);
        rx
    }

    fn forget(&self, correlation_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(correlation_id);
    }

    async fn attach(
        &self,
        ctx: &BusEntityContext,
        entity: &Arc<BusEntity>,
        handle: &mut Option<ReceiverHandle>,
    ) -> Result<(), BrokerError> {
        let connection = ctx.connection(entity.bus_name()).await?;
        let router = Arc::new(ReplyRouter {
            bus_name: self.bus_name.clone(),
            pending: self.pending.clone(),
        });
        let new_handle = connection.receive(&entity.address(), router).await?;
        if let Some(old) = handle.replace(new_handle) {
            old.stop().await;
        }
        Ok(())
    }
}

struct ReplyRouter {
    bus_name: String,
    pending: Pending,
}

#[async_trait]
impl DeliveryHandler for ReplyRouter {
    async fn deliver(&self, envelope: TransportEnvelope) {
        let waiter = envelope.correlation_id.as_deref().and_then(|id| {
            self.pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(id)
        });
        match waiter {
            Some(tx) => {
                let _ = tx.send(envelope);
            }
            None => tracing::warn!(
                bus = %self.bus_name,
                correlation_id = ?envelope.correlation_id,
                "reply does not match a pending request"
            ),
        }
    }
}

#[async_trait]
impl SubscriptionStrategy for RpcClient {
    async fn subscribe_entity(&self, ctx: &BusEntityContext, entity: &Arc<BusEntity>) -> Result<(), BrokerError> {
        let mut handle = self.receiver.lock().await;
        if handle.as_ref().is_some_and(|h| h.is_active()) {
            return Ok(());
        }
        self.attach(ctx, entity, &mut handle).await?;
        tracing::info!(bus = %self.bus_name, reply_queue = %self.reply_queue, "rpc reply queue consuming");
        Ok(())
    }

    async fn relink(&self, ctx: &BusEntityContext, entity: &Arc<BusEntity>) -> Result<bool, BrokerError> {
        let mut handle = self.receiver.lock().await;
        let connection = ctx.connection(entity.bus_name()).await?;
        if handle
            .as_ref()
            .is_some_and(|h| h.connection_id() == connection_id(&connection) && h.is_active())
        {
            return Ok(false);
        }
        self.attach(ctx, entity, &mut handle).await?;
        Ok(true)
    }
}

#[async_trait]
impl DisposeStrategy for RpcClient {
    async fn on_dispose(&self, _ctx: &BusEntityContext, _entity: &BusEntity) -> Result<(), BrokerError> {
        if let Some(handle) = self.receiver.lock().await.take() {
            handle.stop().await;
        }
        // Dropping the senders fails every waiting request.
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(())
    }
}

#[async_trait]
impl PublishStrategy for RpcClient {
    async fn send_to_entity(
        &self,
        ctx: &BusEntityContext,
        entity: &BusEntity,
        message: &PublishedMessage,
        _token: &CancellationToken,
    ) -> Result<(), BrokerError> {
        let mut envelope = SendStrategy::encode(ctx, entity, message)?;
        let correlation_id = envelope
            .message_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        envelope.correlation_id = Some(correlation_id.clone());
        envelope.reply_to = Some(self.reply_queue.clone());
        SendStrategy::log_published(ctx, entity, message, hints::RABBITMQ_PUBLISH);

        let reply = self.register(&correlation_id);
        let sent = match ctx.connection(entity.bus_name()).await {
            Ok(connection) => connection.send(&entity.address(), envelope).await,
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            self.forget(&correlation_id);
            return Err(err);
        }

        let reply = match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BrokerError::ConnectionClosed(self.bus_name.clone())),
            Err(_) => {
                self.forget(&correlation_id);
                tracing::warn!(
                    bus = %self.bus_name,
                    entity = %entity.name(),
                    correlation_id = %correlation_id,
                    "rpc request timed out"
                );
                return Err(BrokerError::RequestTimeout {
                    correlation_id,
                    millis: self.timeout.as_millis() as u64,
                });
            }
        };

        if let Some(failure) = reply.error_reply_body() {
            tracing::warn!(
                bus = %self.bus_name,
                entity = %entity.name(),
                correlation_id = %correlation_id,
                error = %failure.message,
                "rpc request failed at the receiver"
            );
            return Err(BrokerError::RemoteDispatch {
                correlation_id,
                message: failure.message,
                details: failure.details,
            });
        }

        let serializer = ctx.serializer();
        let content_type = serializer.negotiate(&[reply.content_type.as_deref(), entity.content_type()])?;
        let logger = ctx.logger();
        if logger.is_enabled() {
            logger.log(
                MessageLog::raw(
                    LogContext::Received,
                    message.name(),
                    &reply.body,
                    Some(content_type),
                    &reply.to_meta(),
                    hints::RABBITMQ_RPC_REPLY,
                )
                .with_detail("Bus", entity.bus_name())
                .with_detail("ReplyQueue", self.reply_queue.clone()),
            );
        }

        if let Some(decode) = message.result_decoder() {
            message.set_result(decode(serializer.as_ref(), &reply.body, content_type)?);
        }
        Ok(())
    }
}
