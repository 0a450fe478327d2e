//! Processing of messages delivered by a broker subscription.

use std::sync::Arc;

use async_trait::async_trait;

use serde_json::Value;

use super::{BusEntity, BusEntityContext, DeliveryHandler, EntityAddress, ErrorReply, TransportEnvelope};
use crate::cancellation::CancellationToken;
use crate::logging::{hints, LogContext, MessageLog};
use crate::message::PublishedMessage;
use crate::serialization::ContentType;

/// What happened to one delivered envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Dispatched in-process with no reply requested or produced.
    Dispatched,
    /// Dispatched and the response was sent to the reply-to address.
    Replied { reply_to: String },
    /// Could not be decoded, dispatched or answered. A requester waiting on
    /// a reply-to address is sent an error reply.
    Failed(String),
}

/// Decodes envelopes for one entity and dispatches them in-process.
///
/// Failures are logged and contained so the subscription keeps receiving.
pub struct EntityReceiver {
    ctx: BusEntityContext,
    entity: Arc<BusEntity>,
    hint: &'static str,
}

impl EntityReceiver {
    pub fn new(ctx: BusEntityContext, entity: Arc<BusEntity>, hint: &'static str) -> Self {
        Self { ctx, entity, hint }
    }

    pub fn entity(&self) -> &Arc<BusEntity> {
        &self.entity
    }

    pub async fn process(&self, envelope: TransportEnvelope) -> DeliveryOutcome {
        let serializer = self.ctx.serializer();

        let content_type = match serializer.negotiate(&[envelope.content_type.as_deref(), self.entity.content_type()]) {
            Ok(content_type) => content_type,
            Err(err) => return self.fail(&envelope, None, err.to_string()).await,
        };

        let Some(name) = envelope
            .message_name()
            .map(str::to_string)
            .or_else(|| self.entity.default_message_name().map(str::to_string))
        else {
            return self
                .fail(&envelope, Some(content_type), "message type not specified".to_string())
                .await;
        };

        let message = match self
            .ctx
            .messaging()
            .registry()
            .decode(&name, serializer, &envelope.body, content_type)
        {
            Ok(message) => message,
            Err(err) => return self.fail(&envelope, Some(content_type), err.to_string()).await,
        };

        let mut meta = envelope.to_meta();
        meta.content_type = Some(content_type.to_string());
        let published = PublishedMessage::from_arc(message, meta);

        let logger = self.ctx.logger();
        let dispatched = self
            .ctx
            .messaging()
            .dispatch_in_process(&published, &CancellationToken::none())
            .await;

        if logger.is_enabled() {
            let mut entry = MessageLog::received(published.message().as_ref(), published.meta(), self.hint)
                .with_detail("Entity", self.entity.name())
                .with_detail("Bus", self.entity.bus_name());
            if let Err(err) = &dispatched {
                entry = entry.with_dispatch_error(err);
            }
            logger.log(entry);
        }

        if let Err(err) = dispatched {
            tracing::error!(
                bus = %self.entity.bus_name(),
                entity = %self.entity.name(),
                message_name = %name,
                errors = ?err.detail_lines(),
                "error dispatching received message"
            );
            let reason = err.to_string();
            self.reply_with_error(
                &envelope,
                ErrorReply {
                    message: reason.clone(),
                    details: err.detail_bag(),
                },
            )
            .await;
            return DeliveryOutcome::Failed(reason);
        }

        let Some(reply_to) = envelope.reply_to.clone() else {
            return DeliveryOutcome::Dispatched;
        };
        let Some(result) = published.result().filter(|r| !r.is_empty()) else {
            return DeliveryOutcome::Dispatched;
        };

        let body = match result.encode(serializer, content_type) {
            Ok(body) => body,
            Err(err) => return self.fail(&envelope, Some(content_type), err.to_string()).await,
        };
        let mut reply = envelope.reply(body);
        reply.content_type.get_or_insert_with(|| content_type.to_string());

        if logger.is_enabled() {
            let entry = MessageLog::raw(
                LogContext::Published,
                &name,
                &reply.body,
                Some(content_type),
                &reply.to_meta(),
                hints::REPLY,
            )
            .with_detail("ReplyTo", reply_to.clone());
            logger.log(entry);
        }

        let sent = match self.ctx.connection(self.entity.bus_name()).await {
            Ok(connection) => connection.send(&EntityAddress::queue(reply_to.clone()), reply).await,
            Err(err) => Err(err),
        };
        match sent {
            Ok(()) => DeliveryOutcome::Replied { reply_to },
            Err(err) => {
                tracing::error!(
                    bus = %self.entity.bus_name(),
                    reply_to = %reply_to,
                    error = %err,
                    "error sending reply"
                );
                DeliveryOutcome::Failed(err.to_string())
            }
        }
    }

    async fn fail(&self, envelope: &TransportEnvelope, content_type: Option<ContentType>, reason: String) -> DeliveryOutcome {
        tracing::error!(
            bus = %self.entity.bus_name(),
            entity = %self.entity.name(),
            message_id = ?envelope.message_id,
            reason = %reason,
            "error processing received message"
        );
        let logger = self.ctx.logger();
        if logger.is_enabled() {
            let mut entry = MessageLog::raw(
                LogContext::Received,
                envelope.message_name().unwrap_or("unknown"),
                &envelope.body,
                content_type,
                &envelope.to_meta(),
                self.hint,
            )
            .with_detail("Entity", self.entity.name());
            entry.add_error(reason.clone());
            logger.log(entry);
        }
        self.reply_with_error(
            envelope,
            ErrorReply {
                message: reason.clone(),
                details: Value::Null,
            },
        )
        .await;
        DeliveryOutcome::Failed(reason)
    }

    /// Tell a waiting requester its request failed. No-op without reply-to.
    async fn reply_with_error(&self, envelope: &TransportEnvelope, error: ErrorReply) {
        let Some(reply_to) = envelope.reply_to.as_deref() else {
            return;
        };
        let reply = envelope.error_reply(&error);
        let sent = match self.ctx.connection(self.entity.bus_name()).await {
            Ok(connection) => connection.send(&EntityAddress::queue(reply_to), reply).await,
            Err(err) => Err(err),
        };
        match sent {
            Ok(()) => tracing::debug!(entity = %self.entity.name(), reply_to = %reply_to, "error reply sent"),
            Err(err) => tracing::error!(
                bus = %self.entity.bus_name(),
                reply_to = %reply_to,
                error = %err,
                "error sending error reply"
            ),
        }
    }
}

#[async_trait]
impl DeliveryHandler for EntityReceiver {
    async fn deliver(&self, envelope: TransportEnvelope) {
        if let DeliveryOutcome::Replied { reply_to } = self.process(envelope).await {
            tracing::debug!(entity = %self.entity.name(), reply_to = %reply_to, "reply sent");
        }
    }
}
