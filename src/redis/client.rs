//! `Connector` backed by the `redis` crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;

use super::frame::{channel_name, decode_frame, encode_frame};
use crate::bus::{
    BrokerConnection, ConnectionTarget, Connector, DeliveryHandler, EntityAddress, EntityDeclaration, ReceiverHandle,
    TransportEnvelope,
};
use crate::cancellation::CancellationToken;
use crate::error::BrokerError;

const DEFAULT_PORT: u16 = 6379;

/// Opens Redis connections for configured buses.
#[derive(Debug, Default, Clone)]
pub struct RedisConnector;

fn redis_url(target: &ConnectionTarget) -> String {
    let auth = match (&target.user_name, &target.password) {
        (Some(user), Some(password)) => format!("{user}:{password}@"),
        (None, Some(password)) => format!(":{password}@"),
        _ => String::new(),
    };
    let database = target.properties.get("database").map(String::as_str).unwrap_or("0");
    format!(
        "redis://{auth}{}:{}/{database}",
        target.host_name,
        target.port.unwrap_or(DEFAULT_PORT)
    )
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let connection_error = |e: ::redis::RedisError| BrokerError::Connection {
            host: target.host_name.clone(),
            reason: e.to_string(),
        };
        let client = ::redis::Client::open(redis_url(target).as_str()).map_err(connection_error)?;
        let publisher = client.get_async_connection().await.map_err(connection_error)?;
        let (closed, _) = watch::channel(false);
        Ok(Arc::new(RedisConnection {
            host: target.host_name.clone(),
            client,
            publisher: tokio::sync::Mutex::new(publisher),
            patterns: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
            closed: Arc::new(closed),
        }))
    }
}

/// One Redis client: a shared connection for publishing and a dedicated
/// pub/sub connection per receiver.
pub struct RedisConnection {
    host: String,
    client: ::redis::Client,
    publisher: tokio::sync::Mutex<::redis::aio::Connection>,
    /// Declared subscription filters, keyed by (channel, subscription).
    patterns: Mutex<HashMap<(String, String), Vec<String>>>,
    open: AtomicBool,
    closed: Arc<watch::Sender<bool>>,
}

impl RedisConnection {
    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
    }

    fn channel_patterns(&self, channel: &str, name: &str) -> Vec<String> {
        let filters = self
            .patterns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(channel.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default();
        if filters.is_empty() {
            vec![channel.to_string(), format!("{channel}.*")]
        } else {
            filters.iter().map(|f| format!("{channel}.{f}")).collect()
        }
    }
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    fn host_name(&self) -> &str {
        &self.host
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare(&self, declaration: &EntityDeclaration) -> Result<(), BrokerError> {
        match declaration {
            EntityDeclaration::Topic { .. } => Ok(()),
            EntityDeclaration::Subscription { topic, name, filters, .. } => {
                self.patterns
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert((topic.clone(), name.clone()), filters.clone());
                Ok(())
            }
            EntityDeclaration::Queue { name, .. } => Err(BrokerError::Declare {
                entity: name.clone(),
                reason: "redis pub/sub has no queues".to_string(),
            }),
        }
    }

    async fn delete(&self, address: &EntityAddress) -> Result<(), BrokerError> {
        if let EntityAddress::Subscription { topic, name } = address {
            self.patterns
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&(topic.clone(), name.clone()));
        }
        Ok(())
    }

    async fn send(&self, address: &EntityAddress, envelope: TransportEnvelope) -> Result<(), BrokerError> {
        let channel = match address {
            EntityAddress::Topic(channel) => channel_name(channel, envelope.subject.as_deref()),
            // Replies are published on the reply-to channel.
            EntityAddress::Queue(name) => name.clone(),
            EntityAddress::Subscription { .. } => {
                return Err(BrokerError::Send {
                    entity: address.to_string(),
                    reason: "cannot publish to a subscription".to_string(),
                })
            }
        };
        let frame = encode_frame(&channel, &envelope)?;

        let mut publisher = self.publisher.lock().await;
        let published: Result<i64, ::redis::RedisError> = ::redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(frame)
            .query_async(&mut *publisher)
            .await;
        match published {
            Ok(receivers) => {
                tracing::trace!(channel = %channel, receivers, "published to redis");
                Ok(())
            }
            Err(err) => {
                if err.is_io_error() || err.is_connection_dropped() {
                    self.mark_closed();
                }
                Err(BrokerError::Send {
                    entity: channel,
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn receive(
        &self,
        address: &EntityAddress,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<ReceiverHandle, BrokerError> {
        let receive_error = |e: ::redis::RedisError| BrokerError::Receive {
            entity: address.to_string(),
            reason: e.to_string(),
        };
        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(receive_error)?
            .into_pubsub();

        match address {
            EntityAddress::Subscription { topic, name } => {
                for pattern in self.channel_patterns(topic, name) {
                    pubsub.psubscribe(pattern).await.map_err(receive_error)?;
                }
            }
            EntityAddress::Queue(name) | EntityAddress::Topic(name) => {
                pubsub.subscribe(name.as_str()).await.map_err(receive_error)?;
            }
        }

        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let closed = self.closed.clone();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    message = messages.next() => match message {
                        Some(message) => {
                            match decode_frame(message.get_channel_name(), message.get_payload_bytes()) {
                                Ok(envelope) => handler.deliver(envelope).await,
                                Err(err) => tracing::warn!(error = %err, "discarding malformed redis frame"),
                            }
                        }
                        None => {
                            closed.send_replace(true);
                            break;
                        }
                    },
                }
            }
        });

        Ok(ReceiverHandle::new(address.clone(), self.id(), stop, task))
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
