//! Message logging.
//!
//! Separate from diagnostic `tracing` output: every physical publish and
//! receive produces a `MessageLog` entry tagged with a sent hint naming the
//! transport that handled it. Hosts plug in a `MessageLogger` to persist or
//! forward the entries.

mod entry;
mod logger;

pub use entry::{LogContext, MessageLog};
pub use logger::{MemoryMessageLogger, MessageLogger, NullMessageLogger, TracingMessageLogger};

/// Sent hints used by the built-in publishers and subscribers.
pub mod hints {
    pub const PUBLISH_LOCAL: &str = "publish-local";
    pub const RABBITMQ_PUBLISH: &str = "publish-rabbitmq";
    pub const RABBITMQ_RECEIVE: &str = "subscribe-rabbitmq";
    pub const RABBITMQ_RPC_REPLY: &str = "rpc-reply-rabbitmq";
    pub const SERVICEBUS_PUBLISH: &str = "publish-servicebus";
    pub const SERVICEBUS_RECEIVE: &str = "subscribe-servicebus";
    pub const REDIS_PUBLISH: &str = "publish-redis";
    pub const REDIS_RECEIVE: &str = "subscribe-redis";
    pub const AMQP_PUBLISH: &str = "publish-amqp";
    pub const AMQP_RECEIVE: &str = "subscribe-amqp";
    pub const REPLY: &str = "reply";
}
