//! Message model - commands, domain events and queries.
//!
//! Messages are plain serde structs. The derive macros from
//! `netfusion_macros` implement the traits below:
//!
//! ```ignore
//! use netfusion::{Command, DomainEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Command)]
//! #[message(output = OrderConfirmation)]
//! pub struct PlaceOrder { pub order_id: String }
//!
//! #[derive(Serialize, Deserialize, DomainEvent)]
//! #[message(route_key = "region")]
//! pub struct OrderPlaced { pub order_id: String, pub region: String }
//! ```
//!
//! Once a message is handed to the messaging service its payload is frozen
//! behind an `Arc`; only the `MessageMeta` travelling beside it may change.

mod any;
mod meta;
mod published;

pub use any::{AnyMessage, AnyReply};
pub use meta::MessageMeta;
pub use published::{decode_result, PublishedMessage, ResultDecoder};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The cardinality class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum MessageKind {
    /// Exactly one handler, optionally returning a result.
    Command,
    /// Zero or more handlers, broadcast.
    DomainEvent,
    /// Exactly one consumer, always returning a result.
    Query,
}

impl MessageKind {
    /// Whether at most one dispatcher may be routed for this kind.
    pub fn requires_single_handler(&self) -> bool {
        !matches!(self, MessageKind::DomainEvent)
    }
}

/// Root trait of every dispatched unit.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Logical name used on the wire and in logs.
    const NAME: &'static str;
    const KIND: MessageKind;

    /// Route key used by topic-style brokers. `None` means unrouted.
    fn route_key(&self) -> Option<String> {
        None
    }
}

/// A message handled by exactly one consumer.
pub trait Command: Message {
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// A broadcast message handled by zero or more consumers.
pub trait DomainEvent: Message {}

/// A request for data answered by exactly one consumer.
pub trait Query: Message {
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;
}
