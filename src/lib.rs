//! NetFusion - plugin-composed messaging.
//!
//! Commands, domain events and queries are dispatched to in-process
//! handlers through a `MessagingService`, and to RabbitMQ, Azure Service
//! Bus, Redis or AMQP through plugin modules that register bus publishers
//! and subscriptions. Dispatch failures come back as one `DispatchError`
//! tree mirroring the call tree.

extern crate self as netfusion;

mod cancellation;
mod error;

pub mod amqp;
pub mod bus;
pub mod dispatch;
pub mod logging;
pub mod message;
pub mod messaging;
pub mod plugin;
pub mod rabbitmq;
pub mod redis;
pub mod serialization;
pub mod servicebus;
pub mod settings;

pub use cancellation::CancellationToken;
pub use dispatch::{
    DispatchError, DispatchRegistry, DispatchRule, ErrorKind, HandlerError, MessageHandler, Route, RuleApplied,
};
pub use error::{BootstrapError, BrokerError, SettingsError};
pub use message::{Command, DomainEvent, Message, MessageKind, MessageMeta, PublishedMessage, Query};
pub use messaging::{HandlerContext, MessagingService, Services};
pub use plugin::{CompositeApp, PluginContext, PluginModule};
pub use serialization::{ContentType, SerializationManager};
pub use settings::{Configuration, Settings};

// Derive macros share names with the traits they implement.
pub use netfusion_macros::{Command, DomainEvent, Query};
