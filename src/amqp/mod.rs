//! AMQP 1.0: sender and receiver links to existing queues, topics and
//! subscriptions, with automatic relinking after a connection drop.

mod module;
mod router;
mod settings;

pub use module::AmqpModule;
pub use router::AmqpRouter;
pub use settings::{AmqpHostSettings, AmqpSettings};
