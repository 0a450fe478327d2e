//! RabbitMQ: exchanges, work queues, bound consumer queues and RPC.
//!
//! Entities map onto the bus model as follows:
//!
//! | RabbitMQ            | Declaration                         |
//! |---------------------|-------------------------------------|
//! | exchange            | `Topic` (direct, topic or fanout)   |
//! | work queue          | `Queue` on the default exchange     |
//! | bound queue         | `Subscription { topic: exchange }`  |
//! | RPC reply queue     | exclusive `Queue` per instance      |

mod module;
mod router;
mod rpc;
mod settings;

pub use module::{BindQueueStrategy, RabbitMqModule};
pub use router::{ExchangeDefinition, QueueDefinition, QueueSource, QueueSubscription, RabbitMqRouter};
pub use rpc::RpcClient;
pub use settings::{RabbitMqConnection, RabbitMqSettings};
