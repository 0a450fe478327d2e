//! Broker adapter core.
//!
//! Every broker technology is expressed through the same pieces:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                BusRuntime (per technology)                    │
//! │  start(): create entities, subscribe, add BusPublisher        │
//! │  stop():  remove publisher, dispose entities, close conns     │
//! └──────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │        EntityRegistry of BusEntity + strategies               │
//! │  Create / Subscribe / Publish / Dispose                       │
//! └──────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   ConnectionCache -> Connector -> BrokerConnection            │
//! │   InMemoryBroker (included), Redis (feature "redis")          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod connection;
mod context;
mod declaration;
mod entity;
mod envelope;
mod filter;
mod inbound;
mod memory;
mod publisher;
mod registry;
mod runtime;
mod session;
mod strategies;

pub use connection::{
    connection_id, BrokerConnection, ConnectionCache, ConnectionTarget, Connector, DeliveryHandler,
    ReceiverHandle,
};
pub use context::BusEntityContext;
pub use declaration::{EntityAddress, EntityDeclaration, EntityOptions, TopicKind};
pub use entity::{
    BusEntity, CreationStrategy, DisposeStrategy, EntityState, EntityStrategy, PublishStrategy,
    SubscriptionStrategy,
};
pub use envelope::{
    ErrorReply, TransportEnvelope, IS_ERROR_REPLY_PROPERTY, IS_REPLY_PROPERTY, MESSAGE_TYPE_PROPERTY, ROUTE_KEY_PROPERTY,
};
pub use filter::{glob_matches, route_matches, topic_matches};
pub use inbound::{DeliveryOutcome, EntityReceiver};
pub use memory::{InMemoryBroker, InMemoryConnection, ReceiveRecord, SentRecord, DEFAULT_RECORD_LIMIT};
pub use publisher::BusPublisher;
pub use registry::EntityRegistry;
pub use runtime::BusRuntime;
pub use session::HostSession;
pub use strategies::{
    DeclareStrategy, DeleteOnDisposeStrategy, ReceiveStrategy, SendStrategy, SubscriptionDeclareStrategy,
};
