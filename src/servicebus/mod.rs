//! Azure Service Bus: queues, topics and filtered subscriptions.
//!
//! A subscription whose topic does not exist yet creates a placeholder
//! topic, so a consumer can start before the publishing service.

mod module;
mod router;
mod settings;

pub use module::ServiceBusModule;
pub use router::{QueueMeta, ServiceBusRouter, SubscriptionMeta, TopicMeta};
pub use settings::{NamespaceSettings, ServiceBusSettings, TransportType};
