//! In-process messaging: the publish pipeline, enrichers, query filters and
//! the context handed to handlers.

mod context;
mod enricher;
mod publisher;
mod query_filter;
mod service;
mod services;

pub use context::HandlerContext;
pub use enricher::{
    CorrelationEnricher, DateOccurredEnricher, MessageEnricher, MicroserviceEnricher, MICROSERVICE_ID_HEADER,
};
pub use publisher::{LocalPublisher, MessagePublisher, PublisherType};
pub use query_filter::QueryFilter;
pub use service::{MessagingService, MessagingServiceBuilder};
pub use services::{Scope, Services};
