//! Test domain: an order service with a recording journal.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use netfusion::logging::MemoryMessageLogger;
use netfusion::{Command, DispatchRegistry, DomainEvent, MessagingService, Query, Services};
use serde::{Deserialize, Serialize};

/// Install a test subscriber once per process. `RUST_LOG` controls output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Command)]
#[message(output = OrderConfirmation)]
pub struct PlaceOrder {
    pub order_id: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Command)]
pub struct CancelOrder {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Command)]
#[message(output = String)]
pub struct SyncGreeting {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Command)]
#[message(output = String)]
pub struct AsyncGreeting {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, DomainEvent)]
#[message(route_key = "region")]
pub struct OrderPlaced {
    pub order_id: String,
    pub region: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, DomainEvent)]
#[message(name = "OrderShipped.v1")]
pub struct OrderShipped {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Query)]
#[message(output = Option<OrderView>)]
pub struct GetOrder {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Query)]
#[message(output = u32)]
pub struct CountOrders;

// ============================================================================
// Consumers
// ============================================================================

pub struct OrderConsumer;
pub struct ShippingConsumer;
pub struct BillingConsumer;
pub struct AuditConsumer;
pub struct NotificationConsumer;
pub struct OrderQueries;

// ============================================================================
// Services
// ============================================================================

/// Records what handlers did, in order.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().unwrap().iter().any(|e| e == entry)
    }
}

pub fn services(journal: &Arc<Journal>) -> Services {
    Services::new().add_singleton_arc(journal.clone())
}

pub fn messaging(registry: DispatchRegistry, journal: &Arc<Journal>) -> MessagingService {
    init_tracing();
    MessagingService::builder(registry)
        .with_services(services(journal))
        .build()
}

pub fn messaging_with_logger(
    registry: DispatchRegistry,
    journal: &Arc<Journal>,
    logger: &MemoryMessageLogger,
) -> MessagingService {
    init_tracing();
    MessagingService::builder(registry)
        .with_services(services(journal))
        .with_logger(Arc::new(logger.clone()))
        .build()
}
