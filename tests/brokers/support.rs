//! Shared messages, configuration builders and polling helpers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use netfusion::{
    Command, CompositeApp, Configuration, DispatchRegistry, DomainEvent, MessagingService, PluginModule, Services,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

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

#[derive(Debug, Clone, Serialize, Deserialize, DomainEvent)]
#[message(route_key = "region")]
pub struct OrderPlaced {
    pub order_id: String,
    pub region: String,
}

impl OrderPlaced {
    pub fn new(order_id: &str, region: &str) -> Self {
        Self {
            order_id: order_id.into(),
            region: region.into(),
        }
    }
}

pub struct OrderConsumer;
pub struct BillingConsumer;

// ============================================================================
// Journal
// ============================================================================

#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap().clone();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

pub fn messaging(registry: DispatchRegistry, journal: &Arc<Journal>) -> MessagingService {
    init_tracing();
    MessagingService::builder(registry)
        .with_services(Services::new().add_singleton_arc(journal.clone()))
        .build()
}

/// Compose and start a single-module app.
pub async fn start_app(
    app_name: &str,
    host_id: &str,
    messaging: MessagingService,
    configuration: Configuration,
    module: impl PluginModule + 'static,
) -> CompositeApp {
    let mut app = CompositeApp::builder(app_name, messaging)
        .with_configuration(configuration)
        .with_host_id(host_id)
        .add_module(module)
        .unwrap()
        .build();
    app.compose().await.unwrap();
    app.start().await.unwrap();
    app
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give in-flight deliveries a chance to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Configuration
// ============================================================================

pub fn rabbitmq_config(bus: &str, rpc_timeout_ms: u64) -> Configuration {
    Configuration::from_value(json!({
        "netfusion": {
            "rabbitMQ": {
                "connections": [
                    { "busName": bus, "hostName": "rabbit.local", "rpcTimeoutMs": rpc_timeout_ms }
                ]
            }
        }
    }))
}

pub fn servicebus_config(bus: &str) -> Configuration {
    Configuration::from_value(json!({
        "netfusion": {
            "azure": {
                "serviceBus": {
                    "namespaces": [
                        { "busName": bus, "hostName": "sales.servicebus.windows.net" }
                    ]
                }
            }
        }
    }))
}

pub fn redis_config(bus: &str) -> Configuration {
    Configuration::from_value(json!({
        "netfusion": {
            "redis": {
                "connections": [
                    { "busName": bus, "hostName": "redis.local", "database": 2 }
                ]
            }
        }
    }))
}

pub fn amqp_config(bus: &str) -> Configuration {
    Configuration::from_value(json!({
        "netfusion": {
            "amqp": {
                "hosts": [
                    { "busName": bus, "hostAddress": "amqp.local", "reconnectDelayMs": 20 }
                ]
            }
        }
    }))
}
