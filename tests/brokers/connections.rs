//! Connection caching, bus name validation and unreachable hosts.

use std::sync::Arc;
use std::time::Duration;

use netfusion::amqp::{AmqpModule, AmqpRouter};
use netfusion::bus::{
    connection_id, BrokerConnection, ConnectionCache, ConnectionTarget, EntityAddress, InMemoryBroker,
};
use netfusion::plugin::AppState;
use netfusion::rabbitmq::{QueueDefinition, QueueSubscription, RabbitMqModule, RabbitMqRouter};
use netfusion::messaging::MessagePublisher;
use netfusion::{BootstrapError, BrokerError, CompositeApp, Configuration, DispatchRegistry};
use serde_json::json;

use crate::support::{messaging, rabbitmq_config, CancelOrder, Journal};

#[tokio::test]
async fn concurrent_callers_share_one_connection() {
    let broker = InMemoryBroker::new().with_connect_delay(Duration::from_millis(50));
    let cache = Arc::new(ConnectionCache::new(
        Arc::new(broker.clone()),
        [ConnectionTarget::new("orders", "rabbit.local")],
    ));

    let callers = (0..8).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("orders").await })
    });
    let connections: Vec<_> = futures::future::join_all(callers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(broker.connect_count("orders"), 1);
    let first = connection_id(&connections[0]);
    assert!(connections.iter().all(|c| connection_id(c) == first));
}

#[tokio::test]
async fn closed_connection_is_replaced_on_next_get() {
    let broker = InMemoryBroker::new();
    let cache = ConnectionCache::new(Arc::new(broker.clone()), [ConnectionTarget::new("orders", "rabbit.local")]);

    let first = cache.get("orders").await.unwrap();
    broker.drop_connections("orders");
    let second = cache.get("orders").await.unwrap();

    assert_ne!(connection_id(&first), connection_id(&second));
    assert!(second.is_open());
    assert_eq!(broker.connect_count("orders"), 2);
    assert_eq!(broker.open_connections("orders"), 1);
}

#[tokio::test]
async fn unconfigured_bus_has_no_connection() {
    let broker = InMemoryBroker::new();
    let cache = ConnectionCache::new(Arc::new(broker.clone()), [ConnectionTarget::new("orders", "rabbit.local")]);

    let err = match cache.get("payments").await {
        Err(err) => err,
        Ok(_) => panic!("connected to an unconfigured bus"),
    };
    assert!(matches!(err, BrokerError::Connection { host, .. } if host == "payments"));
    assert_eq!(broker.connect_count("payments"), 0);
}

#[tokio::test]
async fn bus_name_configured_twice_fails_compose() {
    let broker = InMemoryBroker::new();
    let configuration = Configuration::from_value(json!({
        "netfusion": {
            "rabbitMQ": {
                "connections": [
                    { "busName": "orders", "hostName": "rabbit-a.local" },
                    { "busName": "orders", "hostName": "rabbit-b.local" }
                ]
            }
        }
    }));
    let mut app = CompositeApp::builder("web", messaging(DispatchRegistry::empty(), &Arc::new(Journal::default())))
        .with_configuration(configuration)
        .add_module(RabbitMqModule::new(Arc::new(broker.clone()), RabbitMqRouter::new()))
        .unwrap()
        .build();

    let err = app.compose().await.unwrap_err();
    assert!(matches!(err, BootstrapError::DuplicateBusName(bus) if bus == "orders"));
    assert_eq!(app.state(), AppState::Built);
}

#[tokio::test]
async fn unreachable_host_fails_start() {
    let broker = InMemoryBroker::new();
    broker.set_unreachable("orders", true);
    let mut app = CompositeApp::builder("web", messaging(DispatchRegistry::empty(), &Arc::new(Journal::default())))
        .with_configuration(rabbitmq_config("orders", 10_000))
        .with_host_id("web-1")
        .add_module(RabbitMqModule::new(
            Arc::new(broker.clone()),
            RabbitMqRouter::new().queue::<CancelOrder>("orders", QueueDefinition::new("order-commands")),
        ))
        .unwrap()
        .build();

    app.compose().await.unwrap();
    let err = app.start().await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Broker(BrokerError::Connection { ref host, .. }) if host == "orders"
    ));
    assert_eq!(app.state(), AppState::Composed);
    assert_eq!(app.module_names(), vec!["netfusion-rabbitmq"]);
}

#[tokio::test]
async fn failed_start_releases_the_modules_already_started() {
    let broker = InMemoryBroker::new();
    broker.set_unreachable("amqp", true);
    let configuration = Configuration::from_value(json!({
        "netfusion": {
            "rabbitMQ": {
                "connections": [{ "busName": "orders", "hostName": "rabbit.local" }]
            },
            "amqp": {
                "hosts": [{ "busName": "amqp", "hostAddress": "amqp.local", "reconnectDelayMs": 20 }]
            }
        }
    }));
    let mut app = CompositeApp::builder("orders", messaging(DispatchRegistry::empty(), &Arc::new(Journal::default())))
        .with_configuration(configuration)
        .with_host_id("orders-1")
        .add_module(RabbitMqModule::new(
            Arc::new(broker.clone()),
            RabbitMqRouter::new()
                .subscribe::<CancelOrder>("orders", QueueSubscription::work_queue(QueueDefinition::new("orders-in"))),
        ))
        .unwrap()
        .add_module(AmqpModule::new(
            Arc::new(broker.clone()),
            AmqpRouter::new().receive_from_queue::<CancelOrder>("amqp", "amqp-in"),
        ))
        .unwrap()
        .build();

    app.compose().await.unwrap();
    let err = app.start().await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Broker(BrokerError::Connection { ref host, .. }) if host == "amqp"
    ));
    assert_eq!(app.state(), AppState::Composed);
    assert_eq!(broker.connect_count("orders"), 1);
    assert_eq!(broker.active_consumers("orders", &EntityAddress::queue("orders-in")), 0);
    assert_eq!(broker.open_connections("orders"), 0);
    assert!(!app.messaging().publishers().iter().any(|p| p.name() == "rabbitmq"));
}

#[tokio::test]
async fn stopping_removes_the_bus_publisher_and_closes_connections() {
    let broker = InMemoryBroker::new();
    let mut app = CompositeApp::builder("web", messaging(DispatchRegistry::empty(), &Arc::new(Journal::default())))
        .with_configuration(rabbitmq_config("orders", 10_000))
        .with_host_id("web-1")
        .add_module(RabbitMqModule::new(
            Arc::new(broker.clone()),
            RabbitMqRouter::new().queue::<CancelOrder>("orders", QueueDefinition::new("order-commands")),
        ))
        .unwrap()
        .build();

    app.compose().await.unwrap();
    app.start().await.unwrap();
    let publishers: Vec<String> = app.messaging().publishers().iter().map(|p| p.name().to_string()).collect();
    assert!(publishers.contains(&"rabbitmq".to_string()));
    assert_eq!(broker.open_connections("orders"), 1);
    assert!(broker.has_queue("orders", "order-commands"));

    app.stop().await.unwrap();
    assert_eq!(app.state(), AppState::Stopped);
    assert!(!app.messaging().publishers().iter().any(|p| p.name() == "rabbitmq"));
    assert_eq!(broker.open_connections("orders"), 0);

    // Sends after stop stay local and are not routed to the broker.
    app.messaging()
        .send(CancelOrder {
            order_id: "o-1".into(),
        })
        .await
        .unwrap();
    assert!(broker.sent().is_empty());
}
