//! Service Bus queues, topics, placeholder topics and fan-out subscriptions.

use std::sync::Arc;
use std::time::Duration;

use netfusion::bus::{EntityAddress, EntityDeclaration, InMemoryBroker};
use netfusion::servicebus::{QueueMeta, ServiceBusModule, ServiceBusRouter, SubscriptionMeta, TopicMeta};
use netfusion::{CompositeApp, DispatchRegistry, HandlerContext, MessageHandler, Route};

use crate::support::{
    messaging, servicebus_config, settle, start_app, wait_until, BillingConsumer, CancelOrder, Journal,
    OrderConsumer, OrderPlaced,
};

const BUS: &str = "sales";

fn billing_registry() -> DispatchRegistry {
    DispatchRegistry::builder()
        .event(Route::to::<BillingConsumer>(
            "on_placed",
            MessageHandler::sync(|evt: &OrderPlaced, ctx: &HandlerContext| {
                ctx.require::<Journal>()?.record(format!("{}:{}", evt.region, evt.order_id));
                Ok(())
            }),
        ))
        .build()
}

async fn app(
    broker: &InMemoryBroker,
    name: &str,
    host_id: &str,
    registry: DispatchRegistry,
    journal: &Arc<Journal>,
    router: ServiceBusRouter,
) -> CompositeApp {
    start_app(
        name,
        host_id,
        messaging(registry, journal),
        servicebus_config(BUS),
        ServiceBusModule::new(Arc::new(broker.clone()), router),
    )
    .await
}

async fn publisher(broker: &InMemoryBroker) -> CompositeApp {
    app(
        broker,
        "sales",
        "sales-1",
        DispatchRegistry::empty(),
        &Arc::new(Journal::default()),
        ServiceBusRouter::new().publish_to_topic::<OrderPlaced>(BUS, TopicMeta::new("orders")),
    )
    .await
}

#[tokio::test]
async fn subscriber_starting_first_creates_a_placeholder_topic() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let _billing = app(
        &broker,
        "billing",
        "billing-1",
        billing_registry(),
        &journal,
        ServiceBusRouter::new().subscribe::<OrderPlaced>(BUS, SubscriptionMeta::new("orders", "billing")),
    )
    .await;

    assert_eq!(broker.topic_is_placeholder(BUS, "orders"), Some(true));
    assert!(broker.has_subscription(BUS, "orders", "billing"));

    let sales = publisher(&broker).await;
    assert_eq!(broker.topic_is_placeholder(BUS, "orders"), Some(false));
    assert!(broker.has_subscription(BUS, "orders", "billing"));

    sales.messaging().publish(OrderPlaced::new("o-1", "eu")).await.unwrap();
    assert!(wait_until(|| journal.len() == 1).await);
    assert_eq!(journal.entries(), vec!["eu:o-1"]);
}

#[tokio::test]
async fn subscription_filters_match_the_exact_route_key() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let sales = publisher(&broker).await;
    let _billing = app(
        &broker,
        "billing",
        "billing-1",
        billing_registry(),
        &journal,
        ServiceBusRouter::new().subscribe::<OrderPlaced>(
            BUS,
            SubscriptionMeta::new("orders", "billing-eu").with_filters(["eu"]),
        ),
    )
    .await;

    for (id, region) in [("o-2", "eu"), ("o-3", "eu.north"), ("o-4", "us")] {
        sales.messaging().publish(OrderPlaced::new(id, region)).await.unwrap();
    }

    assert!(wait_until(|| journal.len() == 1).await);
    settle().await;
    assert_eq!(journal.entries(), vec!["eu:o-2"]);
}

#[tokio::test]
async fn fanout_subscription_is_named_per_instance_and_deleted_on_stop() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let sales = publisher(&broker).await;
    let mut billing = app(
        &broker,
        "billing",
        "host-7",
        billing_registry(),
        &journal,
        ServiceBusRouter::new().subscribe::<OrderPlaced>(BUS, SubscriptionMeta::fanout("orders")),
    )
    .await;

    assert!(broker.has_subscription(BUS, "orders", "billing_host-7"));
    let idle_delete = broker.declarations(BUS).into_iter().find_map(|d| match d {
        EntityDeclaration::Subscription { name, options, .. } if name == "billing_host-7" => {
            options.auto_delete_on_idle
        }
        _ => None,
    });
    assert_eq!(idle_delete, Some(Duration::from_secs(300)));

    sales.messaging().publish(OrderPlaced::new("o-5", "us")).await.unwrap();
    assert!(wait_until(|| journal.len() == 1).await);

    billing.stop().await.unwrap();
    assert!(!broker.has_subscription(BUS, "orders", "billing_host-7"));
    assert!(broker
        .deletions(BUS)
        .contains(&EntityAddress::subscription("orders", "billing_host-7")));
}

#[tokio::test]
async fn queue_commands_reach_the_receiving_service() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>(
            "cancel",
            MessageHandler::sync(|cmd: &CancelOrder, ctx: &HandlerContext| {
                ctx.require::<Journal>()?.record(format!("cancelled:{}", cmd.order_id));
                Ok(())
            }),
        ))
        .unwrap()
        .build();
    let _orders = app(
        &broker,
        "orders",
        "orders-1",
        registry,
        &journal,
        ServiceBusRouter::new().receive_from_queue::<CancelOrder>(BUS, QueueMeta::new("order-commands")),
    )
    .await;
    let web = app(
        &broker,
        "web",
        "web-1",
        DispatchRegistry::empty(),
        &Arc::new(Journal::default()),
        ServiceBusRouter::new().send_to_queue::<CancelOrder>(BUS, QueueMeta::new("order-commands")),
    )
    .await;

    web.messaging()
        .send(CancelOrder {
            order_id: "o-6".into(),
        })
        .await
        .unwrap();

    assert!(wait_until(|| journal.len() == 1).await);
    assert_eq!(journal.entries(), vec!["cancelled:o-6"]);
    assert!(broker.has_queue(BUS, "order-commands"));
}
