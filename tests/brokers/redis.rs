//! Redis channels with pattern subscriptions.

use std::sync::Arc;

use netfusion::bus::{EntityAddress, InMemoryBroker};
use netfusion::redis::{RedisModule, RedisRouter};
use netfusion::{CompositeApp, DispatchRegistry, HandlerContext, MessageHandler, Route};

use crate::support::{
    messaging, redis_config, settle, start_app, wait_until, BillingConsumer, Journal, OrderPlaced,
};

const BUS: &str = "cache";

async fn app(
    broker: &InMemoryBroker,
    name: &str,
    registry: DispatchRegistry,
    journal: &Arc<Journal>,
    router: RedisRouter,
) -> CompositeApp {
    start_app(
        name,
        "host-1",
        messaging(registry, journal),
        redis_config(BUS),
        RedisModule::new(Arc::new(broker.clone()), router),
    )
    .await
}

fn recording_registry() -> DispatchRegistry {
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

#[tokio::test]
async fn pattern_subscription_receives_matching_route_keys() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let sales = app(
        &broker,
        "sales",
        DispatchRegistry::empty(),
        &Arc::new(Journal::default()),
        RedisRouter::new().publish::<OrderPlaced>(BUS, "orders"),
    )
    .await;
    let _billing = app(
        &broker,
        "billing",
        recording_registry(),
        &journal,
        RedisRouter::new().subscribe_pattern::<OrderPlaced>(BUS, "orders", "eu*"),
    )
    .await;

    for (id, region) in [("o-1", "eu"), ("o-2", "eu-west"), ("o-3", "us")] {
        sales.messaging().publish(OrderPlaced::new(id, region)).await.unwrap();
    }

    assert!(wait_until(|| journal.len() == 2).await);
    settle().await;
    assert_eq!(journal.entries(), vec!["eu-west:o-2", "eu:o-1"]);
    assert!(broker.has_subscription(BUS, "orders", "billing.host-1.eu*"));
}

#[tokio::test]
async fn channel_subscription_receives_everything_and_is_removed_on_stop() {
    let broker = InMemoryBroker::new();
    let journal = Arc::new(Journal::default());
    let mut billing = app(
        &broker,
        "billing",
        recording_registry(),
        &journal,
        RedisRouter::new().subscribe::<OrderPlaced>(BUS, "orders"),
    )
    .await;
    let sales = app(
        &broker,
        "sales",
        DispatchRegistry::empty(),
        &Arc::new(Journal::default()),
        RedisRouter::new().publish::<OrderPlaced>(BUS, "orders"),
    )
    .await;

    sales.messaging().publish(OrderPlaced::new("o-4", "us")).await.unwrap();
    sales.messaging().publish(OrderPlaced::new("o-5", "ap")).await.unwrap();
    assert!(wait_until(|| journal.len() == 2).await);

    billing.stop().await.unwrap();
    assert!(!broker.has_subscription(BUS, "orders", "billing.host-1.*"));
    assert!(broker
        .deletions(BUS)
        .contains(&EntityAddress::subscription("orders", "billing.host-1.*")));

    sales.messaging().publish(OrderPlaced::new("o-6", "us")).await.unwrap();
    settle().await;
    assert_eq!(journal.len(), 2);
}
