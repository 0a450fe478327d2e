//! Domain event fan-out, rules and enrichment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netfusion::dispatch::FnRule;
use netfusion::message::{AnyMessage, MessageMeta};
use netfusion::messaging::MessageEnricher;
use netfusion::{
    CancellationToken, DispatchRegistry, ErrorKind, HandlerContext, HandlerError, MessageHandler, MessagingService,
    Route, RuleApplied, Services,
};

use crate::support::{
    init_tracing, messaging, AuditConsumer, BillingConsumer, Journal, NotificationConsumer, OrderPlaced,
    OrderShipped, ShippingConsumer,
};

fn placed(order_id: &str, region: &str, amount: u32) -> OrderPlaced {
    OrderPlaced {
        order_id: order_id.into(),
        region: region.into(),
        amount,
    }
}

fn recording(label: &'static str) -> MessageHandler<OrderPlaced> {
    MessageHandler::sync(move |evt: &OrderPlaced, ctx: &HandlerContext| {
        ctx.require::<Journal>()?.record(format!("{}:{}", label, evt.order_id));
        Ok(())
    })
}

fn failing(label: &'static str) -> MessageHandler<OrderPlaced> {
    MessageHandler::from_async(move |evt: Arc<OrderPlaced>, _ctx: HandlerContext| async move {
        Err(HandlerError::InvalidOperation(format!("{} cannot handle {}", label, evt.order_id)))
    })
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn event_without_handlers_is_accepted() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(DispatchRegistry::empty(), &journal);

    messaging.publish(placed("o-1", "eu", 1)).await.unwrap();
}

#[tokio::test]
async fn every_handler_receives_the_event() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>("on_placed", recording("shipping")))
        .event(Route::to::<BillingConsumer>("on_placed", recording("billing")))
        .build();
    let messaging = messaging(registry, &journal);

    messaging.publish(placed("o-2", "eu", 1)).await.unwrap();

    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["billing:o-2", "shipping:o-2"]);
}

#[tokio::test]
async fn failing_handlers_are_isolated_and_reported_in_registration_order() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>("on_placed", recording("shipping")))
        .event(Route::to::<BillingConsumer>("on_placed", failing("billing")))
        .event(Route::to::<AuditConsumer>("on_placed", recording("audit")))
        .event(Route::to::<NotificationConsumer>("on_placed", failing("notification")))
        .build();
    let messaging = messaging(registry, &journal);

    let err = messaging.publish(placed("o-3", "eu", 1)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Publisher);
    assert_eq!(err.causes().len(), 2);
    let consumers: Vec<_> = err
        .causes()
        .iter()
        .map(|c| {
            assert_eq!(c.kind(), ErrorKind::MessageDispatch);
            c.details()["ConsumerType"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(consumers, vec!["BillingConsumer", "NotificationConsumer"]);

    let bags = err.details()[netfusion::dispatch::PUBLISH_EXCEPTION_DETAILS]
        .as_array()
        .unwrap();
    assert_eq!(bags.len(), 2);
    assert_eq!(bags[1]["InnerException"], "invalid operation: notification cannot handle o-3");

    assert!(journal.contains("shipping:o-3"));
    assert!(journal.contains("audit:o-3"));
}

#[tokio::test]
async fn handlers_run_concurrently() {
    let journal = Arc::new(Journal::default());
    let slow = |label: &'static str| {
        MessageHandler::from_async(move |_evt: Arc<OrderShipped>, ctx: HandlerContext| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctx.require::<Journal>()?.record(label);
            Ok::<_, HandlerError>(())
        })
    };
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>("on_shipped", slow("a")))
        .event(Route::to::<BillingConsumer>("on_shipped", slow("b")))
        .event(Route::to::<AuditConsumer>("on_shipped", slow("c")))
        .build();
    let messaging = messaging(registry, &journal);

    let started = tokio::time::Instant::now();
    messaging
        .publish(OrderShipped {
            order_id: "o-4".into(),
        })
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(journal.entries().len(), 3);
}

#[tokio::test]
async fn each_invocation_gets_its_own_scope() {
    struct ScopeMarker(String);

    init_tracing();
    let journal = Arc::new(Journal::default());
    let services = Services::new()
        .add_singleton_arc(journal.clone())
        .add_scoped(|scope| ScopeMarker(scope.id().to_string()));
    let record_scope = |label: &'static str| {
        MessageHandler::sync(move |_evt: &OrderShipped, ctx: &HandlerContext| {
            let first = ctx.require::<ScopeMarker>()?;
            let second = ctx.require::<ScopeMarker>()?;
            assert!(Arc::ptr_eq(&first, &second));
            ctx.require::<Journal>()?.record(format!("{}:{}", label, first.0));
            Ok(())
        })
    };
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>("on_shipped", record_scope("a")))
        .event(Route::to::<BillingConsumer>("on_shipped", record_scope("b")))
        .build();
    let messaging = MessagingService::builder(registry).with_services(services).build();

    messaging
        .publish(OrderShipped {
            order_id: "o-5".into(),
        })
        .await
        .unwrap();

    let scopes: Vec<String> = journal
        .entries()
        .iter()
        .map(|e| e.split_once(':').unwrap().1.to_string())
        .collect();
    assert_eq!(scopes.len(), 2);
    assert_ne!(scopes[0], scopes[1]);
}

// ============================================================================
// Rules
// ============================================================================

#[tokio::test]
async fn predicates_and_rules_select_handlers() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>("eu_only", recording("eu")).when(|evt: &OrderPlaced| evt.region == "eu"))
        .event(
            Route::to::<BillingConsumer>("large_or_us", recording("flagged"))
                .apply_rule(FnRule::new("large", |evt: &OrderPlaced| evt.amount >= 1000))
                .apply_rule(FnRule::new("us", |evt: &OrderPlaced| evt.region == "us"))
                .rule_applied(RuleApplied::Any),
        )
        .event(
            Route::to::<AuditConsumer>("large_us", recording("audit"))
                .apply_rule(FnRule::new("large", |evt: &OrderPlaced| evt.amount >= 1000))
                .apply_rule(FnRule::new("us", |evt: &OrderPlaced| evt.region == "us")),
        )
        .build();
    let messaging = messaging(registry, &journal);

    messaging.publish(placed("o-6", "eu", 10)).await.unwrap();
    messaging.publish(placed("o-7", "us", 10)).await.unwrap();
    messaging.publish(placed("o-8", "us", 5000)).await.unwrap();

    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["audit:o-8", "eu:o-6", "flagged:o-7", "flagged:o-8"]);
}

// ============================================================================
// Enrichment
// ============================================================================

#[tokio::test]
async fn child_messages_keep_the_parent_correlation_id() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>(
            "ship",
            MessageHandler::from_async(|evt: Arc<OrderPlaced>, ctx: HandlerContext| async move {
                ctx.publish(OrderShipped {
                    order_id: evt.order_id.clone(),
                })
                .await?;
                Ok::<_, HandlerError>(())
            }),
        ))
        .event(Route::to::<AuditConsumer>(
            "audit",
            MessageHandler::sync(|_evt: &OrderShipped, ctx: &HandlerContext| {
                let meta = ctx.meta();
                ctx.require::<Journal>()?.record(format!(
                    "{}|{}",
                    meta.correlation_id.clone().unwrap_or_default(),
                    meta.message_id.clone().unwrap_or_default()
                ));
                Ok(())
            }),
        ))
        .build();
    let messaging = messaging(registry, &journal);

    messaging
        .publish_with(
            placed("o-9", "eu", 1),
            MessageMeta::new().with_message_id("parent-1"),
            CancellationToken::none(),
        )
        .await
        .unwrap();

    let entries = journal.entries();
    assert_eq!(entries.len(), 1);
    let (correlation, message_id) = entries[0].split_once('|').unwrap();
    assert_eq!(correlation, "parent-1");
    assert!(!message_id.is_empty());
    assert_ne!(message_id, "parent-1");
}

struct TenantEnricher;

#[async_trait]
impl MessageEnricher for TenantEnricher {
    fn name(&self) -> &str {
        "TenantEnricher"
    }

    async fn enrich(&self, _message: &dyn AnyMessage, meta: &mut MessageMeta) -> Result<(), HandlerError> {
        meta.headers.insert("tenant".into(), "acme".into());
        Ok(())
    }
}

struct BrokenEnricher;

#[async_trait]
impl MessageEnricher for BrokenEnricher {
    fn name(&self) -> &str {
        "BrokenEnricher"
    }

    async fn enrich(&self, _message: &dyn AnyMessage, _meta: &mut MessageMeta) -> Result<(), HandlerError> {
        Err(HandlerError::InvalidOperation("clock unavailable".into()))
    }
}

#[tokio::test]
async fn enrichers_populate_metadata_seen_by_handlers() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<AuditConsumer>(
            "audit",
            MessageHandler::sync(|_evt: &OrderShipped, ctx: &HandlerContext| {
                let meta = ctx.meta();
                assert!(meta.occurred_at.is_some());
                ctx.require::<Journal>()?
                    .record(meta.header("tenant").unwrap_or("none").to_string());
                Ok(())
            }),
        ))
        .build();
    let messaging = MessagingService::builder(registry)
        .with_services(Services::new().add_singleton_arc(journal.clone()))
        .with_enricher(TenantEnricher)
        .build();

    messaging
        .publish(OrderShipped {
            order_id: "o-10".into(),
        })
        .await
        .unwrap();

    assert_eq!(journal.entries(), vec!["acme"]);
}

#[tokio::test]
async fn enricher_failure_stops_before_any_handler_runs() {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .event(Route::to::<AuditConsumer>("audit", recording("audit")))
        .build();
    let messaging = MessagingService::builder(registry)
        .with_services(Services::new().add_singleton_arc(journal.clone()))
        .with_enricher(BrokenEnricher)
        .with_enricher(TenantEnricher)
        .build();

    let err = messaging.publish(placed("o-11", "eu", 1)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Enricher);
    assert_eq!(err.causes().len(), 1);
    assert_eq!(err.inner().unwrap().details()["EnricherType"], "BrokenEnricher");
    assert!(matches!(err.handler_error(), Some(HandlerError::InvalidOperation(_))));
    assert!(journal.entries().is_empty());
}
