//! The dispatch error tree for nested publishes.

use std::error::Error;
use std::sync::Arc;

use netfusion::logging::MemoryMessageLogger;
use netfusion::{DispatchRegistry, ErrorKind, HandlerContext, HandlerError, MessageHandler, Route};

use crate::support::{
    messaging, messaging_with_logger, CancelOrder, Journal, OrderConsumer, OrderPlaced, OrderShipped,
    ShippingConsumer,
};

fn shipping_fails_registry() -> DispatchRegistry {
    DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>(
            "cancel",
            MessageHandler::from_async(|cmd: Arc<CancelOrder>, ctx: HandlerContext| async move {
                ctx.publish(OrderShipped {
                    order_id: cmd.order_id.clone(),
                })
                .await?;
                Ok::<_, HandlerError>(())
            }),
        ))
        .unwrap()
        .event(Route::to::<ShippingConsumer>(
            "on_shipped",
            MessageHandler::sync(|evt: &OrderShipped, _ctx: &HandlerContext| {
                Err(HandlerError::InvalidOperation(format!("order {} already shipped", evt.order_id)))
            }),
        ))
        .build()
}

#[tokio::test]
async fn nested_publish_failure_mirrors_the_call_tree() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(shipping_fails_registry(), &journal);

    let err = messaging
        .send(CancelOrder {
            order_id: "o-1".into(),
        })
        .await
        .unwrap_err();

    let mut kinds = Vec::new();
    let mut node = Some(&err);
    while let Some(current) = node {
        kinds.push(current.kind());
        node = current.inner();
    }
    assert_eq!(
        kinds,
        vec![
            ErrorKind::Publisher,
            ErrorKind::MessageDispatch,
            ErrorKind::Publisher,
            ErrorKind::MessageDispatch,
        ]
    );
    assert_eq!(err.depth(), 4);

    let outer_dispatch = err.inner().unwrap();
    assert_eq!(outer_dispatch.details()["MessageType"], "CancelOrder");
    assert_eq!(
        outer_dispatch.details()["InnerException"],
        "exception when invoking message publishers for OrderShipped.v1"
    );

    let innermost = err.innermost();
    assert_eq!(innermost.details()["MessageType"], "OrderShipped.v1");
    assert_eq!(innermost.details()["HandlerMethod"], "on_shipped");
    assert!(matches!(
        err.handler_error(),
        Some(HandlerError::InvalidOperation(reason)) if reason == "order o-1 already shipped"
    ));
}

#[tokio::test]
async fn std_error_source_chain_reaches_the_original_error() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(shipping_fails_registry(), &journal);

    let err = messaging
        .send(CancelOrder {
            order_id: "o-2".into(),
        })
        .await
        .unwrap_err();

    let mut chain = Vec::new();
    let mut source: Option<&(dyn Error + 'static)> = Some(&err);
    while let Some(current) = source {
        chain.push(current.to_string());
        source = current.source();
    }
    assert_eq!(chain.len(), 5);
    assert_eq!(chain.last().unwrap(), "invalid operation: order o-2 already shipped");
}

#[tokio::test]
async fn detail_lines_render_every_level() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(shipping_fails_registry(), &journal);

    let err = messaging
        .send(CancelOrder {
            order_id: "o-3".into(),
        })
        .await
        .unwrap_err();

    let lines = err.detail_lines();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Publisher: "));
    assert!(lines[1].starts_with("  MessageDispatch: "));
    assert!(lines[2].starts_with("    Publisher: "));
    assert!(lines[3].starts_with("      MessageDispatch: "));
    assert_eq!(lines[4], "        invalid operation: order o-3 already shipped");
}

#[tokio::test]
async fn failed_dispatch_is_logged_with_errors() {
    let journal = Arc::new(Journal::default());
    let logger = MemoryMessageLogger::new();
    let registry = DispatchRegistry::builder()
        .event(Route::to::<ShippingConsumer>(
            "on_placed",
            MessageHandler::sync(|_evt: &OrderPlaced, _ctx: &HandlerContext| {
                Err(HandlerError::NotFound("warehouse".into()))
            }),
        ))
        .build();
    let messaging = messaging_with_logger(registry, &journal, &logger);

    messaging
        .publish(OrderPlaced {
            order_id: "o-4".into(),
            region: "eu".into(),
            amount: 3,
        })
        .await
        .unwrap_err();

    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].has_errors());
    assert_eq!(entries[0].message_name, "OrderPlaced");
}
