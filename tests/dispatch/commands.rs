//! Command routing: cardinality, single delivery and handler shapes.

use std::sync::Arc;
use std::time::Duration;

use netfusion::logging::{hints, MemoryMessageLogger};
use netfusion::message::MessageMeta;
use netfusion::{
    BootstrapError, CancellationToken, DispatchRegistry, ErrorKind, HandlerContext, HandlerError, MessageHandler,
    Route,
};

use crate::support::{
    messaging, messaging_with_logger, AsyncGreeting, CancelOrder, Journal, OrderConfirmation, OrderConsumer,
    PlaceOrder, SyncGreeting,
};

fn confirm(cmd: &PlaceOrder, ctx: &HandlerContext) -> Result<OrderConfirmation, HandlerError> {
    ctx.require::<Journal>()?.record(format!("placed:{}", cmd.order_id));
    Ok(OrderConfirmation {
        order_id: cmd.order_id.clone(),
        accepted: cmd.amount <= 100,
    })
}

// ============================================================================
// Cardinality
// ============================================================================

#[test]
fn second_command_route_is_rejected_at_startup() {
    let result = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>("place", MessageHandler::sync_with_result(confirm)))
        .unwrap()
        .command(Route::new(
            "LegacyConsumer",
            "place_order",
            MessageHandler::sync_with_result(confirm),
        ));

    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("second route for PlaceOrder was accepted"),
    };
    match err {
        BootstrapError::MessageAlreadyRouted {
            message,
            existing,
            attempted,
        } => {
            assert_eq!(message, "PlaceOrder");
            assert_eq!(existing, "OrderConsumer::place");
            assert_eq!(attempted, "LegacyConsumer::place_order");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn registry_records_dispatcher_shape() {
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>("place", MessageHandler::sync_with_result(confirm)))
        .unwrap()
        .command(Route::to::<OrderConsumer>(
            "cancel",
            MessageHandler::from_async(|_cmd: Arc<CancelOrder>, _ctx: HandlerContext| async { Ok(()) }).cancellable(),
        ))
        .unwrap()
        .build();

    let place = &registry.dispatchers_for(std::any::TypeId::of::<PlaceOrder>())[0];
    assert!(!place.is_async());
    assert!(!place.is_cancellable());
    assert_eq!(place.consumer_type(), "OrderConsumer");

    let cancel = &registry.dispatchers_for(std::any::TypeId::of::<CancelOrder>())[0];
    assert!(cancel.is_async());
    assert!(!cancel.is_async_with_result());
    assert!(cancel.is_cancellable());
    assert!(registry.message_type("CancelOrder").is_some());
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn command_result_is_returned_to_sender() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>("place", MessageHandler::sync_with_result(confirm)))
        .unwrap()
        .build();
    let messaging = messaging(registry, &journal);

    let confirmation = messaging
        .send(PlaceOrder {
            order_id: "o-1".into(),
            amount: 40,
        })
        .await
        .unwrap();

    assert_eq!(
        confirmation,
        OrderConfirmation {
            order_id: "o-1".into(),
            accepted: true
        }
    );
    assert_eq!(journal.entries(), vec!["placed:o-1"]);
}

#[tokio::test]
async fn failing_command_handler_yields_publisher_error_wrapping_dispatch_error() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>(
            "place",
            MessageHandler::sync_with_result(|cmd: &PlaceOrder, _ctx: &HandlerContext| {
                Err::<OrderConfirmation, _>(HandlerError::Rejected(format!("order {} over limit", cmd.order_id)))
            }),
        ))
        .unwrap()
        .build();
    let messaging = messaging(registry, &journal);

    let err = messaging
        .send(PlaceOrder {
            order_id: "o-2".into(),
            amount: 900,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Publisher);
    assert_eq!(err.causes().len(), 1);

    let dispatch = err.inner().unwrap();
    assert_eq!(dispatch.kind(), ErrorKind::MessageDispatch);
    assert_eq!(dispatch.details()["ConsumerType"], "OrderConsumer");
    assert_eq!(dispatch.details()["HandlerMethod"], "place");
    assert!(dispatch.causes().is_empty());
    assert!(matches!(
        dispatch.original().and_then(|e| e.downcast_ref::<HandlerError>()),
        Some(HandlerError::Rejected(reason)) if reason == "order o-2 over limit"
    ));
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn unrouted_command_without_result_is_a_no_op() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(DispatchRegistry::empty(), &journal);

    messaging
        .send(CancelOrder {
            order_id: "o-3".into(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn unrouted_command_with_result_reports_missing_result() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(DispatchRegistry::empty(), &journal);

    let err = messaging
        .send(PlaceOrder {
            order_id: "o-4".into(),
            amount: 1,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MessageDispatch);
    assert_eq!(err.details()["MessageType"], "PlaceOrder");
}

// ============================================================================
// Handler shapes
// ============================================================================

#[tokio::test]
async fn sync_and_async_handlers_produce_the_same_result() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>(
            "greet_sync",
            MessageHandler::sync_with_result(|_cmd: &SyncGreeting, _ctx: &HandlerContext| Ok("X".to_string())),
        ))
        .unwrap()
        .command(Route::to::<OrderConsumer>(
            "greet_async",
            MessageHandler::from_async_with_result(|_cmd: Arc<AsyncGreeting>, _ctx: HandlerContext| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("X".to_string())
            }),
        ))
        .unwrap()
        .build();
    let messaging = messaging(registry, &journal);

    let from_sync = messaging.send(SyncGreeting { name: "a".into() }).await.unwrap();
    let from_async = messaging.send(AsyncGreeting { name: "a".into() }).await.unwrap();

    assert_eq!(from_sync, "X");
    assert_eq!(from_sync, from_async);
}

#[tokio::test]
async fn only_cancellable_handlers_observe_the_callers_token() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>(
            "cancel",
            MessageHandler::from_async(|cmd: Arc<CancelOrder>, ctx: HandlerContext| async move {
                ctx.check_cancelled()?;
                ctx.require::<Journal>()?.record(format!("cancelled:{}", cmd.order_id));
                Ok::<_, HandlerError>(())
            })
            .cancellable(),
        ))
        .unwrap()
        .command(Route::to::<OrderConsumer>(
            "place",
            MessageHandler::sync_with_result(|cmd: &PlaceOrder, ctx: &HandlerContext| {
                ctx.check_cancelled()?;
                confirm(cmd, ctx)
            }),
        ))
        .unwrap()
        .build();
    let messaging = messaging(registry, &journal);

    let token = CancellationToken::new();
    token.cancel();

    let err = messaging
        .send_with(
            CancelOrder {
                order_id: "o-5".into(),
            },
            MessageMeta::new(),
            token.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.handler_error(), Some(HandlerError::Cancelled)));

    let confirmation = messaging
        .send_with(
            PlaceOrder {
                order_id: "o-6".into(),
                amount: 10,
            },
            MessageMeta::new(),
            token,
        )
        .await
        .unwrap();
    assert!(confirmation.accepted);
    assert_eq!(journal.entries(), vec!["placed:o-6"]);
}

#[tokio::test]
async fn local_dispatch_is_logged() {
    let journal = Arc::new(Journal::default());
    let logger = MemoryMessageLogger::new();
    let registry = DispatchRegistry::builder()
        .command(Route::to::<OrderConsumer>("place", MessageHandler::sync_with_result(confirm)))
        .unwrap()
        .build();
    let messaging = messaging_with_logger(registry, &journal, &logger);

    messaging
        .send(PlaceOrder {
            order_id: "o-7".into(),
            amount: 5,
        })
        .await
        .unwrap();

    let entries = logger.with_hint(hints::PUBLISH_LOCAL);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message_name, "PlaceOrder");
    assert_eq!(entries[0].payload["order_id"], "o-7");
    assert!(entries[0].meta.message_id.is_some());
    assert!(!entries[0].has_errors());
}
