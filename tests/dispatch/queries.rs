//! Query execution and query filters.

use std::sync::Arc;

use async_trait::async_trait;
use netfusion::message::{AnyMessage, AnyReply, MessageMeta};
use netfusion::messaging::QueryFilter;
use netfusion::{
    DispatchRegistry, ErrorKind, HandlerContext, HandlerError, MessageHandler, MessagingService, Route, Services,
};

use crate::support::{init_tracing, messaging, CountOrders, GetOrder, Journal, OrderQueries, OrderView};

fn order_queries() -> DispatchRegistry {
    DispatchRegistry::builder()
        .query(Route::to::<OrderQueries>(
            "get_order",
            MessageHandler::from_async_with_result(|query: Arc<GetOrder>, _ctx: HandlerContext| async move {
                if query.order_id == "missing" {
                    return Ok(None);
                }
                Ok(Some(OrderView {
                    order_id: query.order_id.clone(),
                    status: "placed".into(),
                }))
            }),
        ))
        .unwrap()
        .query(Route::to::<OrderQueries>(
            "count",
            MessageHandler::sync_with_result(|_query: &CountOrders, _ctx: &HandlerContext| Ok(3u32)),
        ))
        .unwrap()
        .build()
}

#[tokio::test]
async fn query_returns_the_consumer_result() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(order_queries(), &journal);

    let view = messaging
        .execute(GetOrder {
            order_id: "o-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        view,
        Some(OrderView {
            order_id: "o-1".into(),
            status: "placed".into()
        })
    );

    let missing = messaging
        .execute(GetOrder {
            order_id: "missing".into(),
        })
        .await
        .unwrap();
    assert_eq!(missing, None);
    assert_eq!(messaging.execute(CountOrders).await.unwrap(), 3);
}

#[test]
fn second_query_consumer_is_rejected() {
    let result = DispatchRegistry::builder()
        .query(Route::to::<OrderQueries>(
            "count",
            MessageHandler::sync_with_result(|_query: &CountOrders, _ctx: &HandlerContext| Ok(1u32)),
        ))
        .unwrap()
        .query(Route::to::<OrderQueries>(
            "count_again",
            MessageHandler::sync_with_result(|_query: &CountOrders, _ctx: &HandlerContext| Ok(2u32)),
        ));
    assert!(result.is_err());
}

#[tokio::test]
async fn query_without_consumer_is_a_query_dispatch_error() {
    let journal = Arc::new(Journal::default());
    let messaging = messaging(DispatchRegistry::empty(), &journal);

    let err = messaging.execute(CountOrders).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryDispatch);
    assert_eq!(err.details()["QueryType"], "CountOrders");
}

#[tokio::test]
async fn failing_consumer_is_a_query_dispatch_error() {
    let journal = Arc::new(Journal::default());
    let registry = DispatchRegistry::builder()
        .query(Route::to::<OrderQueries>(
            "count",
            MessageHandler::sync_with_result(|_query: &CountOrders, _ctx: &HandlerContext| {
                Err::<u32, _>(HandlerError::NotFound("orders table".into()))
            }),
        ))
        .unwrap()
        .build();
    let messaging = messaging(registry, &journal);

    let err = messaging.execute(CountOrders).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryDispatch);
    assert_eq!(err.details()["HandlerMethod"], "count");
    assert!(matches!(err.handler_error(), Some(HandlerError::NotFound(_))));
}

// ============================================================================
// Filters
// ============================================================================

/// Rejects queries from callers without a tenant header.
struct RequireTenant;

#[async_trait]
impl QueryFilter for RequireTenant {
    fn name(&self) -> &str {
        "RequireTenant"
    }

    async fn on_pre_execute(&self, _query: &dyn AnyMessage, meta: &MessageMeta) -> Result<(), HandlerError> {
        match meta.header("tenant") {
            Some(_) => Ok(()),
            None => Err(HandlerError::Rejected("tenant header missing".into())),
        }
    }
}

/// Masks order status for every result.
struct MaskStatus;

#[async_trait]
impl QueryFilter for MaskStatus {
    fn name(&self) -> &str {
        "MaskStatus"
    }

    async fn on_post_execute(
        &self,
        _query: &dyn AnyMessage,
        result: &mut Box<dyn AnyReply>,
    ) -> Result<(), HandlerError> {
        if let Some(Some(view)) = result.as_any().downcast_ref::<Option<OrderView>>() {
            let masked = OrderView {
                order_id: view.order_id.clone(),
                status: "hidden".into(),
            };
            *result = Box::new(Some(masked));
        }
        Ok(())
    }
}

fn filtered_messaging(journal: &Arc<Journal>) -> MessagingService {
    init_tracing();
    MessagingService::builder(order_queries())
        .with_services(Services::new().add_singleton_arc(journal.clone()))
        .with_query_filter(RequireTenant)
        .with_query_filter(MaskStatus)
        .build()
}

#[tokio::test]
async fn pre_filter_failure_prevents_execution() {
    let journal = Arc::new(Journal::default());
    let messaging = filtered_messaging(&journal);

    let err = messaging
        .execute(GetOrder {
            order_id: "o-2".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryFilter);
    assert_eq!(err.details()["QueryFilterType"], "RequireTenant");
    assert!(matches!(err.handler_error(), Some(HandlerError::Rejected(_))));
}

#[tokio::test]
async fn post_filter_replaces_the_result() {
    let journal = Arc::new(Journal::default());
    let messaging = filtered_messaging(&journal);

    let view = messaging
        .execute_with(
            GetOrder {
                order_id: "o-3".into(),
            },
            MessageMeta::new().with_header("tenant", "acme"),
            netfusion::CancellationToken::none(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(view.status, "hidden");
    assert_eq!(view.order_id, "o-3");
}
