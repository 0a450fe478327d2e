//! Inbound processing: decoding, dispatch and replies to `reply_to`.

use std::sync::Arc;

use netfusion::bus::{
    BusEntity, BusEntityContext, ConnectionCache, ConnectionTarget, DeliveryOutcome, EntityAddress,
    EntityDeclaration, EntityReceiver, InMemoryBroker, TransportEnvelope, MESSAGE_TYPE_PROPERTY,
};
use netfusion::logging::{hints, LogContext, MemoryMessageLogger};
use netfusion::{
    ContentType, DispatchRegistry, HandlerContext, Message, MessageHandler, MessagingService, Route,
    SerializationManager, Services,
};

use crate::support::{init_tracing, CancelOrder, Journal, OrderConfirmation, OrderConsumer, PlaceOrder};

const BUS: &str = "orders";

struct Fixture {
    broker: InMemoryBroker,
    journal: Arc<Journal>,
    logger: MemoryMessageLogger,
    context: BusEntityContext,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let broker = InMemoryBroker::new();
        let journal = Arc::new(Journal::default());
        let logger = MemoryMessageLogger::new();
        let registry = DispatchRegistry::builder()
            .command(Route::to::<OrderConsumer>(
                "place",
                MessageHandler::sync_with_result(|cmd: &PlaceOrder, ctx: &HandlerContext| {
                    ctx.require::<Journal>()?.record(format!("placed:{}", cmd.order_id));
                    Ok(OrderConfirmation {
                        order_id: cmd.order_id.clone(),
                        accepted: true,
                    })
                }),
            ))
            .unwrap()
            .command(Route::to::<OrderConsumer>(
                "cancel",
                MessageHandler::sync(|cmd: &CancelOrder, ctx: &HandlerContext| {
                    ctx.require::<Journal>()?.record(format!("cancelled:{}", cmd.order_id));
                    Ok(())
                }),
            ))
            .unwrap()
            .build();
        let messaging = MessagingService::builder(registry)
            .with_services(Services::new().add_singleton_arc(journal.clone()))
            .with_logger(Arc::new(logger.clone()))
            .build();
        let connections = Arc::new(ConnectionCache::new(
            Arc::new(broker.clone()),
            [ConnectionTarget::new(BUS, "rabbit.local")],
        ));
        let context = BusEntityContext::new("rabbitmq", "orders", "orders-1", messaging, connections);
        Self {
            broker,
            journal,
            logger,
            context,
        }
    }

    fn receiver(&self, messages: &[&'static str]) -> EntityReceiver {
        let entity = BusEntity::new(BUS, EntityDeclaration::queue("order-commands"))
            .with_messages(messages.iter().copied());
        EntityReceiver::new(self.context.clone(), Arc::new(entity), hints::RABBITMQ_RECEIVE)
    }
}

fn envelope(body: Vec<u8>, message_name: &str, content_type: ContentType) -> TransportEnvelope {
    let mut envelope = TransportEnvelope::new(body).with_property(MESSAGE_TYPE_PROPERTY, message_name);
    envelope.content_type = Some(content_type.to_string());
    envelope
}

#[tokio::test]
async fn reply_keeps_correlation_id_and_content_type() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[PlaceOrder::NAME]);
    let command = PlaceOrder {
        order_id: "o-1".into(),
        amount: 10,
    };
    let body = SerializationManager::new()
        .serialize(&command, ContentType::Bitcode)
        .unwrap();
    let request = envelope(body, PlaceOrder::NAME, ContentType::Bitcode)
        .with_reply_to("web.replies")
        .with_correlation_id("req-1");

    let outcome = receiver.process(request).await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Replied {
            reply_to: "web.replies".into()
        }
    );
    let replies = fixture.broker.sent_to(&EntityAddress::queue("web.replies"));
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert!(reply.is_reply());
    assert_eq!(reply.correlation_id.as_deref(), Some("req-1"));
    assert_eq!(reply.content_type.as_deref(), Some(ContentType::BITCODE));

    let confirmation: OrderConfirmation = SerializationManager::new()
        .deserialize(&reply.body, ContentType::Bitcode)
        .unwrap();
    assert_eq!(confirmation.order_id, "o-1");
    assert!(confirmation.accepted);
    assert_eq!(fixture.logger.with_hint(hints::REPLY).len(), 1);
}

#[tokio::test]
async fn empty_result_sends_no_reply() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[CancelOrder::NAME]);
    let request = envelope(br#"{"order_id":"o-2"}"#.to_vec(), CancelOrder::NAME, ContentType::Json)
        .with_reply_to("web.replies")
        .with_correlation_id("req-2");

    assert_eq!(receiver.process(request).await, DeliveryOutcome::Dispatched);
    assert_eq!(fixture.journal.entries(), vec!["cancelled:o-2"]);
    assert!(fixture.broker.sent().is_empty());
}

#[tokio::test]
async fn single_message_entity_supplies_the_missing_message_type() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[CancelOrder::NAME]);
    let mut request = TransportEnvelope::new(br#"{"order_id":"o-3"}"#.to_vec());
    request.content_type = Some(ContentType::JSON.to_string());

    assert_eq!(receiver.process(request).await, DeliveryOutcome::Dispatched);
    assert_eq!(fixture.journal.entries(), vec!["cancelled:o-3"]);

    let received = fixture.logger.with_context(LogContext::Received);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message_name, "CancelOrder");
    assert_eq!(received[0].details["Entity"], "order-commands");
}

#[tokio::test]
async fn undecodable_body_fails_and_is_logged() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[PlaceOrder::NAME, CancelOrder::NAME]);
    let request = envelope(b"not json".to_vec(), PlaceOrder::NAME, ContentType::Json);

    let outcome = receiver.process(request).await;

    assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
    assert!(fixture.journal.entries().is_empty());
    let entries = fixture.logger.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].has_errors());
    assert_eq!(entries[0].sent_hint, hints::RABBITMQ_RECEIVE);
}

#[tokio::test]
async fn unknown_message_type_fails() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[PlaceOrder::NAME, CancelOrder::NAME]);
    let request = envelope(b"{}".to_vec(), "RefundOrder", ContentType::Json);

    assert!(matches!(receiver.process(request).await, DeliveryOutcome::Failed(_)));
    assert!(fixture.journal.entries().is_empty());
}

#[tokio::test]
async fn failed_request_gets_an_error_reply() {
    let fixture = Fixture::new();
    let receiver = fixture.receiver(&[PlaceOrder::NAME, CancelOrder::NAME]);
    let request = envelope(b"{}".to_vec(), "RefundOrder", ContentType::Json)
        .with_reply_to("web.replies")
        .with_correlation_id("req-4");

    assert!(matches!(receiver.process(request).await, DeliveryOutcome::Failed(_)));

    let replies = fixture.broker.sent_to(&EntityAddress::queue("web.replies"));
    assert_eq!(replies.len(), 1);
    assert!(replies[0].is_error_reply());
    assert_eq!(replies[0].correlation_id.as_deref(), Some("req-4"));
    let failure = replies[0].error_reply_body().unwrap();
    assert!(failure.message.contains("RefundOrder"));
}
