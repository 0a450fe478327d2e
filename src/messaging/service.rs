//! MessagingService - the public entry point for publish, send and execute.
//!
//! ```ignore
//! let messaging = MessagingService::builder(registry)
//!     .with_services(services)
//!     .with_logger(Arc::new(TracingMessageLogger))
//!     .build();
//!
//! messaging.publish(OrderPlaced { .. }).await?;
//! let confirmation = messaging.send(PlaceOrder { .. }).await?;
//! ```

use std::any::Any;
use std::sync::{Arc, RwLock};

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;

use super::{
    CorrelationEnricher, DateOccurredEnricher, HandlerContext, LocalPublisher, MessageEnricher,
    MessagePublisher, QueryFilter, Services,
};
use crate::cancellation::CancellationToken;
use crate::dispatch::{DispatchError, DispatchRegistry, ErrorKind, HandlerError, MessageDispatcher};
use crate::logging::{hints, MessageLog, MessageLogger, NullMessageLogger};
use crate::message::{
    decode_result, AnyReply, Command, DomainEvent, MessageKind, MessageMeta, PublishedMessage, Query,
};
use crate::serialization::SerializationManager;

struct Inner {
    registry: Arc<DispatchRegistry>,
    services: Arc<Services>,
    serializer: Arc<SerializationManager>,
    logger: Arc<dyn MessageLogger>,
    enrichers: RwLock<Vec<Arc<dyn MessageEnricher>>>,
    query_filters: Vec<Arc<dyn QueryFilter>>,
    publishers: RwLock<Vec<Arc<dyn MessagePublisher>>>,
}

/// Publishes messages through enrichers and publishers and dispatches them
/// to in-process handlers. Cheap to clone.
#[derive(Clone)]
pub struct MessagingService {
    inner: Arc<Inner>,
}

impl MessagingService {
    pub fn builder(registry: DispatchRegistry) -> MessagingServiceBuilder {
        MessagingServiceBuilder::new(registry)
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.inner.registry
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    pub fn serializer(&self) -> &Arc<SerializationManager> {
        &self.inner.serializer
    }

    pub fn logger(&self) -> &Arc<dyn MessageLogger> {
        &self.inner.logger
    }

    /// Register a publisher, typically a broker integration during start.
    pub fn add_publisher(&self, publisher: Arc<dyn MessagePublisher>) {
        tracing::debug!(publisher = %publisher.name(), "adding message publisher");
        self.inner
            .publishers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(publisher);
    }

    /// Remove publishers by name. Returns how many were removed.
    pub fn remove_publisher(&self, name: &str) -> usize {
        let mut publishers = self.inner.publishers.write().unwrap_or_else(|p| p.into_inner());
        let before = publishers.len();
        publishers.retain(|p| p.name() != name);
        before - publishers.len()
    }

    pub fn publishers(&self) -> Vec<Arc<dyn MessagePublisher>> {
        self.inner.publishers.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Register an enricher after construction.
    pub fn add_enricher(&self, enricher: Arc<dyn MessageEnricher>) {
        self.inner
            .enrichers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(enricher);
    }

    fn enrichers(&self) -> Vec<Arc<dyn MessageEnricher>> {
        self.inner.enrichers.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    // =========================================================================
    // Public API
    // =========================================================================

    pub async fn publish<E: DomainEvent>(&self, event: E) -> Result<(), DispatchError> {
        self.publish_with(event, MessageMeta::new(), CancellationToken::none())
            .await
    }

    pub async fn publish_with<E: DomainEvent>(
        &self,
        event: E,
        meta: MessageMeta,
        token: CancellationToken,
    ) -> Result<(), DispatchError> {
        let mut message = PublishedMessage::new(event, meta);
        self.publish_message(&mut message, &token).await
    }

    /// Send a command and wait for its result.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.send_with(command, MessageMeta::new(), CancellationToken::none())
            .await
    }

    pub async fn send_with<C: Command>(
        &self,
        command: C,
        meta: MessageMeta,
        token: CancellationToken,
    ) -> Result<C::Output, DispatchError> {
        let mut message =
            PublishedMessage::new(command, meta).with_result_decoder(decode_result::<C::Output>);
        self.publish_message(&mut message, &token).await?;
        take_output::<C::Output>(C::NAME, &mut message)
    }

    /// Execute a query against its in-process consumer.
    pub async fn execute<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.execute_with(query, MessageMeta::new(), CancellationToken::none())
            .await
    }

    pub async fn execute_with<Q: Query>(
        &self,
        query: Q,
        meta: MessageMeta,
        token: CancellationToken,
    ) -> Result<Q::Output, DispatchError> {
        let mut message = PublishedMessage::new(query, meta);
        self.execute_query(&message, &token).await?;
        take_output::<Q::Output>(Q::NAME, &mut message)
    }

    /// Enrich a message and hand it to every publisher.
    ///
    /// Enricher failures abort before any publisher runs. Publisher failures
    /// are collected after all publishers finished.
    pub async fn publish_message(
        &self,
        message: &mut PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        self.apply_enrichers(message).await?;

        let publishers = self.publishers();
        let message: &PublishedMessage = message;
        let results = join_all(
            publishers
                .iter()
                .map(|publisher| publisher.publish(self, message, token)),
        )
        .await;

        let mut causes = Vec::new();
        for result in results {
            if let Err(err) = result {
                if err.kind() == ErrorKind::Publisher {
                    causes.extend(err.into_causes());
                } else {
                    causes.push(err);
                }
            }
        }

        if causes.is_empty() {
            return Ok(());
        }

        let err = DispatchError::publisher(message.name(), causes);
        tracing::warn!(
            message_name = %message.name(),
            correlation_id = ?message.meta().correlation_id,
            errors = ?err.detail_lines(),
            "message publish failed"
        );
        Err(err)
    }

    /// Dispatch a message received from outside (a broker subscription) to
    /// in-process handlers only. The result, if any, is stored on the message.
    pub async fn dispatch_in_process(
        &self,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        match message.message().kind() {
            MessageKind::Query => self.execute_query(message, token).await,
            _ => self.dispatch_local(message, token).await,
        }
    }

    // =========================================================================
    // Pipeline stages
    // =========================================================================

    async fn apply_enrichers(&self, message: &mut PublishedMessage) -> Result<(), DispatchError> {
        let name = message.name();
        let payload = message.message().clone();
        let mut failures = Vec::new();

        for enricher in self.enrichers() {
            if let Err(err) = enricher.enrich(payload.as_ref(), message.meta_mut()).await {
                failures.push(DispatchError::enricher_failed(enricher.name(), name, err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::enrichers(name, failures))
        }
    }

    /// Invoke matching in-process dispatchers.
    ///
    /// Commands go to their single dispatcher; domain events fan out
    /// concurrently and every handler runs even if siblings fail.
    pub(crate) async fn dispatch_local(
        &self,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let payload = message.message();
        let dispatchers: Vec<&Arc<MessageDispatcher>> = self
            .registry()
            .dispatchers_for(payload.message_type())
            .iter()
            .filter(|d| d.is_match(payload.as_ref()))
            .collect();

        if dispatchers.is_empty() {
            tracing::trace!(message_name = %message.name(), "no in-process dispatchers matched");
            return Ok(());
        }

        let results = join_all(
            dispatchers
                .iter()
                .map(|dispatcher| self.invoke(dispatcher, message, token)),
        )
        .await;

        let mut failures = Vec::new();
        for (dispatcher, result) in dispatchers.iter().zip(results) {
            match result {
                Ok(reply) => {
                    if dispatcher.kind() != MessageKind::DomainEvent {
                        message.set_result(reply);
                    }
                }
                Err(err) => failures.push(DispatchError::dispatch_failed(dispatcher, err)),
            }
        }

        let outcome = if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::publisher(message.name(), failures))
        };

        if self.inner.logger.is_enabled() {
            let mut entry = MessageLog::published(payload.as_ref(), message.meta(), hints::PUBLISH_LOCAL)
                .with_detail("Dispatchers", dispatchers.len().to_string());
            if let Err(err) = &outcome {
                entry = entry.with_dispatch_error(err);
            }
            self.inner.logger.log(entry);
        }

        outcome
    }

    async fn execute_query(&self, message: &PublishedMessage, token: &CancellationToken) -> Result<(), DispatchError> {
        let name = message.name();
        let query = message.message();

        for filter in &self.inner.query_filters {
            filter
                .on_pre_execute(query.as_ref(), message.meta())
                .await
                .map_err(|e| DispatchError::query_filter_failed(filter.name(), name, e))?;
        }

        let dispatcher = self
            .registry()
            .dispatchers_for(query.message_type())
            .first()
            .ok_or_else(|| {
                DispatchError::new(ErrorKind::QueryDispatch, format!("no consumer routed for query {}", name))
                    .with_detail("QueryType", name)
            })?;

        let mut result = self
            .invoke(dispatcher, message, token)
            .await
            .map_err(|e| DispatchError::dispatch_failed(dispatcher, e))?;

        for filter in &self.inner.query_filters {
            filter
                .on_post_execute(query.as_ref(), &mut result)
                .await
                .map_err(|e| DispatchError::query_filter_failed(filter.name(), name, e))?;
        }

        message.set_result(result);
        Ok(())
    }

    /// Start one handler invocation in a new scope.
    fn invoke(
        &self,
        dispatcher: &MessageDispatcher,
        message: &PublishedMessage,
        token: &CancellationToken,
    ) -> BoxFuture<'static, Result<Box<dyn AnyReply>, HandlerError>> {
        let token = if dispatcher.is_cancellable() {
            token.clone()
        } else {
            CancellationToken::none()
        };
        let ctx = HandlerContext::new(
            self.inner.services.create_scope(),
            self.clone(),
            message.meta().clone(),
            token,
        );
        tracing::trace!(
            message_name = %dispatcher.message_name(),
            consumer = %dispatcher.consumer_type(),
            handler = %dispatcher.handler_name(),
            "dispatching message"
        );
        dispatcher.dispatch(message.message().clone(), ctx)
    }
}

/// Extract a typed result. Commands without a result still succeed when the
/// output type has an empty value, such as `()` or `Option<T>`.
fn take_output<T: DeserializeOwned + Any>(name: &str, message: &mut PublishedMessage) -> Result<T, DispatchError> {
    match message.take_result() {
        Some(reply) => reply
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| DispatchError::dispatch(name, format!("result of {} has an unexpected type", name))),
        None => serde_json::from_value(serde_json::Value::Null)
            .map_err(|_| DispatchError::dispatch(name, format!("no result returned for {}", name))),
    }
}

/// Builds a `MessagingService`. The local publisher and the correlation and
/// date-occurred enrichers are installed by default.
pub struct MessagingServiceBuilder {
    registry: DispatchRegistry,
    services: Services,
    serializer: SerializationManager,
    logger: Arc<dyn MessageLogger>,
    enrichers: Vec<Arc<dyn MessageEnricher>>,
    query_filters: Vec<Arc<dyn QueryFilter>>,
    publishers: Vec<Arc<dyn MessagePublisher>>,
}

impl MessagingServiceBuilder {
    fn new(registry: DispatchRegistry) -> Self {
        Self {
            registry,
            services: Services::new(),
            serializer: SerializationManager::new(),
            logger: Arc::new(NullMessageLogger),
            enrichers: vec![Arc::new(CorrelationEnricher), Arc::new(DateOccurredEnricher)],
            query_filters: Vec::new(),
            publishers: vec![Arc::new(LocalPublisher)],
        }
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializationManager) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn MessageLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_enricher(mut self, enricher: impl MessageEnricher + 'static) -> Self {
        self.enrichers.push(Arc::new(enricher));
        self
    }

    /// Drop the default enrichers.
    pub fn without_default_enrichers(mut self) -> Self {
        self.enrichers.clear();
        self
    }

    pub fn with_query_filter(mut self, filter: impl QueryFilter + 'static) -> Self {
        self.query_filters.push(Arc::new(filter));
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn build(self) -> MessagingService {
        MessagingService {
            inner: Arc::new(Inner {
                registry: Arc::new(self.registry),
                services: Arc::new(self.services),
                serializer: Arc::new(self.serializer),
                logger: self.logger,
                enrichers: RwLock::new(self.enrichers),
                query_filters: self.query_filters,
                publishers: RwLock::new(self.publishers),
            }),
        }
    }
}
