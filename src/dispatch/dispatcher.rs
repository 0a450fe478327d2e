use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::handler::HandlerFn;
use super::rule::{rules_match, DispatchRule, RuleApplied};
use super::{HandlerError, HandlerShape, MessageHandler};
use crate::message::{AnyMessage, AnyReply, Message, MessageKind};
use crate::messaging::HandlerContext;

type ErasedInvoke = Arc<
    dyn Fn(Arc<dyn AnyMessage>, HandlerContext) -> BoxFuture<'static, Result<Box<dyn AnyReply>, HandlerError>>
        + Send
        + Sync,
>;
type ErasedMatch = Arc<dyn Fn(&dyn AnyMessage) -> bool + Send + Sync>;

/// A declared route: consumer, handler and optional filters for message `M`.
pub struct Route<M, R = ()> {
    consumer_type: &'static str,
    handler_name: &'static str,
    handler: MessageHandler<M, R>,
    predicate: Option<Arc<dyn Fn(&M) -> bool + Send + Sync>>,
    rules: Vec<Arc<dyn DispatchRule<M>>>,
    rule_applied: RuleApplied,
}

impl<M, R> Route<M, R>
where
    M: Message,
    R: AnyReply,
{
    pub fn new(consumer_type: &'static str, handler_name: &'static str, handler: MessageHandler<M, R>) -> Self {
        Self {
            consumer_type,
            handler_name,
            handler,
            predicate: None,
            rules: Vec::new(),
            rule_applied: RuleApplied::All,
        }
    }

    /// Route to a handler on consumer type `T`.
    pub fn to<T: ?Sized>(handler_name: &'static str, handler: MessageHandler<M, R>) -> Self {
        Self::new(short_type_name::<T>(), handler_name, handler)
    }

    /// Only dispatch messages matching the predicate.
    pub fn when(mut self, predicate: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn apply_rule(mut self, rule: impl DispatchRule<M> + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn rule_applied(mut self, applied: RuleApplied) -> Self {
        self.rule_applied = applied;
        self
    }

    pub(crate) fn into_dispatcher(self) -> MessageDispatcher {
        let Route {
            consumer_type,
            handler_name,
            handler,
            predicate,
            rules,
            rule_applied,
        } = self;

        let matcher: Option<ErasedMatch> = if predicate.is_none() && rules.is_empty() {
            None
        } else {
            Some(Arc::new(move |msg: &dyn AnyMessage| {
                let Some(msg) = msg.downcast_ref::<M>() else {
                    return false;
                };
                predicate.as_ref().map_or(true, |p| p(msg)) && rules_match(&rules, rule_applied, msg)
            }))
        };

        MessageDispatcher {
            message_type: TypeId::of::<M>(),
            message_name: M::NAME,
            kind: M::KIND,
            consumer_type,
            handler_name,
            shape: handler.shape,
            cancellable: handler.cancellable,
            matcher,
            invoke: erase(handler.invoke),
        }
    }
}

fn erase<M, R>(invoke: HandlerFn<M, R>) -> ErasedInvoke
where
    M: Message,
    R: AnyReply,
{
    Arc::new(move |msg: Arc<dyn AnyMessage>, ctx: HandlerContext| {
        let invoke = invoke.clone();
        async move {
            let msg = msg.into_any_arc().downcast::<M>().map_err(|_| {
                HandlerError::InvalidOperation(format!("dispatcher for {} received another message type", M::NAME))
            })?;
            let reply = invoke(msg, ctx).await?;
            Ok(Box::new(reply) as Box<dyn AnyReply>)
        }
        .boxed()
    })
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Binds a message type to one consumer handler. Read-only after bootstrap.
pub struct MessageDispatcher {
    message_type: TypeId,
    message_name: &'static str,
    kind: MessageKind,
    consumer_type: &'static str,
    handler_name: &'static str,
    shape: HandlerShape,
    cancellable: bool,
    matcher: Option<ErasedMatch>,
    invoke: ErasedInvoke,
}

impl MessageDispatcher {
    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_query(&self) -> bool {
        self.kind == MessageKind::Query
    }

    pub fn consumer_type(&self) -> &'static str {
        self.consumer_type
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn shape(&self) -> HandlerShape {
        self.shape
    }

    pub fn is_async(&self) -> bool {
        self.shape.is_async()
    }

    pub fn is_async_with_result(&self) -> bool {
        self.shape == HandlerShape::AsyncWithResult
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    pub fn has_filters(&self) -> bool {
        self.matcher.is_some()
    }

    /// Evaluate the route's predicate and rules.
    pub fn is_match(&self, message: &dyn AnyMessage) -> bool {
        self.matcher.as_ref().map_or(true, |m| m(message))
    }

    /// Invoke the handler. The context is expected to carry a fresh scope.
    pub fn dispatch(
        &self,
        message: Arc<dyn AnyMessage>,
        ctx: HandlerContext,
    ) -> BoxFuture<'static, Result<Box<dyn AnyReply>, HandlerError>> {
        (self.invoke)(message, ctx)
    }
}

impl fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("message", &self.message_name)
            .field("consumer", &self.consumer_type)
            .field("handler", &self.handler_name)
            .field("shape", &self.shape)
            .field("cancellable", &self.cancellable)
            .finish()
    }
}
