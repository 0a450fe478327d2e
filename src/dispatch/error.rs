//! Structured dispatch errors.
//!
//! A failed publish produces a tree of `DispatchError` nodes that mirrors
//! the call structure: publisher aggregate, per-handler dispatch failure,
//! nested publish from inside the handler, and so on down to the original
//! handler error. Every node carries a detail bag for structured logging.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

use super::MessageDispatcher;
use crate::error::BrokerError;

/// Structured key/value diagnostics attached to a `DispatchError`.
pub type Details = BTreeMap<String, Value>;

/// Key under which a publisher aggregate lists its children's detail bags.
pub const PUBLISH_EXCEPTION_DETAILS: &str = "PublishExceptionDetails";
/// Key under which an enricher aggregate lists its children's detail bags.
pub const ENRICHER_EXCEPTION_DETAILS: &str = "EnricherExceptionDetails";

/// Discriminates the nodes of a dispatch error tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A single handler invocation failed.
    MessageDispatch,
    /// One or more publishers (or their handlers) failed.
    Publisher,
    /// A message enricher failed.
    Enricher,
    /// A query consumer failed.
    QueryDispatch,
    /// A pre or post query filter failed.
    QueryFilter,
    /// A broker publish strategy failed to send.
    Broker,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MessageDispatch => "MessageDispatch",
            ErrorKind::Publisher => "Publisher",
            ErrorKind::Enricher => "Enricher",
            ErrorKind::QueryDispatch => "QueryDispatch",
            ErrorKind::QueryFilter => "QueryFilter",
            ErrorKind::Broker => "Broker",
        };
        f.write_str(name)
    }
}

/// Error returned by message handlers, filters and enrichers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("cancelled")]
    Cancelled,
    /// A message published from inside the handler failed.
    #[error("{0}")]
    Dispatch(#[source] Box<DispatchError>),
    #[error("handler error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn other(err: impl Error + Send + Sync + 'static) -> Self {
        HandlerError::Other(Box::new(err))
    }
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        HandlerError::Dispatch(Box::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl From<BrokerError> for HandlerError {
    fn from(err: BrokerError) -> Self {
        HandlerError::Other(Box::new(err))
    }
}

/// A node in the dispatch error tree.
#[derive(Debug)]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
    details: Details,
    causes: Vec<DispatchError>,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Details::new(),
            causes: Vec::new(),
            source: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    fn with_boxed_source(mut self, source: Box<dyn Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_causes(mut self, causes: Vec<DispatchError>) -> Self {
        self.causes = causes;
        self
    }

    // =========================================================================
    // Tree constructors
    // =========================================================================

    /// Wrap a handler failure for the dispatcher that raised it.
    ///
    /// When the handler failed because a message it published failed, the
    /// nested tree becomes this node's cause and only a one-line description
    /// is recorded in the details.
    pub fn dispatch_failed(dispatcher: &MessageDispatcher, error: HandlerError) -> Self {
        let kind = if dispatcher.is_query() {
            ErrorKind::QueryDispatch
        } else {
            ErrorKind::MessageDispatch
        };
        let message = format!(
            "error dispatching message {} to {}::{}",
            dispatcher.message_name(),
            dispatcher.consumer_type(),
            dispatcher.handler_name()
        );

        let node = Self::new(kind, message)
            .with_detail("MessageType", dispatcher.message_name())
            .with_detail("ConsumerType", dispatcher.consumer_type())
            .with_detail("HandlerMethod", dispatcher.handler_name());

        match error {
            HandlerError::Dispatch(nested) => node
                .with_detail("InnerException", nested.to_string())
                .with_causes(vec![*nested]),
            other => node
                .with_detail("InnerException", other.to_string())
                .with_source(other),
        }
    }

    /// Aggregate publisher failures for one message, preserving order.
    pub fn publisher(message_name: &str, causes: Vec<DispatchError>) -> Self {
        let bags: Vec<Value> = causes.iter().map(|c| c.detail_bag()).collect();
        Self::new(
            ErrorKind::Publisher,
            format!("exception when invoking message publishers for {}", message_name),
        )
        .with_detail("MessageType", message_name)
        .with_detail(PUBLISH_EXCEPTION_DETAILS, Value::Array(bags))
        .with_causes(causes)
    }

    /// A single enricher failure.
    pub fn enricher_failed(enricher: &str, message_name: &str, error: HandlerError) -> Self {
        Self::new(
            ErrorKind::Enricher,
            format!("enricher {} failed for message {}", enricher, message_name),
        )
        .with_detail("EnricherType", enricher)
        .with_detail("MessageType", message_name)
        .with_detail("InnerException", error.to_string())
        .with_source(error)
    }

    /// Aggregate enricher failures after every enricher was attempted.
    pub fn enrichers(message_name: &str, causes: Vec<DispatchError>) -> Self {
        let bags: Vec<Value> = causes.iter().map(|c| c.detail_bag()).collect();
        Self::new(
            ErrorKind::Enricher,
            format!("exception when invoking message enrichers for {}", message_name),
        )
        .with_detail("MessageType", message_name)
        .with_detail(ENRICHER_EXCEPTION_DETAILS, Value::Array(bags))
        .with_causes(causes)
    }

    /// A pre or post query filter failure.
    pub fn query_filter_failed(filter: &str, query_name: &str, error: HandlerError) -> Self {
        Self::new(
            ErrorKind::QueryFilter,
            format!("query filter {} failed for query {}", filter, query_name),
        )
        .with_detail("QueryFilterType", filter)
        .with_detail("QueryType", query_name)
        .with_detail("InnerException", error.to_string())
        .with_source(error)
    }

    /// A broker publish failure.
    pub fn broker(bus: &str, entity: &str, message_name: &str, error: BrokerError) -> Self {
        Self::new(
            ErrorKind::Broker,
            format!("error sending message {} to {} on bus {}", message_name, entity, bus),
        )
        .with_detail("BusName", bus)
        .with_detail("EntityName", entity)
        .with_detail("MessageType", message_name)
        .with_detail("InnerException", error.to_string())
        .with_source(error)
    }

    /// A request whose receiver answered with an error reply. The remote
    /// failure's details are kept under `RemoteError`.
    pub fn remote_dispatch(bus: &str, entity: &str, message_name: &str, error: BrokerError) -> Self {
        let BrokerError::RemoteDispatch { message, details, .. } = &error else {
            return Self::broker(bus, entity, message_name, error);
        };
        Self::new(
            ErrorKind::MessageDispatch,
            format!("message {} failed at {} on bus {}: {}", message_name, entity, bus, message),
        )
        .with_detail("BusName", bus)
        .with_detail("EntityName", entity)
        .with_detail("MessageType", message_name)
        .with_detail("RemoteError", details.clone())
        .with_detail("InnerException", error.to_string())
        .with_source(error)
    }

    /// A failure that has no handler behind it (missing route, missing result).
    pub fn dispatch(message_name: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(ErrorKind::MessageDispatch, reason.clone())
            .with_detail("MessageType", message_name)
            .with_detail("Reason", reason)
    }

    /// Wrap an arbitrary boxed error as a node of the given kind.
    pub fn from_boxed(kind: ErrorKind, message: impl Into<String>, err: Box<dyn Error + Send + Sync>) -> Self {
        Self::new(kind, message).with_boxed_source(err)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn causes(&self) -> &[DispatchError] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<DispatchError> {
        self.causes
    }

    /// First child node, the analogue of an inner exception.
    pub fn inner(&self) -> Option<&DispatchError> {
        self.causes.first()
    }

    /// The non-dispatch error at the bottom of this node, if any.
    pub fn original(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Follow first causes down to the deepest node.
    pub fn innermost(&self) -> &DispatchError {
        let mut node = self;
        while let Some(next) = node.causes.first() {
            node = next;
        }
        node
    }

    /// Depth of the first-cause chain, counting this node.
    pub fn depth(&self) -> usize {
        1 + self.causes.first().map_or(0, |c| c.depth())
    }

    /// The original handler error at the bottom of the first-cause chain,
    /// downcast to a `HandlerError` when it is one.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        self.innermost()
            .source
            .as_deref()
            .and_then(|e| e.downcast_ref::<HandlerError>())
    }

    /// This node's message and details as a JSON object.
    pub fn detail_bag(&self) -> Value {
        let mut bag = serde_json::Map::new();
        bag.insert("Kind".into(), json!(self.kind.to_string()));
        bag.insert("Message".into(), json!(self.message));
        for (key, value) in &self.details {
            bag.insert(key.clone(), value.clone());
        }
        Value::Object(bag)
    }

    /// One line per node, indented by depth, for log output.
    pub fn detail_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.collect_lines(0, &mut lines);
        lines
    }

    fn collect_lines(&self, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}{}: {}", "  ".repeat(depth), self.kind, self.message));
        for cause in &self.causes {
            cause.collect_lines(depth + 1, lines);
        }
        if self.causes.is_empty() {
            if let Some(source) = &self.source {
                lines.push(format!("{}{}", "  ".repeat(depth + 1), source));
            }
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Some(first) = self.causes.first() {
            return Some(first);
        }
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}
