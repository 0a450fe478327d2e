use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::DispatchError;
use crate::message::{AnyMessage, MessageMeta};
use crate::serialization::ContentType;

/// Whether the entry records an outgoing or incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogContext {
    Published,
    Received,
}

/// One logged message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageLog {
    pub context: LogContext,
    pub message_name: String,
    /// JSON payload, or `{"base64": ...}` for binary bodies.
    pub payload: Value,
    pub meta: MessageMeta,
    pub sent_hint: String,
    pub details: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub logged_at: DateTime<Utc>,
}

impl MessageLog {
    fn new(context: LogContext, message_name: &str, payload: Value, meta: &MessageMeta, hint: &str) -> Self {
        Self {
            context,
            message_name: message_name.to_string(),
            payload,
            meta: meta.clone(),
            sent_hint: hint.to_string(),
            details: BTreeMap::new(),
            errors: Vec::new(),
            logged_at: Utc::now(),
        }
    }

    pub fn published(message: &dyn AnyMessage, meta: &MessageMeta, hint: &str) -> Self {
        let payload = message.to_json().unwrap_or(Value::Null);
        Self::new(LogContext::Published, message.message_name(), payload, meta, hint)
    }

    pub fn received(message: &dyn AnyMessage, meta: &MessageMeta, hint: &str) -> Self {
        let payload = message.to_json().unwrap_or(Value::Null);
        Self::new(LogContext::Received, message.message_name(), payload, meta, hint)
    }

    /// An entry for a raw transport body, used when decoding failed.
    pub fn raw(
        context: LogContext,
        message_name: &str,
        body: &[u8],
        content_type: Option<ContentType>,
        meta: &MessageMeta,
        hint: &str,
    ) -> Self {
        let payload = match content_type {
            Some(ContentType::Json) => serde_json::from_slice(body).unwrap_or_else(|_| base64_payload(body)),
            Some(ContentType::PlainText) => Value::String(String::from_utf8_lossy(body).into_owned()),
            _ => base64_payload(body),
        };
        Self::new(context, message_name, payload, meta, hint)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Record every node of a dispatch error tree.
    pub fn with_dispatch_error(mut self, error: &DispatchError) -> Self {
        self.errors.extend(error.detail_lines());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn base64_payload(body: &[u8]) -> Value {
    serde_json::json!({ "base64": BASE64.encode(body) })
}
