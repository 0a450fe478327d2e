use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Correlation and transport metadata carried beside a message payload.
///
/// Populated by enrichers on publish and from the transport envelope on
/// receive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub reply_to: Option<String>,
    pub route_key: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub published_by: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl MessageMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    pub fn with_route_key(mut self, key: impl Into<String>) -> Self {
        self.route_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    /// Metadata for a message published from inside a handler: keeps the
    /// correlation id of the message being handled.
    pub fn correlated_with(parent: &MessageMeta) -> Self {
        Self {
            correlation_id: parent.correlation_id.clone().or_else(|| parent.message_id.clone()),
            ..Self::default()
        }
    }
}
