use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{MessageMeta, PublishedMessage};
use crate::serialization::ContentType;

/// Property carrying the logical message name.
pub const MESSAGE_TYPE_PROPERTY: &str = "MessageType";
/// Property carrying the route key, for filterable topic subscriptions.
pub const ROUTE_KEY_PROPERTY: &str = "RouteKey";
/// Property marking a reply to a request.
pub const IS_REPLY_PROPERTY: &str = "IsReply";
/// Property marking a reply that reports a failed request.
pub const IS_ERROR_REPLY_PROPERTY: &str = "IsErrorReply";

/// Body of an error reply, always JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

/// The broker-neutral view of a transport message.
///
/// Every broker client maps its native message onto these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub reply_to: Option<String>,
    pub message_type: Option<String>,
    /// Route key or subject used for topic matching.
    pub subject: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl TransportEnvelope {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Build the envelope for an outgoing message.
    ///
    /// Metadata headers become application properties, and the message name
    /// and route key are added so subscribers can filter on them.
    pub fn for_message(message: &PublishedMessage, content_type: ContentType, body: Vec<u8>) -> Self {
        let meta = message.meta();
        let route_key = message.route_key();

        let mut properties = meta.headers.clone();
        properties.insert(MESSAGE_TYPE_PROPERTY.to_string(), message.name().to_string());
        if let Some(key) = &route_key {
            properties.insert(ROUTE_KEY_PROPERTY.to_string(), key.clone());
        }
        if let Some(occurred) = &meta.occurred_at {
            properties.insert("DateOccurred".to_string(), occurred.to_rfc3339());
        }
        if let Some(by) = &meta.published_by {
            properties.insert("PublishedBy".to_string(), by.clone());
        }

        Self {
            message_id: meta.message_id.clone(),
            correlation_id: meta.correlation_id.clone(),
            content_type: Some(content_type.to_string()),
            reply_to: meta.reply_to.clone(),
            message_type: Some(message.name().to_string()),
            subject: route_key,
            properties,
            body,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }

    pub fn is_reply(&self) -> bool {
        self.property(IS_REPLY_PROPERTY) == Some("true")
    }

    pub fn is_error_reply(&self) -> bool {
        self.property(IS_ERROR_REPLY_PROPERTY) == Some("true")
    }

    /// The failure carried by an error reply.
    pub fn error_reply_body(&self) -> Option<ErrorReply> {
        if !self.is_error_reply() {
            return None;
        }
        Some(serde_json::from_slice(&self.body).unwrap_or_else(|_| ErrorReply {
            message: String::from_utf8_lossy(&self.body).into_owned(),
            details: Value::Null,
        }))
    }

    /// Logical message name, from the envelope field or the property.
    pub fn message_name(&self) -> Option<&str> {
        self.message_type
            .as_deref()
            .or_else(|| self.property(MESSAGE_TYPE_PROPERTY))
    }

    /// Correlation metadata for an incoming message.
    pub fn to_meta(&self) -> MessageMeta {
        let mut meta = MessageMeta {
            message_id: self.message_id.clone(),
            correlation_id: self.correlation_id.clone(),
            content_type: self.content_type.clone(),
            reply_to: self.reply_to.clone(),
            route_key: self.subject.clone(),
            headers: self.properties.clone(),
            ..MessageMeta::default()
        };
        meta.published_by = self.property("PublishedBy").map(str::to_string);
        meta.occurred_at = self
            .property("DateOccurred")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&chrono::Utc));
        meta
    }

    /// A reply to this envelope: same correlation and content type.
    pub fn reply(&self, body: Vec<u8>) -> Self {
        Self {
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            correlation_id: self.correlation_id.clone().or_else(|| self.message_id.clone()),
            content_type: self.content_type.clone(),
            reply_to: None,
            message_type: None,
            subject: None,
            properties: BTreeMap::from([(IS_REPLY_PROPERTY.to_string(), "true".to_string())]),
            body,
        }
    }

    /// A reply telling the requester its request failed.
    pub fn error_reply(&self, error: &ErrorReply) -> Self {
        let body = serde_json::to_vec(error).unwrap_or_else(|_| error.message.clone().into_bytes());
        let mut reply = self.reply(body).with_property(IS_ERROR_REPLY_PROPERTY, "true");
        reply.content_type = Some(ContentType::JSON.to_string());
        reply
    }
}
