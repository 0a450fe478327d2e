//! Wire frame for Redis pub/sub.
//!
//! Redis carries only a payload, so envelope metadata travels in a JSON
//! frame with the body base64 encoded.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::bus::TransportEnvelope;
use crate::error::BrokerError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedisFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    body: String,
}

/// The channel a message is published on: `channel.route_key`, or the
/// bare channel when there is no route key.
pub fn channel_name(channel: &str, route_key: Option<&str>) -> String {
    match route_key {
        Some(key) if !key.is_empty() => format!("{channel}.{key}"),
        _ => channel.to_string(),
    }
}

pub fn encode_frame(channel: &str, envelope: &TransportEnvelope) -> Result<Vec<u8>, BrokerError> {
    let frame = RedisFrame {
        message_id: envelope.message_id.clone(),
        correlation_id: envelope.correlation_id.clone(),
        content_type: envelope.content_type.clone(),
        reply_to: envelope.reply_to.clone(),
        message_type: envelope.message_type.clone(),
        subject: envelope.subject.clone(),
        headers: envelope.properties.clone(),
        body: BASE64.encode(&envelope.body),
    };
    serde_json::to_vec(&frame).map_err(|e| BrokerError::Send {
        entity: channel.to_string(),
        reason: e.to_string(),
    })
}

pub fn decode_frame(channel: &str, payload: &[u8]) -> Result<TransportEnvelope, BrokerError> {
    let invalid = |reason: String| BrokerError::Receive {
        entity: channel.to_string(),
        reason,
    };
    let frame: RedisFrame = serde_json::from_slice(payload).map_err(|e| invalid(e.to_string()))?;
    let body = BASE64.decode(frame.body.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    Ok(TransportEnvelope {
        message_id: frame.message_id,
        correlation_id: frame.correlation_id,
        content_type: frame.content_type,
        reply_to: frame.reply_to,
        message_type: frame.message_type,
        subject: frame.subject,
        properties: frame.headers,
        body,
    })
}
