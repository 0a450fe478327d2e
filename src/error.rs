//! Bootstrap, settings and broker errors.
//!
//! Dispatch-time failures live in `crate::dispatch` as a `DispatchError`
//! tree. The errors here are either fatal at startup or returned by broker
//! clients.

use thiserror::Error;

use crate::serialization::SerializationError;

/// Fatal registration and lifecycle errors raised while composing the app.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("message {message} already routed to {existing}, cannot route to {attempted}")]
    MessageAlreadyRouted {
        message: String,
        existing: String,
        attempted: String,
    },

    #[error("entity {entity} on bus {bus} already has a publish strategy")]
    DuplicatePublishStrategy { bus: String, entity: String },

    #[error("bus name {0} is configured more than once")]
    DuplicateBusName(String),

    #[error("message {message} is routed to more than one entity ({first}, {second})")]
    MessageRoutedToMultipleEntities {
        message: String,
        first: String,
        second: String,
    },

    #[error("bus {0} is not configured")]
    UnknownBus(String),

    #[error("plugin module {0} is registered more than once")]
    DuplicateModule(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Configuration loading and validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("section {section} is malformed: {reason}")]
    Malformed { section: String, reason: String },

    #[error("section {section} is invalid: {reason}")]
    Invalid { section: String, reason: String },
}

/// Errors reported by broker connections and entity strategies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("connection to {0} is closed")]
    ConnectionClosed(String),

    #[error("entity {0} not found")]
    EntityNotFound(String),

    #[error("failed to declare {entity}: {reason}")]
    Declare { entity: String, reason: String },

    #[error("failed to send to {entity}: {reason}")]
    Send { entity: String, reason: String },

    #[error("failed to receive from {entity}: {reason}")]
    Receive { entity: String, reason: String },

    #[error("request {correlation_id} timed out after {millis}ms")]
    RequestTimeout { correlation_id: String, millis: u64 },

    #[error("request {correlation_id} failed at the receiver: {message}")]
    RemoteDispatch {
        correlation_id: String,
        message: String,
        details: serde_json::Value,
    },

    #[error("entity {entity} has no {strategy} strategy")]
    MissingStrategy { entity: String, strategy: &'static str },

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
