use std::sync::{Arc, Mutex, MutexGuard};

use super::{LogContext, MessageLog};

/// Receives message log entries.
pub trait MessageLogger: Send + Sync {
    fn log(&self, entry: MessageLog);

    /// Callers may skip building entries when logging is disabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Emits each entry as a `tracing` event on the `netfusion::messages` target.
#[derive(Debug, Default, Clone)]
pub struct TracingMessageLogger;

impl MessageLogger for TracingMessageLogger {
    fn log(&self, entry: MessageLog) {
        let payload = entry.payload.to_string();
        if entry.has_errors() {
            tracing::warn!(
                target: "netfusion::messages",
                context = ?entry.context,
                message_name = %entry.message_name,
                hint = %entry.sent_hint,
                message_id = ?entry.meta.message_id,
                correlation_id = ?entry.meta.correlation_id,
                errors = ?entry.errors,
                payload = %payload,
                "message logged with errors"
            );
        } else {
            tracing::debug!(
                target: "netfusion::messages",
                context = ?entry.context,
                message_name = %entry.message_name,
                hint = %entry.sent_hint,
                message_id = ?entry.meta.message_id,
                correlation_id = ?entry.meta.correlation_id,
                payload = %payload,
                "message logged"
            );
        }
    }
}

/// Keeps entries in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryMessageLogger {
    buffer: Arc<Mutex<Vec<MessageLog>>>,
}

impl MemoryMessageLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MessageLog>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entries(&self) -> Vec<MessageLog> {
        self.lock().clone()
    }

    pub fn with_hint(&self, hint: &str) -> Vec<MessageLog> {
        self.lock().iter().filter(|e| e.sent_hint == hint).cloned().collect()
    }

    pub fn with_context(&self, context: LogContext) -> Vec<MessageLog> {
        self.lock().iter().filter(|e| e.context == context).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl MessageLogger for MemoryMessageLogger {
    fn log(&self, entry: MessageLog) {
        self.lock().push(entry);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone)]
pub struct NullMessageLogger;

impl MessageLogger for NullMessageLogger {
    fn log(&self, _entry: MessageLog) {}

    fn is_enabled(&self) -> bool {
        false
    }
}
