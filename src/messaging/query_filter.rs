use async_trait::async_trait;

use crate::dispatch::HandlerError;
use crate::message::{AnyMessage, AnyReply, MessageMeta};

/// Runs around query execution.
///
/// A failing pre-filter prevents the consumer from running. Post-filters
/// may replace the result.
#[async_trait]
pub trait QueryFilter: Send + Sync {
    fn name(&self) -> &str;

    async fn on_pre_execute(&self, _query: &dyn AnyMessage, _meta: &MessageMeta) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_post_execute(
        &self,
        _query: &dyn AnyMessage,
        _result: &mut Box<dyn AnyReply>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}
