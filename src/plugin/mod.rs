//! Plugin lifecycle glue.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CompositeApp                         │
//! │  compose(): initialize all, then configure all            │
//! │  start():   start in registration order                   │
//! │  stop():    stop in reverse order                         │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     PluginContext                         │
//! │  - Configuration / typed settings                         │
//! │  - application name and host id                           │
//! │  - MessagingService                                       │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod app;
mod context;

pub use app::{AppState, CompositeApp, CompositeAppBuilder};
pub use context::PluginContext;

use async_trait::async_trait;

use crate::error::BootstrapError;

/// A unit of functionality plugged into a `CompositeApp`.
///
/// Every phase defaults to doing nothing.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// Unique within one application.
    fn name(&self) -> &str;

    /// Read settings and validate them.
    async fn initialize(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        Ok(())
    }

    /// Build routes and entities. Runs after every module is initialized.
    async fn configure(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        Ok(())
    }

    async fn start(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        Ok(())
    }

    async fn stop(&mut self, _ctx: &PluginContext) -> Result<(), BootstrapError> {
        Ok(())
    }
}
