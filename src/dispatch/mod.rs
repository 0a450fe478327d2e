//! Dispatch model - handlers, routes, dispatchers and the route registry.
//!
//! Routes are declared explicitly at startup:
//!
//! ```ignore
//! let registry = DispatchRegistry::builder()
//!     .command(Route::to::<OrderConsumer>(
//!         "place_order",
//!         MessageHandler::from_async_with_result(|cmd: Arc<PlaceOrder>, ctx| async move {
//!             Ok(OrderConfirmation::for_order(&cmd.order_id))
//!         }),
//!     ))?
//!     .event(Route::to::<Notifier>("on_order_placed", MessageHandler::sync(|evt, _| Ok(()))))
//!     .build();
//! ```

mod dispatcher;
mod error;
mod handler;
mod registry;
mod rule;

pub use dispatcher::{MessageDispatcher, Route};
pub use error::{
    Details, DispatchError, ErrorKind, HandlerError, ENRICHER_EXCEPTION_DETAILS, PUBLISH_EXCEPTION_DETAILS,
};
pub use handler::{HandlerShape, MessageHandler};
pub use registry::{DispatchRegistry, DispatchRegistryBuilder, MessageDecoder, MessageType};
pub use rule::{DispatchRule, FnRule, RuleApplied};
