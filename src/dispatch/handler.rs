use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::HandlerError;
use crate::messaging::HandlerContext;

/// The four supported handler signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerShape {
    Sync,
    SyncWithResult,
    Async,
    AsyncWithResult,
}

impl HandlerShape {
    pub fn is_async(&self) -> bool {
        matches!(self, HandlerShape::Async | HandlerShape::AsyncWithResult)
    }

    pub fn has_result(&self) -> bool {
        matches!(self, HandlerShape::SyncWithResult | HandlerShape::AsyncWithResult)
    }
}

pub(crate) type HandlerFn<M, R> =
    Arc<dyn Fn(Arc<M>, HandlerContext) -> BoxFuture<'static, Result<R, HandlerError>> + Send + Sync>;

/// A handler for message `M` producing `R`.
///
/// Synchronous handlers are normalized into the asynchronous contract, so
/// every dispatcher is awaited the same way.
pub struct MessageHandler<M, R = ()> {
    pub(crate) shape: HandlerShape,
    pub(crate) cancellable: bool,
    pub(crate) invoke: HandlerFn<M, R>,
}

impl<M, R> MessageHandler<M, R>
where
    M: Send + Sync + 'static,
    R: Send + 'static,
{
    /// A synchronous handler returning a result.
    pub fn sync_with_result<F>(handler: F) -> Self
    where
        F: Fn(&M, &HandlerContext) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            shape: HandlerShape::SyncWithResult,
            cancellable: false,
            invoke: Arc::new(move |msg: Arc<M>, ctx: HandlerContext| {
                let handler = handler.clone();
                async move { handler(&msg, &ctx) }.boxed()
            }),
        }
    }

    /// An asynchronous handler returning a result.
    pub fn from_async_with_result<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<M>, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        Self {
            shape: HandlerShape::AsyncWithResult,
            cancellable: false,
            invoke: Arc::new(move |msg: Arc<M>, ctx: HandlerContext| handler(msg, ctx).boxed()),
        }
    }

    /// Hand the caller's cancellation token to this handler.
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    pub fn shape(&self) -> HandlerShape {
        self.shape
    }
}

impl<M> MessageHandler<M, ()>
where
    M: Send + Sync + 'static,
{
    /// A synchronous handler without a result.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(&M, &HandlerContext) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            shape: HandlerShape::Sync,
            ..Self::sync_with_result(handler)
        }
    }

    /// An asynchronous handler without a result.
    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<M>, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            shape: HandlerShape::Async,
            ..Self::from_async_with_result(handler)
        }
    }
}
