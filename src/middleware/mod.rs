//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, so it can inspect the request,
//! short-circuit with its own response, or decorate the response that comes
//! back from downstream. Response interception is plain value transformation:
//! a middleware awaits [`Next::run`], gets the downstream [`Response`], and
//! returns whatever it wants the caller to see.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain.
//! - [`Pipeline`]: an ordered stack of middleware ending in an endpoint.
//! - [`when`]: runs a middleware only for requests matching a predicate.
//! - [`map_response`]: lifts a pure `Response -> Response` function into middleware.
//! - [`LoggerMiddleware`]: request/response logger.
//!
//! The edge-specific layers live in submodules: [`timing`], [`pagination`]
//! and [`etag`]. Caching is in [`crate::cache`], rate limiting in
//! [`crate::security`].

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::router::{IntoHandler, Router};
use crate::{Request, Response, StatusCode, context::Context};

pub mod etag;
pub mod pagination;
pub mod timing;

pub use etag::EtagMiddleware;
pub use pagination::PaginationMiddleware;
pub use timing::ResponseTimeMiddleware;

/// The boxed future every middleware returns.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in a [`Pipeline`] is stored as a `MiddlewareHandler`; the
/// [`Arc`] makes advancing a [`Next`] cursor a pointer copy.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Arguments
///
/// - `middleware`: a shared [`Middleware`] to wrap.
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward a
/// request at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    ///
    /// # Arguments
    ///
    /// - `middlewares`: the frozen stack, endpoint last.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without any layer producing a response, a
    /// `500 Internal Server Error` is returned.
    ///
    /// # Arguments
    ///
    /// - `ctx`: the per-request [`Context`] handed to the next layer.
    ///
    /// # Returns
    ///
    /// The [`Response`] produced by the rest of the chain.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// Middleware is shared across Tokio tasks, so implementations clone whatever
/// state they need into the returned future and never hold a lock across an
/// `.await`.
///
/// # Examples
///
/// ```rust,no_run
/// use tridivya_edge::{context::Context, middleware::{Middleware, Next, ResponseFuture}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    ///
    /// # Arguments
    ///
    /// - `ctx`: the per-request [`Context`]: request, path params and
    ///   anything upstream layers attached.
    /// - `next`: cursor into the rest of the chain; call [`Next::run`] to
    ///   forward the request.
    ///
    /// # Returns
    ///
    /// A boxed future resolving to the [`Response`] this layer wants its
    /// caller to see.
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// An ordered middleware stack terminated by an endpoint.
///
/// Middleware added first runs first on the way in and last on the way out.
///
/// # Examples
///
/// ```rust,no_run
/// use tridivya_edge::{Context, Response, Router, StatusCode};
/// use tridivya_edge::middleware::{Pipeline, LoggerMiddleware, ResponseTimeMiddleware};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok) });
///
/// let pipeline = Pipeline::new()
///     .with(ResponseTimeMiddleware)
///     .with(LoggerMiddleware)
///     .router(router);
/// ```
#[derive(Default)]
pub struct Pipeline {
    stack: Vec<MiddlewareHandler>,
}

/// A [`Pipeline`] whose endpoint has been attached. Cheap to share.
pub struct Service {
    stack: Arc<[MiddlewareHandler]>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the stack.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.stack.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Appends an already shared middleware, e.g. one whose store is also
    /// referenced elsewhere.
    #[must_use]
    pub fn with_shared<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.stack.push(from_middleware(middleware));
        self
    }

    /// Number of middleware layers (not counting the endpoint).
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Terminates the stack with `handler` and freezes it.
    ///
    /// # Arguments
    ///
    /// - `handler`: any async `Fn(Context) -> Response`, run after every
    ///   middleware that did not short-circuit.
    ///
    /// # Returns
    ///
    /// A shareable [`Service`] ready for [`Server::serve`](crate::Server::serve).
    pub fn endpoint(mut self, handler: impl IntoHandler) -> Arc<Service> {
        self.stack
            .push(Arc::new(move |ctx: Context, _next: Next| handler.call(ctx)));
        Arc::new(Service {
            stack: self.stack.into(),
        })
    }

    /// Terminates the stack with a [`Router`].
    pub fn router(self, router: Router) -> Arc<Service> {
        let router = Arc::new(router);
        self.endpoint(move |ctx: Context| {
            let router = Arc::clone(&router);
            async move { router.dispatch(ctx).await }
        })
    }
}

impl Service {
    /// Runs `request` through the whole stack.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.stack))
            .run(Context::new(request))
            .await
    }
}

/// Middleware that only runs its inner layer for matching requests.
///
/// Requests that fail the predicate skip straight to the next layer.
pub struct When<M> {
    predicate: Arc<dyn Fn(&Request) -> bool + Send + Sync>,
    inner: M,
}

/// Wraps `middleware` so it only applies to requests accepted by `predicate`.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tridivya_edge::cache::{CacheInvalidation, ResponseCache};
/// use tridivya_edge::middleware::{Pipeline, when};
///
/// let cache = Arc::new(ResponseCache::default());
/// let pipeline = Pipeline::new().with(when(
///     |req| !req.method().is_safe(),
///     CacheInvalidation::new(Arc::clone(&cache)),
/// ));
/// ```
pub fn when<P, M>(predicate: P, middleware: M) -> When<M>
where
    P: Fn(&Request) -> bool + Send + Sync + 'static,
    M: Middleware,
{
    When {
        predicate: Arc::new(predicate),
        inner: middleware,
    }
}

impl<M: Middleware> Middleware for When<M> {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        if (self.predicate)(ctx.request()) {
            self.inner.handle(ctx, next)
        } else {
            Box::pin(next.run(ctx))
        }
    }
}

/// Middleware applying a pure function to every downstream response.
pub struct MapResponse {
    f: Arc<dyn Fn(Response) -> Response + Send + Sync>,
}

/// Lifts `f` into middleware.
pub fn map_response<F>(f: F) -> MapResponse
where
    F: Fn(Response) -> Response + Send + Sync + 'static,
{
    MapResponse { f: Arc::new(f) }
}

impl Middleware for MapResponse {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let f = Arc::clone(&self.f);
        Box::pin(async move { f(next.run(ctx).await) })
    }
}

/// Logs each request's method, target, status, and duration.
///
/// Emits one `tracing::info!` event after the downstream handler completes.
/// Never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let target = ctx.request().target();

            let response = next.run(ctx).await;

            tracing::info!(
                method = %method,
                target = %target,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );

            response
        })
    }
}
