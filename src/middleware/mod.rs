//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns. The response cache, CORS policy, and permission guard all mount here;
//! there is no monkey-patching of the send path — interception happens at an
//! explicit before/after seam.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`] — an ordered stack of middleware plus a terminal handler,
//!   dispatching one request end to end.
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware (or returns a fallback `500` response when the chain is exhausted
/// without any middleware generating a response).
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use leadify::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. If no handler remains (i.e. the chain is
    /// exhausted without producing a response), a `500 Internal Server Error`
    /// response is returned as a safe fallback.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all leadify middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`
///   (the permission guard's `403`, the cache's replay of a stored response).
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   a modified copy (CORS header injection).
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use leadify::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack with a terminal handler, dispatching one
/// request end to end.
///
/// Middleware run in the order they were added with [`with`](Self::with); the
/// terminal handler (usually a [`Router`]) runs last. `Pipeline` is cheap to
/// clone — the stack holds `Arc`s — so it can be captured by the per-connection
/// closure handed to [`Server::run`](crate::Server::run).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use leadify::{Response, Router, StatusCode};
/// use leadify::middleware::{LoggerMiddleware, Pipeline};
///
/// let mut router = Router::new();
/// router.get("/leads", |_ctx| async { Response::new(StatusCode::Ok).body("[]") });
///
/// let pipeline = Pipeline::new()
///     .with(Arc::new(LoggerMiddleware))
///     .router(router);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stack: Vec<MiddlewareHandler>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Appends a middleware to the end of the stack.
    #[must_use]
    pub fn with<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.stack.push(from_middleware(middleware));
        self
    }

    /// Appends a terminal handler function. Anything added after it is
    /// unreachable, since the terminal never calls `next`.
    #[must_use]
    pub fn terminal<H, F>(mut self, handler: H) -> Self
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.stack.push(Arc::new(move |ctx: Context, _next: Next| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(ctx).await })
        }));
        self
    }

    /// Appends a [`Router`] as the terminal handler.
    #[must_use]
    pub fn router(self, router: Router) -> Self {
        let router = Arc::new(router);
        self.terminal(move |ctx| {
            let router = Arc::clone(&router);
            async move { router.dispatch(ctx).await }
        })
    }

    /// Runs `ctx` through the middleware stack and returns the response.
    pub async fn run(&self, ctx: Context) -> Response {
        Next::new(self.stack.clone()).run(ctx).await
    }

    /// Builds a fresh [`Context`] for `request` and runs it through the stack.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.run(Context::new(request)).await
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes,
/// in the format:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// `LoggerMiddleware` does not short-circuit; it always delegates to the next
/// middleware and decorates the response timing after the fact.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!("{} {} - {} ({:?})", method, path, status, duration);

            response
        })
    }
}
