//! # leadify
//!
//! The async HTTP service core for the Leadify CRM backend.
//!
//! Two subsystems carry the business weight and everything else exists to
//! serve them:
//!
//! - [`cache`] — a process-wide response cache with per-entry TTL and a
//!   background sweep, mounted as middleware so repeated `GET` reads
//!   short-circuit before reaching a handler.
//! - [`security`] — a session-scoped permission resolver (role → permission
//!   set, with the `"all"` sentinel) plus the route guard and CORS policy
//!   built on top of it.
//!
//! The rest is the plumbing those two need: HTTP/1.1 types and parsing,
//! a Tokio accept loop, a middleware pipeline, and a router.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leadify::{Response, Router, Server, StatusCode};
//! use leadify::cache::{CacheMiddleware, ResponseCache};
//! use leadify::middleware::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(ResponseCache::new());
//!
//!     let mut router = Router::new();
//!     router.get("/leads", |_ctx| async {
//!         Response::new(StatusCode::Ok).body(r#"[{"id":1,"name":"Acme Corp"}]"#)
//!     });
//!
//!     let pipeline = Pipeline::new()
//!         .with(Arc::new(CacheMiddleware::new(Arc::clone(&cache))))
//!         .router(router);
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let pipeline = pipeline.clone();
//!         async move { pipeline.dispatch(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheMiddleware, ResponseCache};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use security::{PermissionResolver, PermissionSet};
pub use server::{Server, ServerError};
