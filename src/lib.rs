//! # tridivya-edge
//!
//! The HTTP edge of the Tridivya wellness API: an async HTTP/1.1 server plus
//! the middleware every public route goes through.
//!
//! - response timing (`X-Response-Time`)
//! - pagination derived from `?page=` / `?limit=`
//! - content-hash ETags with `304 Not Modified`
//! - a TTL response cache for JSON reads, cleared on writes
//! - a per-client sliding-window rate limiter
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tridivya_edge::cache::{CacheMiddleware, ResponseCache};
//! use tridivya_edge::middleware::{EtagMiddleware, PaginationMiddleware, Pipeline, ResponseTimeMiddleware};
//! use tridivya_edge::security::{RateLimitMiddleware, RateLimiter};
//! use tridivya_edge::{Context, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/api/yoga", |ctx: Context| async move {
//!         let page = ctx.pagination_or_derive();
//!         Response::new(StatusCode::Ok)
//!             .json(&serde_json::json!({ "page": page.page(), "items": [] }))
//!             .unwrap_or_else(|_| Response::new(StatusCode::InternalServerError))
//!     });
//!
//!     let service = Pipeline::new()
//!         .with(ResponseTimeMiddleware)
//!         .with(RateLimitMiddleware::new(Arc::new(RateLimiter::default())))
//!         .with(PaginationMiddleware)
//!         .with(EtagMiddleware)
//!         .with(CacheMiddleware::new(Arc::new(ResponseCache::default())))
//!         .router(router);
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(service).await?;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

pub use config::{ConfigError, EdgeConfig};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
