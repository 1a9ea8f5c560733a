//! Cache short-circuiting and invalidation middleware.

use std::sync::Arc;

use super::{CachedResponse, ResponseCache, cache_key};
use crate::Method;
use crate::context::Context;
use crate::middleware::{Middleware, Next, ResponseFuture};

/// Header reporting whether a GET was served from the cache (`HIT`) or not (`MISS`).
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

/// Serves GET requests from a [`ResponseCache`].
///
/// On a live hit the downstream handler is skipped entirely and the stored
/// payload is returned with `200 OK`. On a miss the handler runs and, if it
/// produced a successful JSON response, that payload is stored for the
/// cache's TTL. Other methods pass straight through.
///
/// # Examples
///
/// ```rust,no_run
/// use std::{sync::Arc, time::Duration};
/// use tridivya_edge::cache::{CacheMiddleware, ResponseCache};
///
/// let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
/// let layer = CacheMiddleware::new(Arc::clone(&cache));
/// ```
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
}

impl CacheMiddleware {
    /// Serves GET requests from `cache`.
    ///
    /// # Arguments
    ///
    /// - `cache`: the store to read hits from and write misses to, shared
    ///   with [`CacheInvalidation`] and the sweeper.
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        if ctx.request().method() != &Method::Get {
            return Box::pin(next.run(ctx));
        }

        let key = cache_key(ctx.request());
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "response cache hit");
            let mut response = hit.to_response();
            response.set_header(CACHE_STATUS_HEADER, "HIT");
            return Box::pin(async move { response });
        }

        let cache = Arc::clone(&self.cache);
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if response.status().is_success() && response.is_json() {
                tracing::debug!(key = %key, ttl = ?cache.ttl(), "response cached");
                cache.insert(key, CachedResponse::from_response(&response));
            }
            response.set_header(CACHE_STATUS_HEADER, "MISS");
            response
        })
    }
}

/// Which cached keys an invalidation drops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Clear the whole store.
    #[default]
    All,
    /// Clear only keys whose request path starts with the prefix.
    Prefix(String),
}

/// Invalidates the [`ResponseCache`] after the downstream handler completes.
///
/// The hook itself is unconditional: every request passing through it
/// invalidates, whatever the outcome. Mount it on mutating routes, or wrap
/// it in [`when`](crate::middleware::when) to restrict it to writes.
pub struct CacheInvalidation {
    cache: Arc<ResponseCache>,
    scope: InvalidationScope,
}

impl CacheInvalidation {
    /// Invalidation that clears the whole store.
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            scope: InvalidationScope::All,
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: InvalidationScope) -> Self {
        self.scope = scope;
        self
    }
}

impl Middleware for CacheInvalidation {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let cache = Arc::clone(&self.cache);
        let scope = self.scope.clone();
        Box::pin(async move {
            let method = ctx.request().method().clone();
            let response = next.run(ctx).await;
            let removed = match &scope {
                InvalidationScope::All => cache.clear(),
                InvalidationScope::Prefix(prefix) => cache.invalidate_prefix(prefix),
            };
            tracing::debug!(method = %method, ?scope, removed, "response cache invalidated");
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::middleware::{Pipeline, Service, when};
    use crate::{Request, Response, StatusCode};

    fn request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    // Endpoint returning a JSON body that changes on every call.
    fn counting_service(cache: Arc<ResponseCache>, calls: Arc<AtomicUsize>) -> Arc<Service> {
        Pipeline::new()
            .with(when(
                |req| !req.method().is_safe(),
                CacheInvalidation::new(Arc::clone(&cache)),
            ))
            .with(CacheMiddleware::new(cache))
            .endpoint(move |_ctx: Context| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    Response::new(StatusCode::Ok)
                        .json(&serde_json::json!({ "call": n }))
                        .unwrap()
                }
            })
    }

    #[tokio::test(start_paused = true)]
    async fn hit_skips_handler_until_ttl_expires() {
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(1)));
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = counting_service(cache, Arc::clone(&calls));

        let first = svc.handle(request("GET", "/api/yoga")).await;
        assert_eq!(first.headers().get(CACHE_STATUS_HEADER), Some("MISS"));

        let second = svc.handle(request("GET", "/api/yoga")).await;
        assert_eq!(second.headers().get(CACHE_STATUS_HEADER), Some("HIT"));
        assert_eq!(second.payload(), first.payload());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1100)).await;
        let third = svc.handle(request("GET", "/api/yoga")).await;
        assert_eq!(third.headers().get(CACHE_STATUS_HEADER), Some("MISS"));
        assert_ne!(third.payload(), first.payload());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_string_is_part_of_the_key() {
        let cache = Arc::new(ResponseCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = counting_service(Arc::clone(&cache), Arc::clone(&calls));

        svc.handle(request("GET", "/api/yoga?page=1")).await;
        svc.handle(request("GET", "/api/yoga?page=2")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn write_invalidates_everything() {
        let cache = Arc::new(ResponseCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = counting_service(Arc::clone(&cache), Arc::clone(&calls));

        svc.handle(request("GET", "/api/yoga")).await;
        svc.handle(request("GET", "/api/mantras")).await;
        assert_eq!(cache.len(), 2);

        // POST is not cached but runs the invalidation hook
        svc.handle(request("POST", "/api/bookings")).await;
        assert!(cache.is_empty());

        let again = svc.handle(request("GET", "/api/yoga")).await;
        assert_eq!(again.headers().get(CACHE_STATUS_HEADER), Some("MISS"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn prefix_scope_keeps_unrelated_entries() {
        let cache = Arc::new(ResponseCache::default());
        let svc = Pipeline::new()
            .with(
                CacheInvalidation::new(Arc::clone(&cache))
                    .scope(InvalidationScope::Prefix("/api/yoga".into())),
            )
            .endpoint(|_ctx: Context| async { Response::new(StatusCode::NoContent) });

        cache.insert("GET:/api/yoga/1", CachedResponse::new(None, "a".into()));
        cache.insert("GET:/api/mantras", CachedResponse::new(None, "b".into()));
        svc.handle(request("PUT", "/api/yoga/1")).await;

        assert!(cache.get("GET:/api/yoga/1").is_none());
        assert!(cache.get("GET:/api/mantras").is_some());
    }

    #[tokio::test]
    async fn failures_and_plain_bodies_are_not_cached() {
        let cache = Arc::new(ResponseCache::default());
        let svc = Pipeline::new()
            .with(CacheMiddleware::new(Arc::clone(&cache)))
            .endpoint(|ctx: Context| async move {
                match ctx.request().path() {
                    "/text" => Response::new(StatusCode::Ok).body("hello"),
                    _ => Response::new(StatusCode::InternalServerError)
                        .json(&serde_json::json!({ "success": false }))
                        .unwrap(),
                }
            });

        let res = svc.handle(request("GET", "/boom")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        svc.handle(request("GET", "/text")).await;
        assert!(cache.is_empty());
    }
}
