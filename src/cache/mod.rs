//! Caching layer: bounded in-memory store for JSON read responses.
//!
//! [`ResponseCache`] maps a request key (`METHOD:target`) to a cached payload
//! with an absolute expiry. It is owned by whoever builds the pipeline and
//! shared by `Arc` with [`CacheMiddleware`], [`CacheInvalidation`] and the
//! background [`Sweeper`](crate::background::Sweeper).
//!
//! The store is bounded: once `capacity` keys are held, an insert first drops
//! expired entries and then, if needed, the entry closest to expiry.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::background::Sweep;
use crate::{Request, Response, StatusCode};

mod middleware;

pub use middleware::{CACHE_STATUS_HEADER, CacheInvalidation, CacheMiddleware, InvalidationScope};

/// Builds the cache key for a request: method plus the full target, so
/// `/api/yoga?page=2` and `/api/yoga?page=3` are cached separately.
///
/// ```
/// use tridivya_edge::{Request, cache::cache_key};
///
/// let (req, _) = Request::parse(b"GET /api/yoga?page=2 HTTP/1.1\r\n\r\n").unwrap();
/// assert_eq!(cache_key(&req), "GET:/api/yoga?page=2");
/// ```
pub fn cache_key(request: &Request) -> String {
    format!("{}:{}", request.method(), request.target())
}

/// A stored response body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    content_type: Option<String>,
    payload: Bytes,
}

impl CachedResponse {
    pub fn new(content_type: Option<String>, payload: Bytes) -> Self {
        Self {
            content_type,
            payload,
        }
    }

    /// Snapshots the body of a downstream response.
    pub fn from_response(response: &Response) -> Self {
        Self {
            content_type: response.content_type().map(str::to_owned),
            payload: response.payload().clone(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Rebuilds a `200 OK` response from the stored body.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(StatusCode::Ok).body_bytes(self.payload.clone());
        if let Some(ct) = &self.content_type {
            response.set_header("Content-Type", ct.as_str());
        }
        response
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Bounded, TTL-based response store.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// TTL used by [`Default`].
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Key limit used by [`Default`] and [`new`](Self::new).
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Longest TTL honoured; larger values are clamped to it.
    pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    /// Creates a cache holding at most `capacity` keys.
    ///
    /// # Arguments
    ///
    /// - `ttl`: How long an inserted entry stays live, clamped to
    ///   [`MAX_TTL`](Self::MAX_TTL).
    /// - `capacity`: Most keys held at once (minimum 1).
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: ttl.min(Self::MAX_TTL),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Looks up a cached response.
    ///
    /// # Arguments
    ///
    /// - `key`: The cache key, usually built with [`cache_key`].
    ///
    /// # Returns
    ///
    /// A copy of the live entry, or `None`. An expired entry reads as absent
    /// and is dropped on the spot.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.response.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Stores `response` under `key` until `now + ttl`, replacing any
    /// previous entry.
    ///
    /// # Arguments
    ///
    /// - `key`: The cache key, usually built with [`cache_key`].
    /// - `response`: The body and content type to replay on a hit.
    ///
    /// When the store is full and `key` is new, expired entries are purged
    /// first; if that frees nothing, the entry closest to expiry is evicted.
    pub fn insert(&self, key: impl Into<String>, response: CachedResponse) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.is_live(now));
            if entries.len() >= self.capacity {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(evicted) = soonest {
                    entries.remove(&evicted);
                    tracing::debug!(key = %evicted, "response cache full, evicted entry");
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: now.checked_add(self.ttl).unwrap_or(now),
            },
        );
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Drops entries whose request path starts with `prefix`, for any method.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| {
            let target = key.split_once(':').map_or(key.as_str(), |(_, t)| t);
            !target.starts_with(prefix)
        });
        before - entries.len()
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl Sweep for ResponseCache {
    fn name(&self) -> &'static str {
        "response_cache"
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &'static str) -> CachedResponse {
        CachedResponse::new(Some("application/json".into()), Bytes::from_static(text.as_bytes()))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(1));
        cache.insert("GET:/api/yoga", body("[1]"));
        assert_eq!(cache.get("GET:/api/yoga"), Some(body("[1]")));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("GET:/api/yoga"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_overwrites_and_refreshes_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(10));
        cache.insert("k", body("1"));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("k", body("2"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k"), Some(body("2")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_is_never_exceeded() {
        let cache = ResponseCache::with_capacity(Duration::from_secs(60), 3);
        for i in 0..3 {
            cache.insert(format!("GET:/{i}"), body("x"));
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        cache.insert("GET:/3", body("x"));
        assert_eq!(cache.len(), 3);
        // the oldest insert expires soonest and is the one evicted
        assert_eq!(cache.get("GET:/0"), None);
        assert!(cache.get("GET:/3").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_prefers_dropping_expired_entries() {
        let cache = ResponseCache::with_capacity(Duration::from_secs(5), 2);
        cache.insert("a", body("a"));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("b", body("b"));
        cache.insert("c", body("c"));
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_clamped_not_fatal() {
        let cache = ResponseCache::new(Duration::from_secs(u64::MAX));
        assert_eq!(cache.ttl(), ResponseCache::MAX_TTL);

        cache.insert("GET:/api/yoga", body("[1]"));
        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(cache.get("GET:/api/yoga"), Some(body("[1]")));
    }

    #[test]
    fn clear_and_prefix_invalidation() {
        let cache = ResponseCache::default();
        cache.insert("GET:/api/yoga?page=1", body("1"));
        cache.insert("GET:/api/yoga/3", body("2"));
        cache.insert("GET:/api/mantras", body("3"));

        assert_eq!(cache.invalidate_prefix("/api/yoga"), 2);
        assert!(cache.get("GET:/api/mantras").is_some());

        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_purges_only_expired() {
        let cache = ResponseCache::new(Duration::from_secs(2));
        cache.insert("old", body("o"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("new", body("n"));
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cached_response_rebuilds_ok_json() {
        let res = body(r#"{"ok":true}"#).to_response();
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(res.is_json());
        assert_eq!(res.payload().as_ref(), br#"{"ok":true}"#);
    }
}
