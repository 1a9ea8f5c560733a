//! Per-client sliding-window rate limiting.
//!
//! Each client keeps the arrival times of its admitted requests over the
//! trailing 60 seconds. A request is admitted only while fewer than `limit`
//! timestamps remain in that window; rejected attempts are not recorded, so a
//! client hammering the API does not extend its own lockout.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

use crate::background::Sweep;
use crate::context::Context;
use crate::middleware::{Middleware, Next, ResponseFuture};
use crate::{Request, Response, StatusCode};

/// Bucket key shared by every request without a known peer address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Admitted and recorded; `remaining` more requests fit in the window.
    Allowed { remaining: u32 },
    /// Rejected; the oldest recorded request leaves the window after `retry_after`.
    Limited { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Sliding-window limiter keyed by client id.
///
/// All windows sit behind one lock; the prune, count and append for a request
/// happen in a single critical section, so concurrent requests from the same
/// client cannot both slip under the limit.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_clients: usize,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Length of the sliding window.
    pub const WINDOW: Duration = Duration::from_secs(60);

    pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

    pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

    /// Creates a limiter admitting `requests_per_minute` per client.
    ///
    /// # Arguments
    ///
    /// - `requests_per_minute`: requests each client may make in any rolling
    ///   60-second window.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limit: requests_per_minute,
            window: Self::WINDOW,
            max_clients: Self::DEFAULT_MAX_CLIENTS,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Caps how many clients are tracked at once (minimum 1).
    #[must_use]
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of clients currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }

    /// Admits or rejects one request from `client`, recording it if admitted.
    ///
    /// Timestamps older than the window are dropped first; the prune, count
    /// and append run under one lock acquisition.
    ///
    /// # Arguments
    ///
    /// - `client`: the bucket key, usually from [`client_id`].
    ///
    /// # Returns
    ///
    /// [`Decision::Allowed`] with the budget left after this request, or
    /// [`Decision::Limited`] with the wait until the oldest request ages out.
    /// A limited attempt is not recorded.
    pub fn check(&self, client: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        if !windows.contains_key(client) && windows.len() >= self.max_clients {
            self.make_room(&mut windows, now);
        }

        let stamps = windows.entry(client.to_owned()).or_default();
        prune(stamps, now, self.window);

        if stamps.len() >= self.limit as usize {
            let retry_after = stamps
                .front()
                .map_or(self.window, |oldest| {
                    self.window.saturating_sub(now.duration_since(*oldest))
                });
            return Decision::Limited { retry_after };
        }

        stamps.push_back(now);
        Decision::Allowed {
            remaining: self.limit - stamps.len() as u32,
        }
    }

    /// Drops clients with no requests left in the window. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before - windows.len()
    }

    // Called with the lock held when a new client would exceed `max_clients`.
    fn make_room(&self, windows: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
        windows.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        if windows.len() < self.max_clients {
            return;
        }
        let stalest = windows
            .iter()
            .min_by_key(|(_, stamps)| stamps.back().copied())
            .map(|(client, _)| client.clone());
        if let Some(client) = stalest {
            windows.remove(&client);
            tracing::debug!(client = %client, "rate limiter full, evicted client window");
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REQUESTS_PER_MINUTE)
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep(&self) -> usize {
        self.prune_idle()
    }
}

// Timestamps are appended in order, so everything stale sits at the front.
fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = stamps.front() {
        if now.duration_since(*oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

/// Derives the rate-limit bucket for a request.
///
/// Uses the peer IP, or [`UNKNOWN_CLIENT`] when the request did not come
/// from a socket. With `trust_proxy`, the first `X-Forwarded-For` hop (then
/// `X-Real-IP`) wins over the socket address.
///
/// # Arguments
///
/// - `request`: the inbound request, with its peer address attached.
/// - `trust_proxy`: whether forwarding headers may name the client.
///
/// # Returns
///
/// The client's IP as a string, or [`UNKNOWN_CLIENT`].
pub fn client_id(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .or_else(|| request.headers().get("x-real-ip"))
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_owned();
        }
    }

    request
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned())
}

#[derive(Serialize)]
struct Rejection {
    success: bool,
    message: &'static str,
}

/// Rejects clients over their per-minute budget with `429 Too Many Requests`.
///
/// The rejection body is `{"success":false,"message":"Too many requests"}`
/// and carries a `Retry-After` header in whole seconds.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    trust_proxy: bool,
}

impl RateLimitMiddleware {
    /// Wraps a shared limiter. Proxy headers are ignored until
    /// [`trust_proxy`](Self::trust_proxy) is enabled.
    ///
    /// # Arguments
    ///
    /// - `limiter`: the store of client windows, also tracked by the sweeper.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            trust_proxy: false,
        }
    }

    /// Honour `X-Forwarded-For` / `X-Real-IP` when identifying clients.
    #[must_use]
    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let client = client_id(ctx.request(), self.trust_proxy);

        match self.limiter.check(&client) {
            Decision::Allowed { .. } => Box::pin(next.run(ctx)),
            Decision::Limited { retry_after } => {
                let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                warn!(
                    client = %client,
                    path = %ctx.request().path(),
                    limit = self.limiter.limit(),
                    retry_after_secs = retry_secs,
                    "rate limit exceeded"
                );
                let response = too_many_requests(retry_secs);
                Box::pin(async move { response })
            }
        }
    }
}

fn too_many_requests(retry_secs: u64) -> Response {
    let body = Rejection {
        success: false,
        message: "Too many requests",
    };
    Response::new(StatusCode::TooManyRequests)
        .json(&body)
        .unwrap_or_else(|_| Response::new(StatusCode::TooManyRequests))
        .header("Retry-After", retry_secs.to_string())
}
