//! Abuse protection for the public API.
//!
//! Currently implemented:
//!
//! - [`RateLimitMiddleware`]: per-client sliding-window limit backed by a
//!   shared [`RateLimiter`], answering `429 Too Many Requests` once a client's
//!   budget for the trailing minute is spent.
//!
//! Authentication and sessions are handled by the platform services behind
//! this layer.

mod rate_limit;

pub use rate_limit::{Decision, RateLimitMiddleware, RateLimiter, UNKNOWN_CLIENT, client_id};
