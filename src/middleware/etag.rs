//! Content fingerprints and `If-None-Match` short-circuiting.
//!
//! The ETag is a SHA-256 digest of the serialized JSON body, so two responses
//! with byte-identical payloads always carry the same tag. A client that
//! resends the tag in `If-None-Match` gets `304 Not Modified` with no body.

use sha2::{Digest, Sha256};

use super::{Middleware, Next, ResponseFuture};
use crate::context::Context;
use crate::{Response, StatusCode};

/// Computes the quoted strong ETag for a serialized payload.
///
/// ```
/// use tridivya_edge::middleware::etag::compute_etag;
///
/// let a = compute_etag(br#"{"asana":"tadasana"}"#);
/// assert_eq!(a, compute_etag(br#"{"asana":"tadasana"}"#));
/// assert_ne!(a, compute_etag(br#"{"asana":"vrksasana"}"#));
/// assert!(a.starts_with('"') && a.ends_with('"'));
/// ```
pub fn compute_etag(payload: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(payload)))
}

/// Returns `true` when an `If-None-Match` header value matches `etag`.
///
/// Accepts `*`, a single tag, or a comma-separated list. Comparison is weak
/// (a `W/` prefix on either side is ignored), as RFC 9110 §13.1.2 requires
/// for `If-None-Match`.
///
/// # Arguments
///
/// - `header`: the raw `If-None-Match` value sent by the client.
/// - `etag`: the quoted tag of the current representation.
pub fn if_none_match(header: &str, etag: &str) -> bool {
    let header = header.trim();
    if header == "*" {
        return true;
    }
    let etag = strip_weak(etag);
    header
        .split(',')
        .map(|candidate| strip_weak(candidate.trim()))
        .any(|candidate| candidate == etag)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Fingerprints successful JSON responses to safe requests and answers
/// matching conditional requests with `304 Not Modified`.
///
/// Write requests, non-2xx responses and non-JSON bodies pass through
/// untouched.
pub struct EtagMiddleware;

impl Middleware for EtagMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        if !ctx.request().method().is_safe() {
            return Box::pin(next.run(ctx));
        }

        let conditional = ctx
            .request()
            .headers()
            .get("if-none-match")
            .map(str::to_owned);

        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if !response.status().is_success() || !response.is_json() {
                return response;
            }

            let etag = compute_etag(response.payload());

            if conditional.is_some_and(|header| if_none_match(&header, &etag)) {
                tracing::debug!(etag = %etag, "conditional request matched");
                return not_modified(&response, etag);
            }

            response.set_header("ETag", etag);
            response
        })
    }
}

// 304 carrying the downstream headers minus those describing the dropped body.
fn not_modified(original: &Response, etag: String) -> Response {
    let mut response = Response::new(StatusCode::NotModified);
    for (name, value) in original.headers().iter() {
        if !name.eq_ignore_ascii_case("content-type") && !name.eq_ignore_ascii_case("etag") {
            response.add_header(name, value);
        }
    }
    response.set_header("ETag", etag);
    response
}
