//! Attaches [`Pagination`] to the request context.

use super::{Middleware, Next, ResponseFuture};
use crate::context::{Context, Pagination};

/// Derives [`Pagination`] from `page`/`limit` query parameters and attaches
/// it to the [`Context`] for list handlers downstream.
///
/// Never rejects: malformed values normalize to the defaults.
pub struct PaginationMiddleware;

impl Middleware for PaginationMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let pagination = Pagination::from_request(ctx.request());
        Box::pin(next.run(ctx.with_pagination(pagination)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::{Request, Response, StatusCode};

    async fn seen(target: &str) -> serde_json::Value {
        let service = Pipeline::new()
            .with(PaginationMiddleware)
            .endpoint(|ctx: Context| async move {
                Response::new(StatusCode::Ok)
                    .json(&ctx.pagination())
                    .unwrap_or_else(|_| Response::new(StatusCode::InternalServerError))
            });
        let raw = format!("GET {target} HTTP/1.1\r\n\r\n");
        let res = service.handle(Request::parse(raw.as_bytes()).unwrap().0).await;
        serde_json::from_slice(res.payload()).unwrap()
    }

    #[tokio::test]
    async fn handler_sees_defaults() {
        assert_eq!(
            seen("/api/yoga").await,
            serde_json::json!({ "page": 1, "limit": 20, "skip": 0 })
        );
    }

    #[tokio::test]
    async fn handler_sees_clamped_values() {
        assert_eq!(
            seen("/api/yoga?page=0&limit=500").await,
            serde_json::json!({ "page": 1, "limit": 100, "skip": 0 })
        );
        assert_eq!(
            seen("/api/yoga?page=3&limit=10").await,
            serde_json::json!({ "page": 3, "limit": 10, "skip": 20 })
        );
    }
}
