//! `X-Response-Time` stamping.

use tokio::time::Instant;

use super::{Middleware, Next, ResponseFuture};
use crate::context::Context;

/// Header carrying the handling duration.
pub const RESPONSE_TIME_HEADER: &str = "X-Response-Time";

/// Stamps every response with the time spent below this layer, in
/// milliseconds (`X-Response-Time: 12ms`).
///
/// Place it first in the [`Pipeline`](super::Pipeline) to measure the whole
/// stack. Status and body are never touched.
pub struct ResponseTimeMiddleware;

impl Middleware for ResponseTimeMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let mut response = next.run(ctx).await;
            let elapsed = start.elapsed();
            response.set_header(RESPONSE_TIME_HEADER, format!("{}ms", elapsed.as_millis()));
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::middleware::Pipeline;
    use crate::{Request, Response, StatusCode};

    fn get(target: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test(start_paused = true)]
    async fn stamps_elapsed_milliseconds() {
        let service = Pipeline::new()
            .with(ResponseTimeMiddleware)
            .endpoint(|_ctx: Context| async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Response::new(StatusCode::Ok).body("ok")
            });

        let res = service.handle(get("/api/yoga")).await;
        let stamped = res.headers().get("x-response-time").unwrap();
        let ms: u64 = stamped.strip_suffix("ms").unwrap().parse().unwrap();
        assert!((250..260).contains(&ms), "stamped {stamped}");
    }

    #[tokio::test]
    async fn leaves_status_and_body_alone() {
        let service = Pipeline::new()
            .with(ResponseTimeMiddleware)
            .endpoint(|_ctx: Context| async { Response::new(StatusCode::NotFound).body("missing") });

        let res = service.handle(get("/nope")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.payload().as_ref(), b"missing");
        assert!(res.headers().contains(RESPONSE_TIME_HEADER));
    }
}
