//! A small Tridivya API served through the full edge stack.
//!
//! ```sh
//! RUST_LOG=tridivya_edge=debug cargo run --example tridivya_api
//! curl -i 'http://127.0.0.1:8080/api/yoga?page=1&limit=2'
//! curl -i -X POST http://127.0.0.1:8080/api/bookings -d '{"class_id":1}'
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tridivya_edge::background::Sweeper;
use tridivya_edge::cache::{CacheInvalidation, CacheMiddleware};
use tridivya_edge::context::Pagination;
use tridivya_edge::middleware::{
    EtagMiddleware, LoggerMiddleware, PaginationMiddleware, Pipeline, ResponseTimeMiddleware, when,
};
use tridivya_edge::{Context, EdgeConfig, Response, Router, Server, StatusCode};

#[derive(Serialize)]
struct Practice {
    id: u32,
    name: &'static str,
}

const POSES: &[Practice] = &[
    Practice { id: 1, name: "Tadasana" },
    Practice { id: 2, name: "Vrikshasana" },
    Practice { id: 3, name: "Bhujangasana" },
    Practice { id: 4, name: "Shavasana" },
];

const MANTRAS: &[Practice] = &[
    Practice { id: 1, name: "Gayatri" },
    Practice { id: 2, name: "Om Namah Shivaya" },
    Practice { id: 3, name: "Mahamrityunjaya" },
];

#[derive(Serialize)]
struct Page<'a, T> {
    success: bool,
    page: u32,
    limit: u32,
    total: usize,
    data: &'a [T],
}

#[derive(Deserialize)]
struct BookingRequest {
    class_id: u32,
}

fn json_or_500<T: Serialize>(status: StatusCode, body: &T) -> Response {
    Response::new(status)
        .json(body)
        .unwrap_or_else(|_| Response::new(StatusCode::InternalServerError))
}

fn paged(items: &'static [Practice], pagination: Pagination) -> Response {
    let start = usize::try_from(pagination.skip())
        .unwrap_or(usize::MAX)
        .min(items.len());
    let end = start
        .saturating_add(pagination.limit() as usize)
        .min(items.len());
    json_or_500(
        StatusCode::Ok,
        &Page {
            success: true,
            page: pagination.page(),
            limit: pagination.limit(),
            total: items.len(),
            data: &items[start..end],
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EdgeConfig::from_env()?;
    let cache = Arc::new(config.response_cache());
    let limiter = Arc::new(config.rate_limiter());

    let sweeper = Sweeper::new(config.sweep_interval())
        .track(Arc::clone(&cache))
        .track(Arc::clone(&limiter))
        .spawn();

    let mut router = Router::new();
    router.get("/api/yoga", |ctx: Context| async move {
        paged(POSES, ctx.pagination_or_derive())
    });
    router.get("/api/mantras", |ctx: Context| async move {
        paged(MANTRAS, ctx.pagination_or_derive())
    });
    router.post("/api/bookings", |ctx: Context| async move {
        match ctx.json::<BookingRequest>() {
            Ok(booking) => json_or_500(
                StatusCode::Created,
                &serde_json::json!({ "success": true, "class_id": booking.class_id }),
            ),
            Err(e) => json_or_500(
                StatusCode::BadRequest,
                &serde_json::json!({ "success": false, "message": e.to_string() }),
            ),
        }
    });

    let service = Pipeline::new()
        .with(ResponseTimeMiddleware)
        .with(LoggerMiddleware)
        .with(config.rate_limit_middleware(Arc::clone(&limiter)))
        .with(PaginationMiddleware)
        .with(EtagMiddleware)
        .with(when(
            |req| !req.method().is_safe(),
            CacheInvalidation::new(Arc::clone(&cache)),
        ))
        .with(CacheMiddleware::new(Arc::clone(&cache)))
        .router(router);

    let server = Server::bind("127.0.0.1:8080").await?;
    tokio::select! {
        result = server.serve(service) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    sweeper.shutdown().await;
    Ok(())
}
