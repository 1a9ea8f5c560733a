//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/api/yoga`          | `/api/yoga`                | *(none)*                        |
//! | `/api/yoga/:id`      | `/api/yoga/42`             | `id → "42"`                     |
//! | `/media/*`           | `/media/audio/om.mp3`      | `wildcard → "/audio/om.mp3"`    |
//!
//! Trailing slashes are normalized on both patterns and paths. Routes are
//! tried in registration order and the first match wins; when none matches
//! the router answers `404 Not Found`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler turning a [`Context`] into a [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response> + Send`
/// that is `Send + Sync + 'static`, so routes and pipeline endpoints accept
/// plain async closures.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    // `/*` suffix → wildcard, any `:` → parameterized, otherwise exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust,no_run
/// use tridivya_edge::{Context, Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/api/yoga/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Register a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches a context that already went through upstream middleware.
    ///
    /// Path parameters from the matching route are attached to `ctx`; every
    /// other field (pagination, for one) is kept.
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let request = ctx.request();
        let matched = self
            .routes
            .iter()
            .find_map(|route| Some((route, route.matches(request.method(), request.path())?)));

        match matched {
            Some((route, params)) => (route.handler)(ctx.with_params(params)).await,
            None => Response::new(StatusCode::NotFound),
        }
    }

    /// Dispatches a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Pagination;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn pattern_classification() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
        assert!(matches!(Pattern::parse("/api/yoga/"), Pattern::Exact(s) if s == "/api/yoga"));
        assert!(matches!(Pattern::parse("/media/*"), Pattern::Wildcard(p) if p == "/media"));
        assert!(matches!(
            Pattern::parse("/api/classes/:id/bookings/:booking"),
            Pattern::Parameterized { segments } if segments.len() == 5
        ));
    }

    #[test]
    fn exact_match_normalizes_trailing_slash() {
        let p = Pattern::parse("/api/mantras");
        assert!(p.matches("/api/mantras/").is_some());
        assert!(p.matches("/api/mantra").is_none());
    }

    #[test]
    fn parameterized_match_extracts_values() {
        let p = Pattern::parse("/api/classes/:id/bookings/:booking");
        let params = p.matches("/api/classes/7/bookings/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("booking"), Some("99"));
        assert!(p.matches("/api/classes/7/slots/99").is_none());
        assert!(p.matches("/api/classes/7").is_none());
    }

    #[test]
    fn wildcard_captures_suffix() {
        let p = Pattern::parse("/media/*");
        let params = p.matches("/media/audio/om.mp3").unwrap();
        assert_eq!(params.get("wildcard"), Some("/audio/om.mp3"));
        assert!(p.matches("/api/media").is_none());
    }

    #[tokio::test]
    async fn unmatched_request_is_404() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.get("/api/yoga", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 1);

        let res = router.route(make_request("POST", "/api/yoga")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        let res = router.route(make_request("GET", "/api/other")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/api/yoga/featured", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/api/yoga/:id", |_ctx: Context| async {
            Response::new(StatusCode::Accepted)
        });

        let res = router.route(make_request("GET", "/api/yoga/featured")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = router.route(make_request("GET", "/api/yoga/3")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
    }

    #[tokio::test]
    async fn method_variants_dispatch() {
        let mut router = Router::new();
        router.post("/r", |_ctx: Context| async { Response::new(StatusCode::Created) });
        router.put("/r", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.patch("/r", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.delete("/r", |_ctx: Context| async { Response::new(StatusCode::NoContent) });

        for (method, status) in [
            ("POST", StatusCode::Created),
            ("PUT", StatusCode::Ok),
            ("PATCH", StatusCode::Ok),
            ("DELETE", StatusCode::NoContent),
        ] {
            assert_eq!(router.route(make_request(method, "/r")).await.status(), status);
        }
    }

    #[tokio::test]
    async fn dispatch_keeps_upstream_context() {
        let mut router = Router::new();
        router.get("/api/yoga/:id", |ctx: Context| async move {
            let has_page = ctx.pagination().is_some();
            let id = ctx.params().get("id").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(format!("{id}:{has_page}"))
        });

        let ctx = Context::new(make_request("GET", "/api/yoga/5"))
            .with_pagination(Pagination::default());
        let res = router.dispatch(ctx).await;
        assert_eq!(res.payload().as_ref(), b"5:true");
    }
}
