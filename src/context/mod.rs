//! Per-request context threaded through the middleware chain.
//!
//! A [`Context`] owns the [`Request`] plus everything middleware derives from
//! it on the way in: path parameters from the router and [`Pagination`] from
//! the query string. Derived values are typed fields set through consuming
//! builders, so a handler can see exactly what upstream middleware attached.

use std::collections::HashMap;

mod pagination;

pub use pagination::{DEFAULT_LIMIT, MAX_LIMIT, Pagination};

use crate::Request;

/// Path parameters extracted from the matched route.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: PathParams,
    pagination: Option<Pagination>,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
            pagination: None,
        }
    }

    /// Replaces the path parameters (set by the router on a match).
    #[must_use]
    pub fn with_params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    /// Attaches derived pagination.
    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Pagination attached by upstream middleware, if any ran.
    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    /// Pagination attached upstream, or derived from the query on the spot.
    pub fn pagination_or_derive(&self) -> Pagination {
        self.pagination
            .unwrap_or_else(|| Pagination::from_request(&self.request))
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(raw: &str) -> Context {
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[test]
    fn pagination_is_absent_until_attached() {
        let c = ctx("GET /api/meditations?page=3 HTTP/1.1\r\n\r\n");
        assert!(c.pagination().is_none());
        assert_eq!(c.pagination_or_derive().page(), 3);

        let c = c.with_pagination(Pagination::default());
        assert_eq!(c.pagination(), Some(Pagination::default()));
    }

    #[test]
    fn params_are_replaced_by_router() {
        let mut params = PathParams::new();
        params.insert("id".into(), "42".into());
        let c = ctx("GET /api/yoga/42 HTTP/1.1\r\n\r\n").with_params(params);
        assert_eq!(c.params().get("id"), Some("42"));
        assert_eq!(c.params().len(), 1);
    }

    #[test]
    fn json_body_deserializes() {
        #[derive(serde::Deserialize)]
        struct Booking {
            class_id: u32,
        }
        let c = ctx("POST /api/bookings HTTP/1.1\r\nContent-Length: 14\r\n\r\n{\"class_id\":9}");
        let booking: Booking = c.json().unwrap();
        assert_eq!(booking.class_id, 9);
    }
}
