//! Page/limit/skip derivation from query parameters.

use serde::Serialize;

use crate::Request;

/// Page size used when `limit` is absent or unparseable.
pub const DEFAULT_LIMIT: u32 = 20;

/// Largest page size a client may ask for.
pub const MAX_LIMIT: u32 = 100;

/// Normalized pagination parameters for list endpoints.
///
/// Always satisfies `page >= 1`, `1 <= limit <= 100` and
/// `skip == (page - 1) * limit`. Malformed input never fails; it falls back
/// to the defaults.
///
/// # Examples
///
/// ```
/// use tridivya_edge::context::Pagination;
///
/// let p = Pagination::from_query(Some("3"), Some("500"));
/// assert_eq!((p.page(), p.limit(), p.skip()), (3, 100, 200));
///
/// let p = Pagination::from_query(Some("zero"), None);
/// assert_eq!(p, Pagination::default());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    page: u32,
    limit: u32,
    skip: u64,
}

impl Pagination {
    /// Derives pagination from the raw `page` and `limit` query values.
    ///
    /// # Arguments
    ///
    /// - `page`: raw `page` value; missing, non-numeric or `< 1` means 1.
    /// - `limit`: raw `limit` value; missing or non-numeric means
    ///   [`DEFAULT_LIMIT`], anything else is clamped to `1..=MAX_LIMIT`.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(parse_int)
            .filter(|p| *p >= 1)
            .map_or(1, |p| p.min(i64::from(u32::MAX)) as u32);

        let limit = limit
            .and_then(parse_int)
            .map_or(DEFAULT_LIMIT, |l| l.clamp(1, i64::from(MAX_LIMIT)) as u32);

        Self {
            page,
            limit,
            skip: u64::from(page - 1) * u64::from(limit),
        }
    }

    /// Derives pagination from the request's `page` and `limit` query parameters.
    pub fn from_request(request: &Request) -> Self {
        Self::from_query(request.query_param("page"), request.query_param("limit"))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of records to skip before this page starts.
    pub fn skip(&self) -> u64 {
        self.skip
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            skip: 0,
        }
    }
}

// Leading-integer parse: "2", " 2 ", "-4" and "2.9" (truncated) are numbers;
// "abc" and "" are not.
fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_params_use_defaults() {
        let p = Pagination::from_query(None, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.skip(), 0);
    }

    #[test]
    fn page_zero_negative_or_garbage_clamps_to_one() {
        for raw in ["0", "-3", "abc", "", "NaN"] {
            assert_eq!(Pagination::from_query(Some(raw), None).page(), 1, "page={raw}");
        }
    }

    #[test]
    fn limit_is_clamped_to_range() {
        assert_eq!(Pagination::from_query(None, Some("500")).limit(), 100);
        assert_eq!(Pagination::from_query(None, Some("0")).limit(), 1);
        assert_eq!(Pagination::from_query(None, Some("-10")).limit(), 1);
        assert_eq!(Pagination::from_query(None, Some("many")).limit(), 20);
    }

    #[test]
    fn skip_follows_page_and_limit() {
        let p = Pagination::from_query(Some("4"), Some("25"));
        assert_eq!(p.skip(), 75);
        let p = Pagination::from_query(Some("2.7"), Some("10"));
        assert_eq!((p.page(), p.skip()), (2, 10));
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let p = Pagination::from_query(Some("99999999999999"), Some("100"));
        assert_eq!(p.page(), u32::MAX);
        assert_eq!(p.skip(), u64::from(u32::MAX - 1) * 100);
    }

    #[test]
    fn reads_from_request_query() {
        let raw = b"GET /api/yoga?page=2&limit=5 HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let p = Pagination::from_request(&req);
        assert_eq!((p.page(), p.limit(), p.skip()), (2, 5, 5));
    }

    #[test]
    fn escaped_query_values_are_understood() {
        let raw = b"GET /api/yoga?page=%32&limit=%31%30 HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let p = Pagination::from_request(&req);
        assert_eq!((p.page(), p.limit(), p.skip()), (2, 10, 10));
    }
}
