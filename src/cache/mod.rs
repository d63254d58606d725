//! In-memory response cache with a fixed time-to-live.
//!
//! Entries are keyed by [`CacheKey`] (method, path and query string) and hold
//! a [`CachedResponse`]. Expired entries are removed lazily, the next time
//! their key is looked up.
//!
//! The table is a [`DashMap`], so lookups and stores from concurrent requests
//! never block each other for long. Two concurrent misses on one key both go
//! upstream and both store; the later store wins.
//!
//! Time is read from [`tokio::time::Instant`], which follows Tokio's paused
//! test clock.

mod middleware;

pub use middleware::CacheMiddleware;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::http::{Headers, Method, Request, Response, StatusCode};

/// Identity of a cacheable request: method, path and raw query string.
///
/// Request headers and body are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, path: &str, query: Option<&str>) -> Self {
        match query {
            Some(query) => Self(format!("{method} {path}?{query}")),
            None => Self(format!("{method} {path}")),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self::new(request.method(), request.path(), request.query_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A captured response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn capture(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body_ref().clone(),
        }
    }

    pub fn to_response(&self) -> Response {
        Response::from_parts(self.status, self.headers.clone(), self.body.clone())
    }
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Thread-safe response cache with a single TTL for every entry.
pub struct ResponseCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live entry for `key`, evicting it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.response.clone()),
            Some(_) => {}
            None => return None,
        }

        // Re-check under the write lock: another task may have refreshed it.
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Stores `response` under `key` if its status is `200 OK`.
    ///
    /// Returns `true` when the response was stored.
    pub fn insert(&self, key: CacheKey, response: CachedResponse) -> bool {
        if response.status != StatusCode::OK {
            return false;
        }
        let entry = Entry {
            response,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key, entry);
        true
    }

    /// Number of stored entries, expired ones included until they are looked up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    fn ok(body: &'static str) -> CachedResponse {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");
        CachedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn key(path: &str) -> CacheKey {
        CacheKey::new(&Method::Get, path, None)
    }

    #[test]
    fn key_includes_method_path_and_query() {
        let with_query = CacheKey::new(&Method::Get, "/api/properties/listings", Some("page=2"));
        assert_eq!(with_query.as_str(), "GET /api/properties/listings?page=2");
        assert_ne!(with_query, CacheKey::new(&Method::Get, "/api/properties/listings", None));
        assert_ne!(
            CacheKey::new(&Method::Get, "/a", None),
            CacheKey::new(&Method::Head, "/a", None)
        );
    }

    #[test]
    fn key_ignores_headers() {
        let a = Request::parse(b"GET /x?y=1 HTTP/1.1\r\nAuthorization: one\r\n\r\n").unwrap().0;
        let b = Request::parse(b"GET /x?y=1 HTTP/1.1\r\nAuthorization: two\r\n\r\n").unwrap().0;
        assert_eq!(CacheKey::from_request(&a), CacheKey::from_request(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl() {
        let cache = ResponseCache::new(TTL);
        assert!(cache.insert(key("/a"), ok("[1]")));

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("/a")), Some(ok("[1]")));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_on_lookup() {
        let cache = ResponseCache::new(TTL);
        cache.insert(key("/a"), ok("[1]"));

        tokio::time::advance(TTL).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("/a")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn non_200_is_not_stored() {
        let cache = ResponseCache::new(TTL);
        for code in [201, 204, 301, 404, 500, 502] {
            let mut res = ok("");
            res.status = StatusCode::from_u16(code).unwrap();
            assert!(!cache.insert(key("/a"), res));
        }
        assert!(cache.is_empty());
        assert!(cache.get(&key("/a")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_restarts_ttl_last_write_wins() {
        let cache = ResponseCache::new(TTL);
        cache.insert(key("/a"), ok("old"));
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.insert(key("/a"), ok("new"));
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(cache.get(&key("/a")), Some(ok("new")));
    }

    #[test]
    fn capture_round_trips_response_parts() {
        let response = Response::new(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body("{\"id\":1}");
        let captured = CachedResponse::capture(&response);
        let replayed = captured.to_response();
        assert_eq!(replayed.status(), StatusCode::OK);
        assert_eq!(replayed.headers(), response.headers());
        assert_eq!(replayed.body_ref(), response.body_ref());
    }
}
