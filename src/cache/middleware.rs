use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use super::{CacheKey, CachedResponse, ResponseCache};
use crate::{
    Method, Response,
    context::Context,
    middleware::{Middleware, Next},
};

/// Serves repeated `GET` requests from a [`ResponseCache`].
///
/// Other methods always pass through. A miss runs the rest of the chain and
/// stores the result when it is a `200`; the replayed response is the stored
/// status, headers and body, unchanged.
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
}

impl CacheMiddleware {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = Arc::clone(&self.cache);

        Box::pin(async move {
            if ctx.request().method() != &Method::Get {
                return next.run(ctx).await;
            }

            let key = CacheKey::from_request(ctx.request());
            if let Some(hit) = cache.get(&key) {
                debug!(%key, "cache hit");
                return hit.to_response();
            }

            let response = next.run(ctx).await;
            if cache.insert(key.clone(), CachedResponse::capture(&response)) {
                debug!(%key, ttl = ?cache.ttl(), "cached response");
            } else {
                debug!(%key, status = response.status().as_u16(), "response not cacheable");
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::{Request, Router, StatusCode};

    fn request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    // Router whose mount answers with `status` and counts how often it ran.
    fn counting_router(status: StatusCode, ttl: Duration) -> (Router, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cache = Arc::new(ResponseCache::new(ttl));

        let mut router = Router::new();
        router.mount_with(
            "/api/properties",
            vec![crate::middleware::from_middleware(Arc::new(CacheMiddleware::new(cache)))],
            move |_ctx: Context| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Response::new(status).body(format!("call {n}")) }
            },
        );
        (router, hits)
    }

    #[tokio::test(start_paused = true)]
    async fn second_get_is_served_from_cache_until_expiry() {
        let ttl = Duration::from_secs(300);
        let (router, hits) = counting_router(StatusCode::OK, ttl);

        let first = router.route(request("GET", "/api/properties/x?a=1")).await;
        let second = router.route(request("GET", "/api/properties/x?a=1")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(first.into_bytes(), second.into_bytes());

        tokio::time::advance(ttl).await;
        let third = router.route(request("GET", "/api/properties/x?a=1")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(&third.body_ref()[..], b"call 2");
    }

    #[tokio::test]
    async fn different_query_is_a_different_entry() {
        let (router, hits) = counting_router(StatusCode::OK, Duration::from_secs(300));
        router.route(request("GET", "/api/properties/x?a=1")).await;
        router.route(request("GET", "/api/properties/x?a=2")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_never_cached() {
        let (router, hits) = counting_router(StatusCode::NOT_FOUND, Duration::from_secs(300));
        router.route(request("GET", "/api/properties/missing")).await;
        router.route(request("GET", "/api/properties/missing")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn writes_bypass_cache() {
        let (router, hits) = counting_router(StatusCode::OK, Duration::from_secs(300));
        router.route(request("POST", "/api/properties/x")).await;
        router.route(request("POST", "/api/properties/x")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
