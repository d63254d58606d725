//! Cross-Origin Resource Sharing for browser clients.
//!
//! Preflights are answered here and never reach a forwarder.

use std::pin::Pin;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

const DEFAULT_METHODS: &[&str] = &["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"];

/// CORS middleware: validates the `Origin` header, answers preflight
/// requests, and tags actual responses with `Access-Control-Allow-Origin`.
///
/// # Behavior
///
/// - Without an `Origin` header, or with an origin outside the allow-list,
///   the request passes through unmodified.
/// - `OPTIONS` preflights are short-circuited with `204 No Content`; the
///   downstream handler is **not** called. When no allowed headers were
///   configured, the `Access-Control-Request-Headers` value is echoed back.
/// - Other requests run normally and get `Access-Control-Allow-Origin` added,
///   unless the downstream response already set one.
/// - A specific (non-wildcard) origin also adds `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use estate_proxy::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://map.example.com")
///     .allow_header("Content-Type");
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::permissive()
    }
}

impl CorsMiddleware {
    /// Creates a middleware that accepts no origins until
    /// [`allow_origin`](Self::allow_origin) is called.
    pub fn new() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: DEFAULT_METHODS.iter().map(|m| (*m).to_owned()).collect(),
            allowed_headers: Vec::new(),
        }
    }

    /// Any origin, the default method list, requested headers reflected.
    pub fn permissive() -> Self {
        Self::new().allow_origin("*")
    }

    /// Adds an allowed origin. `"*"` permits every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed request header. Once any header is configured,
    /// preflights stop reflecting `Access-Control-Request-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let request = ctx.request();
        let allow_origin = request
            .headers()
            .get("origin")
            .and_then(|origin| self.resolve_origin(origin));

        let Some(allow_origin) = allow_origin else {
            return Box::pin(next.run(ctx));
        };

        let is_wildcard = allow_origin == "*";

        if request.method() == &Method::Options {
            let allow_headers = if self.allowed_headers.is_empty() {
                request
                    .headers()
                    .get("access-control-request-headers")
                    .map(str::to_owned)
            } else {
                Some(self.allowed_headers.join(","))
            };

            let mut resp = Response::new(StatusCode::NO_CONTENT)
                .header("Access-Control-Allow-Origin", &allow_origin)
                .header("Access-Control-Allow-Methods", self.allowed_methods.join(","));
            if let Some(headers) = allow_headers {
                resp.add_header("Access-Control-Allow-Headers", headers);
            }
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            return Box::pin(async move { resp });
        }

        Box::pin(async move {
            let mut resp = next.run(ctx).await;
            // A relayed upstream may already carry its own; browsers reject two.
            if !resp.headers().contains("access-control-allow-origin") {
                resp.add_header("Access-Control-Allow-Origin", &allow_origin);
            }
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}
