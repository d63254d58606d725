//! Per-request context handed to route handlers and middleware.
//!
//! A [`Context`] owns the parsed [`Request`] plus what the router learned
//! while matching it: for prefix mounts, the part of the path that follows
//! the mount prefix.

use crate::Request;

/// Per-request context: the request and its routing result.
#[derive(Debug)]
pub struct Context {
    request: Request,
    rest: Option<String>,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            rest: None,
        }
    }

    /// Creates a context for a prefix mount; `rest` is the path after the prefix.
    pub fn mounted(request: Request, rest: impl Into<String>) -> Self {
        Self {
            request,
            rest: Some(rest.into()),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Path remainder after the mount prefix, or the full path when the
    /// request was not dispatched through a mount.
    pub fn rest(&self) -> &str {
        self.rest.as_deref().unwrap_or_else(|| self.request.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn rest_defaults_to_full_path() {
        let ctx = Context::new(request("GET /health HTTP/1.1\r\n\r\n"));
        assert_eq!(ctx.rest(), "/health");
    }

    #[test]
    fn mounted_rest() {
        let ctx = Context::mounted(
            request("GET /api/properties/listings HTTP/1.1\r\n\r\n"),
            "/listings",
        );
        assert_eq!(ctx.rest(), "/listings");
        assert_eq!(ctx.request().path(), "/api/properties/listings");
    }

    #[test]
    fn empty_mount_rest_is_kept() {
        let ctx = Context::mounted(request("GET /api/properties HTTP/1.1\r\n\r\n"), "");
        assert_eq!(ctx.rest(), "");
    }
}
