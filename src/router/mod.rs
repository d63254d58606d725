//! Request routing: map paths and HTTP methods to handler functions.
//!
//! [`Router`] knows two kinds of entries:
//!
//! - **Routes** bind one HTTP method and an exact path to a handler. A single
//!   trailing slash is ignored, so `/health/` and `/health` are the same route.
//!
//! - **Mounts** bind a path prefix to a handler for every method. The prefix
//!   matches on segment boundaries (`/api/places` matches `/api/places/x` but
//!   not `/api/placesx`) and the longest matching prefix wins. The handler sees
//!   the remainder through [`Context::rest`].
//!
//! Mounts are consulted before routes; anything left over gets a `404`.
//! Router-wide middleware added with [`Router::layer`] wraps every dispatch,
//! including the `404` fallback.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl.
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

// Strips one trailing slash, except from the root path.
fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

// A single registered route binding a method and exact path to a handler.
struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> bool {
        &self.method == method && self.path == normalize(path)
    }
}

// A prefix bound to a handler for all methods, with its own middleware.
struct Mount {
    prefix: String,
    layers: Vec<MiddlewareHandler>,
    handler: Handler,
}

impl Mount {
    // Returns the path remainder when `path` lies under this mount's prefix.
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

/// HTTP request router with prefix mounts, method routes, and a middleware chain.
///
/// # Examples
///
/// ```rust,no_run
/// use estate_proxy::{Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
///
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::OK) });
///
/// router.mount("/api/properties", |ctx: Context| async move {
///     Response::new(StatusCode::OK).body(ctx.rest().to_owned())
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    mounts: Vec<Mount>,
    layers: Vec<MiddlewareHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `HEAD` requests matching `path`.
    pub fn head(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Head, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    /// Mount `handler` under `prefix` for every HTTP method.
    pub fn mount(&mut self, prefix: &str, handler: impl IntoHandler) {
        self.mount_with(prefix, Vec::new(), handler);
    }

    /// Mount `handler` under `prefix`, running `layers` (outermost first)
    /// inside the router-wide middleware for requests that hit this mount.
    pub fn mount_with(
        &mut self,
        prefix: &str,
        layers: Vec<MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.mounts.push(Mount {
            prefix: prefix.trim_end_matches('/').to_string(),
            layers,
            handler,
        });
    }

    /// Add router-wide middleware. Layers run in the order they were added.
    pub fn layer<M: Middleware + 'static>(&mut self, middleware: M) {
        self.layers.push(from_middleware(Arc::new(middleware)));
    }

    /// Return the number of routes and mounts registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len() + self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.mounts.is_empty()
    }

    /// Dispatch `request` through the middleware chain to the selected handler.
    ///
    /// Selection order: the mount with the longest matching prefix, then the
    /// first matching route in registration order, then a `404` fallback whose
    /// body reads `Cannot <METHOD> <path>`.
    pub async fn route(&self, request: Request) -> Response {
        let path = request.path().to_owned();

        let mount = self
            .mounts
            .iter()
            .filter_map(|m| m.strip(&path).map(|rest| (m, rest)))
            .max_by_key(|(m, _)| m.prefix.len());

        let mut chain = self.layers.clone();

        let ctx = if let Some((mount, rest)) = mount {
            chain.extend(mount.layers.iter().cloned());
            chain.push(endpoint(mount.handler.clone()));
            Context::mounted(request, rest)
        } else if let Some(route) = self
            .routes
            .iter()
            .find(|r| r.matches(request.method(), &path))
        {
            chain.push(endpoint(route.handler.clone()));
            Context::new(request)
        } else {
            chain.push(endpoint(Arc::new(|ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(not_found(ctx))
            })));
            Context::new(request)
        };

        Next::new(chain).run(ctx).await
    }
}

// Terminal chain element: ignores `next` and calls the handler.
fn endpoint(handler: Handler) -> MiddlewareHandler {
    Arc::new(move |ctx: Context, _next: Next| handler(ctx))
}

async fn not_found(ctx: Context) -> Response {
    let request = ctx.request();
    Response::new(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(format!("Cannot {} {}", request.method(), request.path()))
}
