//! # estate-proxy
//!
//! A caching reverse proxy that sits between the estate map front end and two
//! upstreams: Google Places (nearby search) and the CRM backend. API keys stay
//! on the server; successful CRM reads are cached for a few minutes.
//!
//! The crate carries its own small async HTTP/1.1 stack (`http`, `server`,
//! `router`, `middleware`) and builds the proxy on top of it (`proxy`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use estate_proxy::{config::Config, proxy, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let router = proxy::build_router(&config)?;
//!     let server = Server::bind(config.listen_addr()).await?;
//!     server.serve(router, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

// ── HTTP stack ────────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Proxy application ─────────────────────────────────────────────────────────
pub mod cache;
pub mod config;
pub mod proxy;
pub mod upstream;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
