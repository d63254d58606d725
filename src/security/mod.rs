//! Browser-facing security middleware.
//!
//! - [`CorsMiddleware`]: Cross-Origin Resource Sharing header injection and
//!   preflight (`OPTIONS`) short-circuiting.

mod cors;

pub use cors::CorsMiddleware;
