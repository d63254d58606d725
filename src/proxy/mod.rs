//! The proxy application: route table and forwarders.
//!
//! | Method | Path                | Handler                                    |
//! |--------|---------------------|--------------------------------------------|
//! | GET    | `/health`           | [`health::health`]                         |
//! | any    | `/api/places/*`     | [`PlacesForwarder`]                        |
//! | any    | `/api/properties/*` | [`PropertiesForwarder`] behind the cache   |
//!
//! Every request passes through the request logger and CORS first.

pub mod health;
pub mod places;
pub mod properties;

pub use places::PlacesForwarder;
pub use properties::PropertiesForwarder;

use std::sync::Arc;

use crate::cache::{CacheMiddleware, ResponseCache};
use crate::config::Config;
use crate::context::Context;
use crate::middleware::{LoggerMiddleware, from_middleware};
use crate::router::Router;
use crate::security::CorsMiddleware;
use crate::upstream::{UpstreamClient, UpstreamError};

pub const PLACES_PREFIX: &str = "/api/places";
pub const PROPERTIES_PREFIX: &str = "/api/properties";

/// Builds the full route table from `config`.
pub fn build_router(config: &Config) -> Result<Router, UpstreamError> {
    let client = UpstreamClient::new()?;

    let places = Arc::new(PlacesForwarder::new(
        client.clone(),
        config.places_base_url.as_str(),
        config.places_api_key.as_str(),
    ));
    let properties = Arc::new(PropertiesForwarder::new(
        client,
        config.crm_base_url.as_str(),
        config.crm_key().map(str::to_owned),
    ));
    let cache = Arc::new(ResponseCache::new(config.cache_ttl()));

    let mut router = Router::new();
    router.layer(LoggerMiddleware);
    router.layer(CorsMiddleware::permissive());

    router.get("/health", health::health);
    router.head("/health", health::health);

    router.mount(PLACES_PREFIX, move |ctx: Context| {
        let places = Arc::clone(&places);
        async move { places.handle(ctx).await }
    });

    router.mount_with(
        PROPERTIES_PREFIX,
        vec![from_middleware(Arc::new(CacheMiddleware::new(cache)))],
        move |ctx: Context| {
            let properties = Arc::clone(&properties);
            async move { properties.handle(ctx).await }
        },
    );

    Ok(router)
}
