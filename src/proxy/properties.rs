//! `/api/properties/*` → CRM backend.

use tracing::warn;

use crate::context::Context;
use crate::http::{Response, StatusCode};
use crate::upstream::{Forward, UpstreamClient};

/// Relays any request under the mount to the CRM, adding credentials when
/// a key is configured.
pub struct PropertiesForwarder {
    client: UpstreamClient,
    base_url: String,
    api_key: Option<String>,
}

impl PropertiesForwarder {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn upstream_url(&self, ctx: &Context) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = match ctx.rest() {
            "" => "/",
            rest => rest,
        };
        match ctx.request().query_string() {
            Some(query) => format!("{base}{path}?{query}"),
            None => format!("{base}{path}"),
        }
    }

    pub async fn handle(&self, ctx: Context) -> Response {
        let request = ctx.request();

        let mut headers = request.headers().end_to_end(&["host", "content-length"]);
        if let Some(key) = &self.api_key {
            headers.set("Authorization", format!("Bearer {key}"));
            headers.set("X-API-KEY", key.as_str());
        }

        let forward = Forward {
            method: request.method().clone(),
            url: self.upstream_url(&ctx),
            headers,
            body: request.body().clone(),
        };

        match self.client.send(forward).await {
            Ok(response) => response,
            Err(e) => {
                let status = if e.is_unreachable() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                warn!(error = %e, status = status.as_u16(), "[properties] proxy error");
                let host = request.headers().get("host").unwrap_or_default();
                Response::new(status).body(format!(
                    "Error occurred while trying to proxy: {host}{}",
                    request.target()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    fn forwarder(base: &str, key: Option<&str>) -> PropertiesForwarder {
        PropertiesForwarder::new(
            UpstreamClient::new().unwrap(),
            base,
            key.map(str::to_owned),
        )
    }

    fn ctx(target: &str, rest: &str) -> Context {
        let raw = format!("GET {target} HTTP/1.1\r\n\r\n");
        Context::mounted(Request::parse(raw.as_bytes()).unwrap().0, rest)
    }

    #[test]
    fn prefix_is_stripped() {
        let f = forwarder("http://crm.local:8080", None);
        assert_eq!(
            f.upstream_url(&ctx("/api/properties/listings?city=dubai", "/listings")),
            "http://crm.local:8080/listings?city=dubai"
        );
    }

    #[test]
    fn bare_prefix_maps_to_root() {
        let f = forwarder("http://crm.local:8080/", None);
        assert_eq!(f.upstream_url(&ctx("/api/properties", "")), "http://crm.local:8080/");
    }

    #[test]
    fn base_path_is_preserved() {
        let f = forwarder("https://crm.example.com/v2", None);
        assert_eq!(
            f.upstream_url(&ctx("/api/properties/units/4", "/units/4")),
            "https://crm.example.com/v2/units/4"
        );
    }

    #[test]
    fn empty_key_means_no_credentials() {
        assert!(forwarder("http://crm", Some("")).api_key.is_none());
        assert_eq!(
            forwarder("http://crm", Some("k")).api_key.as_deref(),
            Some("k")
        );
    }
}
