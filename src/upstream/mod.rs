//! Outbound HTTP client used by the forwarders.
//!
//! [`UpstreamClient`] sends a [`Forward`] (method, absolute URL, headers, body)
//! and turns whatever comes back into a [`Response`] that can be relayed to
//! the browser as-is. Redirects are relayed, not followed. No timeout is set
//! beyond the client's defaults.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::debug;

use crate::http::{Headers, Method, Response, StatusCode};

/// Errors raised while relaying a request upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("method {method} cannot be forwarded")]
    InvalidMethod { method: String },

    #[error("header {name} cannot be forwarded")]
    InvalidHeader { name: String },

    #[error("upstream request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream answered with invalid status {status}")]
    InvalidStatus { status: u16 },
}

impl UpstreamError {
    /// `true` when the upstream could not be reached at all: connection
    /// refused or reset, name resolution failure, or timeout.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}

/// A request ready to be sent to an upstream.
#[derive(Debug, Clone)]
pub struct Forward {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Thin wrapper around a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self { client })
    }

    /// Sends `forward` and collects the complete upstream response.
    ///
    /// Any upstream status, including 4xx and 5xx, is a successful relay.
    pub async fn send(&self, forward: Forward) -> Result<Response, UpstreamError> {
        let method = reqwest::Method::from_bytes(forward.method.as_str().as_bytes()).map_err(
            |_| UpstreamError::InvalidMethod {
                method: forward.method.to_string(),
            },
        )?;
        let headers = to_header_map(&forward.headers)?;

        debug!(method = %forward.method, url = %forward.url, "forwarding upstream");

        let mut builder = self.client.request(method, &forward.url).headers(headers);
        if !forward.body.is_empty() {
            builder = builder.body(forward.body);
        }

        let transport = |source| UpstreamError::Transport {
            url: forward.url.clone(),
            source,
        };

        let upstream = builder.send().await.map_err(transport)?;

        let code = upstream.status().as_u16();
        let status = StatusCode::from_u16(code).ok_or(UpstreamError::InvalidStatus { status: code })?;

        let headers = from_header_map(upstream.headers()).end_to_end(&["content-length"]);

        let body = upstream.bytes().await.map_err(transport)?;

        Ok(Response::from_parts(status, headers, body))
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, UpstreamError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let invalid = || UpstreamError::InvalidHeader {
            name: name.to_owned(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

// Values that are not visible ASCII cannot be stored in `Headers` and are
// skipped.
fn from_header_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::with_capacity(map.len());
    for (name, value) in map {
        match value.to_str() {
            Ok(value) => headers.insert(name.as_str(), value),
            Err(_) => debug!(header = %name, "dropping non-ASCII upstream header value"),
        }
    }
    headers
}
