//! `/api/places` → Google Places "search nearby".

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::context::Context;
use crate::http::{Request, Response, StatusCode};
use crate::upstream::{Forward, UpstreamClient};

pub const SEARCH_NEARBY_PATH: &str = "/v1/places:searchNearby";
pub const FIELD_MASK: &str = "places.displayName,places.location,places.primaryType";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

/// Relays nearby-search queries to the Places API with the server-held key.
pub struct PlacesForwarder {
    client: UpstreamClient,
    base_url: String,
    api_key: String,
}

impl PlacesForwarder {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn upstream_url(&self, ctx: &Context) -> String {
        let base = self.base_url.trim_end_matches('/');
        match ctx.request().query_string() {
            Some(query) => format!("{base}{SEARCH_NEARBY_PATH}{}?{query}", ctx.rest()),
            None => format!("{base}{SEARCH_NEARBY_PATH}{}", ctx.rest()),
        }
    }

    pub async fn handle(&self, ctx: Context) -> Response {
        let request = ctx.request();

        let body = match reserialize_body(request) {
            Ok(body) => body,
            Err(message) => {
                return Response::json(
                    StatusCode::BAD_REQUEST,
                    &ErrorBody {
                        error: "Bad Request",
                        message: &message,
                    },
                );
            }
        };

        let mut headers = request.headers().end_to_end(&["host", "content-length"]);
        headers.set("X-Goog-Api-Key", self.api_key.as_str());
        headers.set("X-Goog-FieldMask", FIELD_MASK);
        headers.set("Content-Type", "application/json");
        headers.set("Content-Length", body.len().to_string());

        let forward = Forward {
            method: request.method().clone(),
            url: self.upstream_url(&ctx),
            headers,
            body,
        };

        match self.client.send(forward).await {
            Ok(response) => {
                info!(
                    method = %request.method(),
                    target = %request.target(),
                    status = response.status().as_u16(),
                    "[places] upstream responded"
                );
                response
            }
            Err(e) => {
                error!(error = %e, "[places] upstream unreachable");
                Response::json(
                    StatusCode::BAD_GATEWAY,
                    &ErrorBody {
                        error: "Bad Gateway",
                        message: "Places service unreachable.",
                    },
                )
            }
        }
    }
}

/// Rebuilds the outbound JSON body the way a strict JSON body parser sees it.
///
/// A JSON body must be an object or array and is re-serialized with its key
/// order kept. Any other request is sent with `{}`.
fn reserialize_body(request: &Request) -> Result<Bytes, String> {
    let is_json = request
        .headers()
        .get("content-type")
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"));

    if !is_json || request.body().is_empty() {
        return Ok(Bytes::from_static(b"{}"));
    }

    let value: Value = serde_json::from_slice(request.body()).map_err(|e| e.to_string())?;
    if !(value.is_object() || value.is_array()) {
        return Err("JSON body must be an object or an array".to_owned());
    }
    serde_json::to_vec(&value)
        .map(Bytes::from)
        .map_err(|e| e.to_string())
}
