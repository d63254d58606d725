use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::context::Context;
use crate::http::{Response, StatusCode};

pub const SERVICE_NAME: &str = "UAE Real Estate CRM Proxy";

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    timestamp: String,
}

/// Liveness check. Always `200`.
pub async fn health(_ctx: Context) -> Response {
    let body = Health {
        status: "online",
        service: SERVICE_NAME,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Response::json(StatusCode::OK, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use chrono::DateTime;

    #[tokio::test]
    async fn reports_online_with_iso_timestamp() {
        let ctx = Context::new(Request::parse(b"GET /health HTTP/1.1\r\n\r\n").unwrap().0);
        let res = health(ctx).await;
        assert_eq!(res.status(), StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(value["status"], "online");
        assert_eq!(value["service"], SERVICE_NAME);

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(timestamp.ends_with('Z'));
        assert_eq!(timestamp.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
