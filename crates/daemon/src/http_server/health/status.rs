use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl ApiRequest for StatusRequest {
    type Response = StatusResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/status").unwrap();
        client.get(full_url)
    }
}

/// Always answers while the process can serve requests. Used by the CLI
/// `health` command and external probes.
#[tracing::instrument]
pub async fn handler() -> Response {
    let msg = serde_json::json!({"status": "ok"});
    (StatusCode::OK, Json(msg)).into_response()
}
