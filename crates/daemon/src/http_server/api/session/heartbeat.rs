use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{error_response, internal_error, MessageResponse};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct HeartbeatRequest {
    /// Container whose idle clock should be reset
    #[serde(default)]
    pub container_name: String,
}

pub type HeartbeatResponse = MessageResponse;

pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, HeartbeatError> {
    if req.container_name.is_empty() {
        return Err(HeartbeatError::Missing);
    }
    if !state.sessions().heartbeat(&req.container_name).await? {
        return Err(HeartbeatError::UnknownSession(req.container_name));
    }
    tracing::trace!(container = %req.container_name, "heartbeat");
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("heartbeat recorded")),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("container_name is required")]
    Missing,
    #[error("no active session for container {0}")]
    UnknownSession(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for HeartbeatError {
    fn into_response(self) -> Response {
        match &self {
            HeartbeatError::Missing => {
                error_response(StatusCode::BAD_REQUEST, "missing_container_name", self.to_string())
            }
            HeartbeatError::UnknownSession(_) => {
                error_response(StatusCode::NOT_FOUND, "session_not_found", self.to_string())
            }
            HeartbeatError::Database(e) => internal_error("database_error", e),
        }
    }
}

impl ApiRequest for HeartbeatRequest {
    type Response = HeartbeatResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/session/heartbeat").unwrap();
        client.post(full_url).json(&self)
    }
}
