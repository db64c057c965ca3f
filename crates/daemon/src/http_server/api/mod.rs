use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::ServiceState;

pub mod client;
pub mod contributions;
pub mod directories;
pub mod session;
pub mod users;

/// Uniform error payload returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Acknowledgement body for endpoints with nothing else to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: code.to_string(),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// Log an internal failure and report it as a 500.
pub(crate) fn internal_error(code: &str, error: &dyn std::fmt::Display) -> Response {
    tracing::error!(code, error = %error, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, code, error.to_string())
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/users", post(users::create::handler))
        .route("/directories/claim", post(directories::claim::handler))
        .route("/session", post(session::create::handler))
        .route("/session/heartbeat", post(session::heartbeat::handler))
        .route("/contributions/merge", post(contributions::merge::handler))
        .route("/contributions/delete", delete(contributions::discard::handler))
        .route("/contributions/:username", get(contributions::list::handler))
        .with_state(state)
}
