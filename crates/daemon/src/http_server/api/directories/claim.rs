use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{error_response, internal_error};
use crate::workspace::ClaimError;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct ClaimRequest {
    /// Account that will own the directory
    #[serde(default)]
    pub username: String,
    /// Directory to claim, relative to the user's home in the sandbox
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub message: String,
    /// Absolute host path of the claimed directory.
    pub path: String,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, ClaimHandlerError> {
    if req.username.is_empty() || req.path.is_empty() {
        return Err(ClaimHandlerError::Missing);
    }

    let directory = state.claims().claim(&req.username, &req.path).await?;
    Ok((
        StatusCode::CREATED,
        Json(ClaimResponse {
            message: format!("{} claimed by {}", req.path, req.username),
            path: directory.path,
        }),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimHandlerError {
    #[error("username and path are required")]
    Missing,
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

impl IntoResponse for ClaimHandlerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ClaimHandlerError::Missing => {
                error_response(StatusCode::BAD_REQUEST, "missing_field", message)
            }
            ClaimHandlerError::Claim(err) => match err {
                ClaimError::InvalidPath(_) => {
                    error_response(StatusCode::BAD_REQUEST, "invalid_path", message)
                }
                ClaimError::Traversal(_) => {
                    error_response(StatusCode::FORBIDDEN, "path_outside_sandbox", message)
                }
                ClaimError::UserNotFound(_) => {
                    error_response(StatusCode::NOT_FOUND, "user_not_found", message)
                }
                ClaimError::AlreadyClaimed(_) => {
                    error_response(StatusCode::CONFLICT, "already_claimed", message)
                }
                ClaimError::Filesystem { .. } => internal_error("filesystem_error", &err),
                ClaimError::Database(_) => internal_error("database_error", &err),
            },
        }
    }
}

impl ApiRequest for ClaimRequest {
    type Response = ClaimResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/directories/claim").unwrap();
        client.post(full_url).json(&self)
    }
}
