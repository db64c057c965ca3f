use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::database::models::{is_valid_username, User};
use crate::database::InsertOutcome;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{error_response, internal_error, MessageResponse};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct CreateUserRequest {
    /// Name of the new account
    #[serde(default)]
    pub username: String,
}

pub type CreateUserResponse = MessageResponse;

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, CreateUserError> {
    if req.username.is_empty() {
        return Err(CreateUserError::Missing);
    }
    if !is_valid_username(&req.username) {
        return Err(CreateUserError::Invalid(req.username));
    }

    match User::create(&req.username, &**state.database()).await? {
        InsertOutcome::Created(user) => {
            tracing::info!(user_id = user.id, username = %user.username, "user created");
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse::new(format!("user {} created", user.username))),
            ))
        }
        InsertOutcome::Conflict => Err(CreateUserError::Exists(req.username)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("username is required")]
    Missing,
    #[error("invalid username {0:?}")]
    Invalid(String),
    #[error("user {0} already exists")]
    Exists(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CreateUserError {
    fn into_response(self) -> Response {
        match &self {
            CreateUserError::Missing => {
                error_response(StatusCode::BAD_REQUEST, "missing_username", self.to_string())
            }
            CreateUserError::Invalid(_) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_username", self.to_string())
            }
            CreateUserError::Exists(_) => {
                error_response(StatusCode::CONFLICT, "user_exists", self.to_string())
            }
            CreateUserError::Database(e) => internal_error("database_error", e),
        }
    }
}

impl ApiRequest for CreateUserRequest {
    type Response = CreateUserResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/users").unwrap();
        client.post(full_url).json(&self)
    }
}
