use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::contribution_error_response;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{error_response, MessageResponse};
use crate::workspace::ContributionError;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct DiscardRequest {
    /// Contribution to throw away
    #[serde(default)]
    pub contribution_id: String,
}

pub type DiscardResponse = MessageResponse;

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<DiscardRequest>,
) -> Result<impl IntoResponse, DiscardError> {
    if req.contribution_id.is_empty() {
        return Err(DiscardError::Missing);
    }
    state.contributions().discard(&req.contribution_id).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "contribution {} discarded",
            req.contribution_id
        ))),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum DiscardError {
    #[error("contribution_id is required")]
    Missing,
    #[error(transparent)]
    Contribution(#[from] ContributionError),
}

impl IntoResponse for DiscardError {
    fn into_response(self) -> Response {
        match &self {
            DiscardError::Missing => error_response(
                StatusCode::BAD_REQUEST,
                "missing_contribution_id",
                self.to_string(),
            ),
            DiscardError::Contribution(err) => contribution_error_response(err),
        }
    }
}

impl ApiRequest for DiscardRequest {
    type Response = DiscardResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/contributions/delete").unwrap();
        client.delete(full_url).json(&self)
    }
}
