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
pub struct MergeRequest {
    /// Contribution to fold into the owner's project
    #[serde(default)]
    pub contribution_id: String,
}

pub type MergeResponse = MessageResponse;

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<MergeRequest>,
) -> Result<impl IntoResponse, MergeError> {
    if req.contribution_id.is_empty() {
        return Err(MergeError::Missing);
    }
    let stats = state.contributions().merge(&req.contribution_id).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "contribution {} merged ({} files, {} removed)",
            req.contribution_id, stats.files, stats.removed
        ))),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("contribution_id is required")]
    Missing,
    #[error(transparent)]
    Contribution(#[from] ContributionError),
}

impl IntoResponse for MergeError {
    fn into_response(self) -> Response {
        match &self {
            MergeError::Missing => error_response(
                StatusCode::BAD_REQUEST,
                "missing_contribution_id",
                self.to_string(),
            ),
            MergeError::Contribution(err) => contribution_error_response(err),
        }
    }
}

impl ApiRequest for MergeRequest {
    type Response = MergeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/contributions/merge").unwrap();
        client.post(full_url).json(&self)
    }
}
