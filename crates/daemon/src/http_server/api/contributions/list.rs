use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::contribution_error_response;
use crate::database::models::ContributionSummary;
use crate::http_server::api::client::ApiRequest;
use crate::workspace::ContributionError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct ListContributionsRequest {
    /// Owner whose projects received the contributions
    pub username: String,
}

pub type ListContributionsResponse = Vec<ContributionSummary>;

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ListError> {
    let contributions = state.contributions().list_for_owner(&username).await?;
    Ok((StatusCode::OK, Json(contributions)))
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ListError(#[from] ContributionError);

impl IntoResponse for ListError {
    fn into_response(self) -> Response {
        contribution_error_response(&self.0)
    }
}

impl ApiRequest for ListContributionsRequest {
    type Response = ListContributionsResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url
            .join(&format!("/contributions/{}", self.username))
            .unwrap();
        client.get(full_url)
    }
}
