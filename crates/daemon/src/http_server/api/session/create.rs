//! Session entry point.
//!
//! A single endpoint hands out every kind of session. The caller's identity
//! and the directory they ask for decide which one:
//!
//! - `is_guest`, or a path nobody has claimed: a throwaway guest container
//! - no path, or a path the caller owns: the caller's owner container
//! - a path claimed by someone else: a contributor container over an overlay

use std::path::Path;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::sandbox::{resolve, SandboxError};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::database::models::{is_valid_username, Directory, User};
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{error_response, internal_error};
use crate::workspace::{ContributionError, ContributionHandle, SessionError, SessionHandle};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct SessionRequest {
    /// Account requesting the session
    #[arg(long)]
    #[serde(default)]
    pub username: Option<String>,
    /// Directory to open, relative to the sandbox root
    #[arg(long)]
    #[serde(default)]
    pub path: Option<String>,
    /// Ask for a throwaway guest session
    #[arg(long = "guest")]
    #[serde(default)]
    pub is_guest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_url: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution_id: Option<String>,
}

impl From<SessionHandle> for SessionResponse {
    fn from(handle: SessionHandle) -> Self {
        Self {
            session_url: handle.session_url,
            container_name: handle.container_name,
            contribution_id: None,
        }
    }
}

impl From<ContributionHandle> for SessionResponse {
    fn from(handle: ContributionHandle) -> Self {
        Self {
            session_url: handle.session_url,
            container_name: handle.container_name,
            contribution_id: Some(handle.contribution_id),
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, SessionHandlerError> {
    let response = resolve_session(&state, req).await?;
    Ok((StatusCode::OK, Json(response)))
}

async fn resolve_session(
    state: &ServiceState,
    req: SessionRequest,
) -> Result<SessionResponse, SessionHandlerError> {
    if req.is_guest {
        return Ok(state.sessions().create_guest_session().await?.into());
    }

    let username = match req.username.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => return Err(SessionHandlerError::MissingUsername),
    };
    if !is_valid_username(&username) {
        return Err(SessionError::InvalidUsername(username).into());
    }

    let Some(path) = req.path.filter(|path| !path.is_empty()) else {
        return Ok(state.sessions().ensure_owner_session(&username).await?.into());
    };

    let sandbox_root = &state.settings().sandbox_root;
    let resolved = resolve(sandbox_root, &path)?;
    let db = state.database();

    let Some(directory) = Directory::by_path(&resolved, &**db).await? else {
        tracing::debug!(path = %resolved.display(), "unclaimed path, starting guest session");
        return Ok(state.sessions().create_guest_session().await?.into());
    };

    let owner = User::by_id(directory.owner_id, &**db)
        .await?
        .ok_or(SessionHandlerError::OwnerMissing(directory.owner_id))?;
    if owner.username == username {
        return Ok(state.sessions().ensure_owner_session(&username).await?.into());
    }

    let owner_root = state.settings().user_root(&owner.username);
    let project = project_name(&owner_root, &directory)?;
    let handle = state
        .contributors()
        .create_contributor_session(&owner.username, &username, &project, &directory)
        .await?;
    Ok(handle.into())
}

/// Path of `directory` relative to its owner's subtree.
fn project_name(owner_root: &Path, directory: &Directory) -> Result<String, SessionHandlerError> {
    let path = directory.path_buf();
    let relative = path
        .strip_prefix(owner_root)
        .map_err(|_| SessionHandlerError::OutsideOwner(directory.path.clone()))?;
    if relative.as_os_str().is_empty() {
        return Err(SessionHandlerError::OutsideOwner(directory.path.clone()));
    }
    Ok(relative.to_string_lossy().into_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum SessionHandlerError {
    #[error("username is required unless is_guest is set")]
    MissingUsername,
    #[error("invalid path: {0}")]
    Path(#[from] SandboxError),
    #[error("owner {0} of the directory no longer exists")]
    OwnerMissing(i64),
    #[error("directory {0} is not inside its owner's subtree")]
    OutsideOwner(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Contribution(#[from] ContributionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for SessionHandlerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match &self {
            SessionHandlerError::MissingUsername => {
                error_response(StatusCode::BAD_REQUEST, "missing_username", message)
            }
            SessionHandlerError::Path(_)
            | SessionHandlerError::Contribution(ContributionError::Path(_)) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_path", message)
            }
            SessionHandlerError::Session(SessionError::InvalidUsername(_)) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_username", message)
            }
            SessionHandlerError::Session(_) => internal_error("session_error", &self),
            SessionHandlerError::Contribution(_) => internal_error("contribution_error", &self),
            SessionHandlerError::OwnerMissing(_) | SessionHandlerError::OutsideOwner(_) => {
                internal_error("inconsistent_directory", &self)
            }
            SessionHandlerError::Database(_) => internal_error("database_error", &self),
        }
    }
}

impl ApiRequest for SessionRequest {
    type Response = SessionResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/session").unwrap();
        client.post(full_url).json(&self)
    }
}
