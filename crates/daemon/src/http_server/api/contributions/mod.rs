//! Contribution review endpoints for project owners.

pub mod discard;
pub mod list;
pub mod merge;

pub use discard::{DiscardRequest, DiscardResponse};
pub use list::{ListContributionsRequest, ListContributionsResponse};
pub use merge::{MergeRequest, MergeResponse};

use axum::http::StatusCode;
use axum::response::Response;

use crate::http_server::api::{error_response, internal_error};
use crate::workspace::ContributionError;

/// Shared status mapping for merge and discard failures.
pub(crate) fn contribution_error_response(err: &ContributionError) -> Response {
    let message = err.to_string();
    match err {
        ContributionError::NotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "contribution_not_found", message)
        }
        ContributionError::UserNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "user_not_found", message)
        }
        ContributionError::StorageMissing(_) => {
            error_response(StatusCode::CONFLICT, "storage_missing", message)
        }
        ContributionError::ProjectMissing(_) => {
            error_response(StatusCode::CONFLICT, "project_missing", message)
        }
        ContributionError::Runtime(_) => internal_error("runtime_error", err),
        ContributionError::Database(_) => internal_error("database_error", err),
        _ => internal_error("contribution_error", err),
    }
}
