use reqwest::StatusCode;

use crate::http_server::api::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Status code returned by the server, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::HttpStatus(status, _) => Some(*status),
            ApiError::Http(e) => e.status(),
            ApiError::Other(_) => None,
        }
    }

    /// Rebuild a status error, preferring the message of a JSON error body.
    pub(crate) fn from_body(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => ApiError::HttpStatus(status, format!("{} ({})", parsed.message, parsed.error)),
            Err(_) => ApiError::HttpStatus(status, body),
        }
    }
}
