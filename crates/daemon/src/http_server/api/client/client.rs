use std::time::Duration;

use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

/// Session creation may wait on the container runtime pulling an image.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    /// Send `request` and decode its response. Non-2xx answers become
    /// [`ApiError::HttpStatus`] carrying the server's error message.
    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let response = request.build_request(&self.remote, &self.client).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_body(status, response.text().await?));
        }
        Ok(response.json::<T::Response>().await?)
    }

    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Underlying HTTP client, for requests without an [`ApiRequest`] type.
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
