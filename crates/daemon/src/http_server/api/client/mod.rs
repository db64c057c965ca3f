//! Typed HTTP client for the cowork API.
//!
//! Each endpoint's request type implements [`ApiRequest`], so the CLI and
//! the server share one definition of every body.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

#[allow(clippy::module_inception)]
mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}
