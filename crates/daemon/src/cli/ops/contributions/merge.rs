use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::contributions::MergeRequest;

#[derive(Args, Debug, Clone)]
pub struct Merge {
    #[command(flatten)]
    pub request: MergeRequest,
}

#[derive(Debug)]
pub struct MergeOutput {
    pub message: String,
}

impl fmt::Display for MergeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", "Merged".green().bold(), self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Merge {
    type Error = MergeError;
    type Output = MergeOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.request.clone()).await?;
        Ok(MergeOutput {
            message: response.message,
        })
    }
}
