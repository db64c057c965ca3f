use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::contributions::DiscardRequest;

#[derive(Args, Debug, Clone)]
pub struct Discard {
    #[command(flatten)]
    pub request: DiscardRequest,
}

#[derive(Debug)]
pub struct DiscardOutput {
    pub contribution_id: String,
}

impl fmt::Display for DiscardOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} contribution {}",
            "Discarded".yellow().bold(),
            self.contribution_id.bold()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscardError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Discard {
    type Error = DiscardError;
    type Output = DiscardOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client.call(self.request.clone()).await?;
        Ok(DiscardOutput {
            contribution_id: self.request.contribution_id.clone(),
        })
    }
}
