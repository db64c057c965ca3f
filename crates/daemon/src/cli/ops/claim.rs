use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::directories::{ClaimRequest, ClaimResponse};

#[derive(Args, Debug, Clone)]
pub struct Claim {
    #[command(flatten)]
    pub request: ClaimRequest,
}

#[derive(Debug)]
pub struct ClaimOutput {
    pub owner: String,
    pub path: String,
}

impl fmt::Display for ClaimOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} directory", "Claimed".green().bold())?;
        writeln!(f, "  {} {}", "owner:".dimmed(), self.owner.bold())?;
        write!(f, "  {} {}", "path:".dimmed(), self.path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Claim {
    type Error = ClaimError;
    type Output = ClaimOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: ClaimResponse = client.call(self.request.clone()).await?;
        Ok(ClaimOutput {
            owner: self.request.username.clone(),
            path: response.path,
        })
    }
}
