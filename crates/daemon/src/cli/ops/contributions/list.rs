use clap::Args;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::contributions::{
    ListContributionsRequest, ListContributionsResponse,
};

#[derive(Args, Debug, Clone)]
pub struct List {
    #[command(flatten)]
    pub request: ListContributionsRequest,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: ListContributionsResponse = client.call(self.request.clone()).await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&response)?);
        }

        if response.is_empty() {
            return Ok(format!("No contributions for {}", self.request.username));
        }

        let mut output = String::new();
        output.push_str(&format!("{:<14} {}\n", "CONTRIBUTION", "PROJECT"));
        output.push_str(&"-".repeat(60));
        output.push('\n');

        for contribution in response {
            output.push_str(&format!(
                "{:<14} {}\n",
                contribution.contribution_id, contribution.project_path
            ));
        }

        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
