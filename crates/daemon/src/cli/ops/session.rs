use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::session::{SessionRequest, SessionResponse};

#[derive(Args, Debug, Clone)]
pub struct Session {
    #[command(flatten)]
    pub request: SessionRequest,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct SessionOutput {
    pub response: SessionResponse,
    pub json: Option<String>,
}

impl fmt::Display for SessionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(json) = &self.json {
            return write!(f, "{json}");
        }
        let kind = match (&self.response.contribution_id, &self.response.container_name) {
            (Some(_), _) => "contributor",
            (None, name) if name.starts_with("guest_") => "guest",
            (None, _) => "owner",
        };
        writeln!(f, "{} {} session", "Started".green().bold(), kind)?;
        writeln!(f, "  {} {}", "url:".dimmed(), self.response.session_url.bold())?;
        write!(
            f,
            "  {} {}",
            "container:".dimmed(),
            self.response.container_name
        )?;
        if let Some(id) = &self.response.contribution_id {
            write!(f, "\n  {} {}", "contribution:".dimmed(), id)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl Op for Session {
    type Error = SessionError;
    type Output = SessionOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.request.clone()).await?;
        let json = if self.json {
            Some(serde_json::to_string_pretty(&response)?)
        } else {
            None
        };
        Ok(SessionOutput { response, json })
    }
}
