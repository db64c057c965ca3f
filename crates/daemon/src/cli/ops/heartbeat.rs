use clap::Args;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::session::HeartbeatRequest;

#[derive(Args, Debug, Clone)]
pub struct Heartbeat {
    #[command(flatten)]
    pub request: HeartbeatRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Heartbeat {
    type Error = HeartbeatError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.request.clone()).await?;
        Ok(format!("{}: {}", self.request.container_name, response.message))
    }
}
