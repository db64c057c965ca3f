use std::fmt;

use clap::{Args, Subcommand};
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::api::users::CreateUserRequest;

crate::command_enum! {
    (Create, Create),
}

pub type UserCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct User {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[async_trait::async_trait]
impl Op for User {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Args, Debug, Clone)]
pub struct Create {
    #[command(flatten)]
    pub request: CreateUserRequest,
}

#[derive(Debug)]
pub struct CreateOutput {
    pub username: String,
    pub message: String,
}

impl fmt::Display for CreateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} user {} {}",
            "Created".green().bold(),
            self.username.bold(),
            format!("({})", self.message).dimmed()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Create {
    type Error = CreateError;
    type Output = CreateOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.request.clone()).await?;
        Ok(CreateOutput {
            username: self.request.username.clone(),
            message: response.message,
        })
    }
}
