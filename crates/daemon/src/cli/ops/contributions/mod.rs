use clap::{Args, Subcommand};

pub mod discard;
pub mod list;
pub mod merge;

use crate::cli::op::Op;

crate::command_enum! {
    (List, list::List),
    (Merge, merge::Merge),
    (Discard, discard::Discard),
}

pub type ContributionsCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Contributions {
    #[command(subcommand)]
    pub command: ContributionsCommand,
}

#[async_trait::async_trait]
impl Op for Contributions {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
