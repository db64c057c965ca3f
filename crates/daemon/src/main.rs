use std::path::PathBuf;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use url::Url;

mod cli;

use cli::op::{Op, OpContext};
use cli::ops::{Claim, Contributions, Daemon, Health, Heartbeat, Init, Session, User};

crate::command_enum! {
    (Init, Init),
    (Daemon, Daemon),
    (Health, Health),
    (User, User),
    (Claim, Claim),
    (Session, Session),
    (Heartbeat, Heartbeat),
    (Contributions, Contributions),
}

/// Containerized workspaces with overlay-backed contributions.
#[derive(Parser, Debug)]
#[command(name = "cowork", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Daemon API url (default: the port in the local config)
    #[arg(long, global = true)]
    remote: Option<Url>,

    /// Config directory (default: ~/.cowork)
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let ctx = match OpContext::new(args.remote, args.config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
