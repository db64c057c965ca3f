use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use cowork_daemon::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Root of every user and project directory (default: <config dir>/playground)
    #[arg(long)]
    pub sandbox_root: Option<PathBuf>,

    /// Storage for contribution layers, outside the sandbox root
    /// (default: <config dir>/contributions)
    #[arg(long)]
    pub contributions_root: Option<PathBuf>,

    /// API server port
    #[arg(long, default_value = "5000")]
    pub api_port: u16,

    /// Container image used for every session
    #[arg(long)]
    pub image: Option<String>,

    /// Container runtime CLI (docker or podman)
    #[arg(long)]
    pub runtime: Option<String>,
}

#[derive(Debug)]
pub struct InitOutput {
    pub cowork_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub config: AppConfig,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cowork at {}",
            "Initialized".green().bold(),
            self.cowork_dir.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        writeln!(f, "  {} {}", "Database:".dimmed(), self.db_path.display())?;
        writeln!(
            f,
            "  {} {}",
            "Sandbox:".dimmed(),
            self.config.sandbox_root.display()
        )?;
        writeln!(
            f,
            "  {} {}",
            "Contributions:".dimmed(),
            self.config.contributions_root.display()
        )?;
        writeln!(f, "  {} {}", "Image:".dimmed(), self.config.image)?;
        writeln!(f, "  {} {}", "Runtime:".dimmed(), self.config.runtime_binary)?;
        write!(f, "  {} {}", "API:".dimmed(), self.config.api_listen_addr)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] cowork_daemon::state::StateError),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl Init {
    fn build_config(&self, cowork_dir: &std::path::Path) -> Result<AppConfig, InitError> {
        let mut config = AppConfig::rooted_at(cowork_dir);
        if let Some(root) = &self.sandbox_root {
            config.sandbox_root = absolute("--sandbox-root", root)?;
        }
        if let Some(root) = &self.contributions_root {
            config.contributions_root = absolute("--contributions-root", root)?;
        }
        config.api_listen_addr = SocketAddr::new(config.api_listen_addr.ip(), self.api_port);
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(runtime) = &self.runtime {
            config.runtime_binary = runtime.clone();
        }
        Ok(config)
    }
}

fn absolute(flag: &str, path: &std::path::Path) -> Result<PathBuf, InitError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Err(InitError::InvalidPath(format!("{flag} must be an absolute path")))
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let cowork_dir = AppState::cowork_dir(ctx.config_path.clone())?;
        let config = self.build_config(&cowork_dir)?;
        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(InitOutput {
            cowork_dir: state.cowork_dir,
            config_path: state.config_path,
            db_path: state.db_path,
            config: state.config,
        })
    }
}
