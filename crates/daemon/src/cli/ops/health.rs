use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use cowork_daemon::http_server::api::client::ApiError;
use cowork_daemon::http_server::health::StatusRequest;
use cowork_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub struct ConfigInfo {
    pub directory: PathBuf,
    pub sandbox_root: PathBuf,
    pub contributions_root: PathBuf,
    pub api_listen_addr: String,
}

#[derive(Debug)]
pub enum EndpointStatus {
    Ok,
    Unhealthy(String),
    NotReachable,
}

#[derive(Debug)]
pub struct DaemonInfo {
    pub url: String,
    pub status: EndpointStatus,
}

#[derive(Debug)]
pub struct HealthOutput {
    pub config: Option<ConfigInfo>,
    pub config_error: Option<String>,
    pub daemon: DaemonInfo,
}

fn presence(path: &std::path::Path) -> String {
    if path.is_dir() {
        "OK".green().to_string()
    } else {
        "MISSING".yellow().to_string()
    }
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Config".bold())?;
        match &self.config {
            Some(info) => {
                writeln!(
                    f,
                    "  {} {}",
                    "directory:".dimmed(),
                    info.directory.display()
                )?;
                writeln!(f, "  {} {}", "config.toml:".dimmed(), "OK".green())?;
                writeln!(
                    f,
                    "  {} {} {}",
                    "sandbox:".dimmed(),
                    info.sandbox_root.display(),
                    presence(&info.sandbox_root)
                )?;
                writeln!(
                    f,
                    "  {} {} {}",
                    "contributions:".dimmed(),
                    info.contributions_root.display(),
                    presence(&info.contributions_root)
                )?;
                writeln!(f, "  {} {}", "api:".dimmed(), info.api_listen_addr)?;
            }
            None => {
                if let Some(err) = &self.config_error {
                    writeln!(f, "  {} {}", "error:".red(), err)?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", "Daemon".bold(), self.daemon.url)?;
        let status = match &self.daemon.status {
            EndpointStatus::Ok => "OK".green().to_string(),
            EndpointStatus::Unhealthy(code) => format!("{} ({})", "UNHEALTHY".red(), code),
            EndpointStatus::NotReachable => "NOT REACHABLE".red().to_string(),
        };
        write!(f, "  {} {}", "status:".dimmed(), status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, config_error) = match AppState::load(ctx.config_path.clone()) {
            Ok(state) => (
                Some(ConfigInfo {
                    directory: state.cowork_dir,
                    sandbox_root: state.config.sandbox_root,
                    contributions_root: state.config.contributions_root,
                    api_listen_addr: state.config.api_listen_addr.to_string(),
                }),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };

        let mut client = ctx.client.clone();
        let status = match client.call(StatusRequest {}).await {
            Ok(response) if response.status == "ok" => EndpointStatus::Ok,
            Ok(response) => EndpointStatus::Unhealthy(response.status),
            Err(ApiError::HttpStatus(code, _)) => EndpointStatus::Unhealthy(code.to_string()),
            Err(_) => EndpointStatus::NotReachable,
        };

        Ok(HealthOutput {
            config,
            config_error,
            daemon: DaemonInfo {
                url: ctx.client.base_url().to_string(),
                status,
            },
        })
    }
}
