use clap::Args;

use cowork_daemon::state::AppState;
use cowork_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to load config: {0}")]
    State(#[from] cowork_daemon::state::StateError),
    #[error("daemon failed: {0}")]
    Service(#[from] cowork_daemon::process::ProcessError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = ServiceConfig::from_app_state(&state, self.log_level);
        spawn_service(&config).await?;
        Ok("daemon stopped".to_string())
    }
}
