use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::state::AppState;
use crate::workspace::Settings;

/// Everything needed to start the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_listen_addr: SocketAddr,
    /// SQLite file; `None` keeps the database in memory.
    pub sqlite_path: Option<PathBuf>,
    pub runtime_binary: String,
    pub settings: Settings,
    pub gc_interval: Duration,

    pub log_level: tracing::Level,
    /// Daily rotated log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_app_state(state: &AppState, log_level: tracing::Level) -> Self {
        let c = &state.config;
        let settings = Settings {
            sandbox_root: c.sandbox_root.clone(),
            contributions_root: c.contributions_root.clone(),
            image: c.image.clone(),
            shell_port: c.shell_port,
            public_host: c.public_host.clone(),
            session_ttl: Duration::from_secs(c.session_ttl_secs),
            gc_stop_grace: Duration::from_secs(c.gc_stop_grace_secs),
            rollback_stop_grace: Duration::from_secs(c.rollback_stop_grace_secs),
        };

        Self {
            api_listen_addr: c.api_listen_addr,
            sqlite_path: Some(state.db_path.clone()),
            runtime_binary: c.runtime_binary.clone(),
            settings,
            gc_interval: Duration::from_secs(c.gc_interval_secs),
            log_level,
            log_dir: c.log_dir.clone(),
        }
    }
}
