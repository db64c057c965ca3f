//! On-disk application state: the cowork directory, its `config.toml` and
//! the SQLite database path.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "cowork";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,
    #[error("cowork directory not initialized at {0}; run `cowork init`")]
    NotInitialized(PathBuf),
    #[error("config already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_listen_addr: SocketAddr,
    /// Root of every user and project directory.
    pub sandbox_root: PathBuf,
    /// Storage for contribution upper/work layers. Must not lie inside
    /// `sandbox_root`.
    pub contributions_root: PathBuf,
    pub image: String,
    /// Container runtime CLI, `docker` or `podman`.
    pub runtime_binary: String,
    pub shell_port: u16,
    pub public_host: String,
    pub session_ttl_secs: u64,
    pub gc_interval_secs: u64,
    pub gc_stop_grace_secs: u64,
    pub rollback_stop_grace_secs: u64,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            sandbox_root: PathBuf::from("/var/lib/cowork/playground"),
            contributions_root: PathBuf::from("/var/lib/cowork/contributions"),
            image: "chaospine:1.0.0".to_string(),
            runtime_binary: "docker".to_string(),
            shell_port: 7681,
            public_host: "127.0.0.1".to_string(),
            session_ttl_secs: 300,
            gc_interval_secs: 300,
            gc_stop_grace_secs: 30,
            rollback_stop_grace_secs: 1,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Defaults with both storage roots placed inside `cowork_dir`.
    pub fn rooted_at(cowork_dir: &Path) -> Self {
        Self {
            sandbox_root: cowork_dir.join("playground"),
            contributions_root: cowork_dir.join("contributions"),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), StateError> {
        if !self.sandbox_root.is_absolute() || !self.contributions_root.is_absolute() {
            return Err(StateError::Invalid(
                "sandbox_root and contributions_root must be absolute".to_string(),
            ));
        }
        if self.contributions_root.starts_with(&self.sandbox_root) {
            return Err(StateError::Invalid(format!(
                "contributions_root {} lies inside sandbox_root {}",
                self.contributions_root.display(),
                self.sandbox_root.display()
            )));
        }
        if self.session_ttl_secs == 0 || self.gc_interval_secs == 0 {
            return Err(StateError::Invalid(
                "session_ttl_secs and gc_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolved locations of the on-disk state plus the loaded config.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cowork_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// `custom` if given, otherwise `~/.cowork`.
    pub fn cowork_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        match custom {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(format!(".{APP_NAME}")))
                .ok_or(StateError::NoHomeDirectory),
        }
    }

    /// Create the cowork directory and write `config.toml`.
    pub fn init(custom: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let cowork_dir = Self::cowork_dir(custom)?;
        let config_path = cowork_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(config_path));
        }

        let config = config.unwrap_or_else(|| AppConfig::rooted_at(&cowork_dir));
        config.validate()?;

        fs::create_dir_all(&cowork_dir)?;
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            db_path: cowork_dir.join(DB_FILE_NAME),
            cowork_dir,
            config_path,
            config,
        })
    }

    /// Load an initialized cowork directory.
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let cowork_dir = Self::cowork_dir(custom)?;
        let config_path = cowork_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(cowork_dir));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.validate()?;

        Ok(Self {
            db_path: cowork_dir.join(DB_FILE_NAME),
            cowork_dir,
            config_path,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("cowork");

        let created = AppState::init(Some(dir.clone()), None).unwrap();
        assert_eq!(created.config.sandbox_root, dir.join("playground"));
        assert!(created.config_path.exists());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, created.config);
        assert_eq!(loaded.db_path, dir.join(DB_FILE_NAME));

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().to_path_buf())),
            Err(StateError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            sandbox_root = "/srv/playground"
            contributions_root = "/srv/layers"
            session_ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.shell_port, 7681);
        assert_eq!(config.image, "chaospine:1.0.0");
        config.validate().unwrap();
    }

    #[test]
    fn test_nested_contributions_root_is_invalid() {
        let config = AppConfig {
            sandbox_root: "/srv/playground".into(),
            contributions_root: "/srv/playground/.layers".into(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(StateError::Invalid(_))));
    }
}
