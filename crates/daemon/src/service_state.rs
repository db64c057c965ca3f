use std::sync::Arc;

use url::Url;

use crate::database::{Database, DatabaseSetupError};
use crate::runtime::DockerCli;
use crate::service_config::Config;
use crate::workspace::{
    ClaimService, ContributionService, ContributorSessions, GarbageCollector, SessionManager,
    Settings, SettingsError, SharedRuntime,
};

/// Shared service state handed to every request handler.
#[derive(Clone)]
pub struct State {
    inner: Arc<Inner>,
}

struct Inner {
    database: Database,
    settings: Arc<Settings>,
    claims: ClaimService,
    sessions: SessionManager,
    contributors: ContributorSessions,
    contributions: ContributionService,
    gc: GarbageCollector,
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("invalid sqlite path {0}")]
    InvalidSqlitePath(String),
    #[error("database setup failed: {0}")]
    Database(#[from] DatabaseSetupError),
    #[error("workspace setup failed: {0}")]
    Settings(#[from] SettingsError),
}

impl State {
    /// Connect the database, prepare the storage roots and use the CLI
    /// container runtime named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let database = match &config.sqlite_path {
            Some(path) => {
                let url = Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidSqlitePath(path.display().to_string()))?;
                Database::connect(&url).await?
            }
            None => Database::in_memory().await?,
        };

        let settings = config.settings.clone().prepare()?;
        tracing::info!(
            sandbox_root = %settings.sandbox_root.display(),
            contributions_root = %settings.contributions_root.display(),
            runtime = %config.runtime_binary,
            "workspace roots ready"
        );

        let runtime: SharedRuntime = Arc::new(DockerCli::new(config.runtime_binary.clone()));
        Ok(Self::with_runtime(database, runtime, settings))
    }

    /// Build the state around an existing database and runtime.
    pub fn with_runtime(database: Database, runtime: SharedRuntime, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let inner = Inner {
            claims: ClaimService::new(database.clone(), settings.clone()),
            sessions: SessionManager::new(database.clone(), runtime.clone(), settings.clone()),
            contributors: ContributorSessions::new(
                database.clone(),
                runtime.clone(),
                settings.clone(),
            ),
            contributions: ContributionService::new(
                database.clone(),
                runtime.clone(),
                settings.clone(),
            ),
            gc: GarbageCollector::new(database.clone(), runtime, settings.clone()),
            database,
            settings,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn claims(&self) -> &ClaimService {
        &self.inner.claims
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn contributors(&self) -> &ContributorSessions {
        &self.inner.contributors
    }

    pub fn contributions(&self) -> &ContributionService {
        &self.inner.contributions
    }

    pub fn gc(&self) -> &GarbageCollector {
        &self.inner.gc
    }
}
