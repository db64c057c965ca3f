//! Shared fixture for workspace service tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::database::models::{Directory, User};
use crate::database::Database;
use crate::runtime::fake::FakeRuntime;

use super::{
    ClaimService, ContributionService, ContributorSessions, GarbageCollector, SessionManager,
    Settings, SharedRuntime,
};

pub(crate) struct Fixture {
    // Held so the directories outlive the test.
    pub _temp: TempDir,
    pub db: Database,
    pub fake: Arc<FakeRuntime>,
    pub runtime: SharedRuntime,
    pub settings: Arc<Settings>,
}

impl Fixture {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::new(temp.path().join("playground"), temp.path().join("contributions"))
            .prepare()
            .unwrap();
        let fake = Arc::new(FakeRuntime::new());
        let runtime: SharedRuntime = fake.clone();

        Self {
            _temp: temp,
            db: Database::in_memory().await.unwrap(),
            fake,
            runtime,
            settings: Arc::new(settings),
        }
    }

    pub async fn user(&self, username: &str) -> User {
        User::create(username, &*self.db)
            .await
            .unwrap()
            .created()
            .unwrap()
    }

    /// alice owns `web`, holding `index.html`; bob exists.
    pub async fn claimed_project(&self) -> Directory {
        self.user("alice").await;
        self.user("bob").await;
        let dir = self.claims().claim("alice", "web").await.unwrap();
        std::fs::write(dir.path_buf().join("index.html"), "v1").unwrap();
        dir
    }

    pub fn claims(&self) -> ClaimService {
        ClaimService::new(self.db.clone(), self.settings.clone())
    }

    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.db.clone(), self.runtime.clone(), self.settings.clone())
    }

    pub fn contributors(&self) -> ContributorSessions {
        ContributorSessions::new(self.db.clone(), self.runtime.clone(), self.settings.clone())
    }

    pub fn contributions(&self) -> ContributionService {
        ContributionService::new(self.db.clone(), self.runtime.clone(), self.settings.clone())
    }

    pub fn gc(&self) -> GarbageCollector {
        GarbageCollector::new(self.db.clone(), self.runtime.clone(), self.settings.clone())
    }
}
