//! Idle session collector.
//!
//! A sweep stops every registered container whose last activity is older
//! than the session TTL and drops its registry row. All deletions of one
//! sweep commit together; a sweep that hits an unexpected runtime error
//! deletes nothing and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::database::models::ActiveSession;
use crate::database::Database;
use crate::runtime::RuntimeError;

use super::{Settings, SharedRuntime};

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error("failed to stop idle container {name}: {source}")]
    Stop {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Containers stopped and evicted.
    pub stopped: Vec<String>,
    /// Rows whose container no longer existed.
    pub already_gone: Vec<String>,
    /// Containers that did not stop within the grace period.
    pub timed_out: Vec<String>,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.stopped.len() + self.already_gone.len() + self.timed_out.len()
    }
}

#[derive(Clone)]
pub struct GarbageCollector {
    db: Database,
    runtime: SharedRuntime,
    settings: Arc<Settings>,
}

impl GarbageCollector {
    pub fn new(db: Database, runtime: SharedRuntime, settings: Arc<Settings>) -> Self {
        Self {
            db,
            runtime,
            settings,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, GcError> {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Evict sessions idle since before `now - ttl`.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> Result<SweepReport, GcError> {
        let ttl = time::Duration::try_from(self.settings.session_ttl).unwrap_or(time::Duration::MAX);
        let cutoff = now.checked_sub(ttl).unwrap_or(OffsetDateTime::UNIX_EPOCH);

        let idle = ActiveSession::idle_since(cutoff, &*self.db).await?;
        if idle.is_empty() {
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for session in &idle {
            let name = session.container_name.clone();
            match self.runtime.stop(&name, self.settings.gc_stop_grace).await {
                Ok(()) => report.stopped.push(name),
                Err(RuntimeError::NotFound(_)) => report.already_gone.push(name),
                Err(RuntimeError::Timeout { grace, .. }) => {
                    tracing::warn!(container = %name, ?grace, "idle container did not stop in time");
                    report.timed_out.push(name);
                }
                Err(source) => return Err(GcError::Stop { name, source }),
            }
        }

        let mut tx = self.db.begin().await?;
        for session in &idle {
            ActiveSession::delete(session.id, &mut *tx).await?;
        }
        tx.commit().await?;

        tracing::info!(
            stopped = report.stopped.len(),
            already_gone = report.already_gone.len(),
            timed_out = report.timed_out.len(),
            "garbage sweep finished"
        );
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` fires or its sender drops.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            tracing::error!(error = %e, "garbage sweep aborted");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("garbage collector shutting down");
                        break;
                    }
                }
            }
        })
    }
}
