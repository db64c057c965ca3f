//! Service bootstrap: logging, state construction, the HTTP server and the
//! garbage collector task, plus orderly shutdown.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http_server;
use crate::service_config::Config;
use crate::service_state::{State, StateSetupError};

const LOG_FILE_PREFIX: &str = "cowork.log";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to build service state: {0}")]
    State(#[from] StateSetupError),
    #[error("http server error: {0}")]
    Http(#[from] http_server::HttpServerError),
}

/// Signals the background tasks to stop and waits for them.
pub struct ShutdownHandle {
    tx: watch::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for every task to finish.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "service task panicked");
            }
        }
    }
}

/// Install the global subscriber. The returned guard flushes file output
/// and must be held for the life of the process.
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.log_level.into())
            .from_env_lossy()
    };

    let stdout = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter());

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests, embedding apps).
    let _ = tracing_subscriber::registry()
        .with(stdout)
        .with(file)
        .try_init();
    guard
}

/// Build the state and start the HTTP server and garbage collector.
pub async fn start_service(config: &Config) -> Result<(State, ShutdownHandle), ProcessError> {
    let state = State::from_config(config).await?;
    let (tx, rx) = watch::channel(());

    let listener = http_server::bind(config.api_listen_addr).await?;
    tracing::info!(addr = %config.api_listen_addr, "api server listening");

    let server = {
        let state = state.clone();
        let rx = rx.clone();
        tokio::spawn(async move {
            if let Err(e) = http_server::serve(listener, state, rx).await {
                tracing::error!(error = %e, "api server stopped");
            }
        })
    };
    let gc = state.gc().clone().spawn(config.gc_interval, rx);

    Ok((
        state,
        ShutdownHandle {
            tx,
            tasks: vec![server, gc],
        },
    ))
}

/// Run the service until Ctrl-C.
pub async fn spawn_service(config: &Config) -> Result<(), ProcessError> {
    let _guard = init_tracing(config);
    let (_state, handle) = start_service(config).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c; shutting down"),
    }
    handle.shutdown();
    handle.wait().await;
    tracing::info!("service stopped");
    Ok(())
}
