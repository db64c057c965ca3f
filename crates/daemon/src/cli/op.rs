use std::path::PathBuf;

use url::Url;

use cowork_daemon::http_server::api::client::{ApiClient, ApiError};
use cowork_daemon::state::AppState;

/// Used when neither `--remote` nor a loadable config names the daemon.
pub const DEFAULT_REMOTE: &str = "http://127.0.0.1:5000";

/// Shared inputs for every command.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub config_path: Option<PathBuf>,
    pub client: ApiClient,
}

impl OpContext {
    /// Build a context talking to `remote`, or to the port in the local
    /// config when `remote` is not given.
    pub fn new(remote: Option<Url>, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let remote = match remote {
            Some(url) => url,
            None => configured_remote(config_path.clone())?,
        };
        Ok(Self {
            config_path,
            client: ApiClient::new(&remote)?,
        })
    }
}

fn configured_remote(config_path: Option<PathBuf>) -> Result<Url, ApiError> {
    let raw = match AppState::load(config_path) {
        Ok(state) => format!("http://127.0.0.1:{}", state.config.api_listen_addr.port()),
        Err(_) => DEFAULT_REMOTE.to_string(),
    };
    Url::parse(&raw).map_err(|e| ApiError::Other(format!("invalid daemon url {raw}: {e}")))
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display + std::fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a `Command` subcommand enum plus the `OpOutput`/`OpError`
/// wrappers and an `Op` impl that dispatches to each variant.
///
/// Callers bring `clap::Subcommand` and `Op` into scope.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $ty:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($ty),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$ty as Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$ty as Op>::Error),
            )*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{}", output),)*
                }
            }
        }

        #[async_trait::async_trait]
        impl Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
