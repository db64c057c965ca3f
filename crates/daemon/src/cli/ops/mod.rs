pub mod claim;
pub mod contributions;
pub mod daemon;
pub mod health;
pub mod heartbeat;
pub mod init;
pub mod session;
pub mod user;

pub use claim::Claim;
pub use contributions::Contributions;
pub use daemon::Daemon;
pub use health::Health;
pub use heartbeat::Heartbeat;
pub use init::Init;
pub use session::Session;
pub use user::User;
