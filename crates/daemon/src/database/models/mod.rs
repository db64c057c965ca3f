mod active_session;
mod contribution;
mod directory;
mod user;

pub use active_session::ActiveSession;
pub use contribution::{Contribution, ContributionSummary, NewContribution};
pub use directory::Directory;
pub use user::{is_valid_username, User};
