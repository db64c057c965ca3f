pub mod create;
pub mod heartbeat;

pub use create::{SessionRequest, SessionResponse};
pub use heartbeat::{HeartbeatRequest, HeartbeatResponse};
