pub mod status;

pub use status::{StatusRequest, StatusResponse};
