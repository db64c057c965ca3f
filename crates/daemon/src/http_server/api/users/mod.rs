pub mod create;

pub use create::{CreateUserRequest, CreateUserResponse};
