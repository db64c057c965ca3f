pub mod claim;

pub use claim::{ClaimRequest, ClaimResponse};
