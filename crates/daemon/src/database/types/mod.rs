mod insert_outcome;

pub use insert_outcome::InsertOutcome;
