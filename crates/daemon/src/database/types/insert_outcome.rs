/// Result of an insert guarded by a unique constraint.
///
/// Store failures other than the constraint are carried in the surrounding
/// `Result`, so callers match on three outcomes: created, conflict, error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    Created(T),
    Conflict,
}

impl<T> InsertOutcome<T> {
    /// Classify the result of an insert query.
    pub fn from_query(result: Result<T, sqlx::Error>) -> Result<Self, sqlx::Error> {
        match result {
            Ok(row) => Ok(InsertOutcome::Created(row)),
            Err(sqlx::Error::Database(ref db_error)) if db_error.is_unique_violation() => {
                Ok(InsertOutcome::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    pub fn created(self) -> Option<T> {
        match self {
            InsertOutcome::Created(row) => Some(row),
            InsertOutcome::Conflict => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, InsertOutcome::Conflict)
    }
}
