//! Domain errors for the paywall decision engine.

use thiserror::Error;

/// Domain-level errors that can occur in the decision engine.
///
/// Only administrative operations surface these. Decision evaluation maps every
/// variant to a conservative no-show decision instead.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },
}

impl DomainError {
    /// Whether the error indicates an unreadable persisted record.
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::SerializationError(_))
    }

    /// Whether the error is an optimistic write collision.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DomainError::SerializationError("bad".into()).is_corruption());
        assert!(!DomainError::DatabaseError("down".into()).is_corruption());
        assert!(DomainError::ConcurrencyConflict {
            entity: "user".into(),
            id: "u1".into(),
        }
        .is_conflict());
    }

    #[test]
    fn test_conflict_message() {
        let err = DomainError::ConcurrencyConflict {
            entity: "user_state".into(),
            id: "alice".into(),
        };
        assert_eq!(err.to_string(), "Concurrency conflict: user_state alice was modified");
    }
}
