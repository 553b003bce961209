//! Store error taxonomy.
//!
//! Repositories surface typed errors; services catch only what they can
//! meaningfully degrade. The retry policy keys off these variants:
//! `Validation` is never retried, `Transient` retries with capped backoff,
//! `Conflict` is treated as success after a `get` fallback where idempotence
//! expects it, `Integrity` fails the stage, and `Fatal` halts the workflow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad input: missing id, empty section type, malformed payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network, pool exhaustion, timeout. Retryable.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Uniqueness violation that idempotent writers expect to hit.
    #[error("conflict on unique key: {0}")]
    Conflict(String),

    /// Uniqueness or FK violation that nothing expected.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Row that a caller required does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invariant breach (e.g. embedding dimension mismatch). Halts the
    /// workflow and waits for an operator.
    #[error("fatal invariant breach: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                StoreError::Transient(err.to_string())
            }
            sqlx::Error::Database(db) => {
                // 23505 unique_violation, 23503 foreign_key_violation
                match db.code().as_deref() {
                    Some("23505") => StoreError::Conflict(db.message().to_string()),
                    Some(code) if code.starts_with("23") => {
                        StoreError::Integrity(db.message().to_string())
                    }
                    Some("57014") | Some("40001") | Some("40P01") => {
                        // statement timeout, serialization failure, deadlock
                        StoreError::Transient(db.message().to_string())
                    }
                    _ => StoreError::Integrity(db.message().to_string()),
                }
            }
            _ => StoreError::Integrity(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(StoreError::Transient("pool".into()).is_retryable());
        assert!(!StoreError::Validation("x".into()).is_retryable());
        assert!(!StoreError::Conflict("dup".into()).is_retryable());
        assert!(!StoreError::Fatal("dim".into()).is_retryable());
    }
}
