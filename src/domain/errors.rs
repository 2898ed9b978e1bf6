// src/domain/errors.rs
// Error taxonomy shared by repositories, services, and handlers.

use thiserror::Error;

/// Domain-level error taxonomy. The HTTP and realtime boundary adapters
/// (see `crate::error`) each map these to their own representation instead
/// of leaking `sqlx`/`redis`/`reqwest` error types past the service layer.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("authentication failed")]
    Authentication,

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => DomainError::NotFound("row not found".to_string()),
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for DomainError {
    fn from(e: redis::RedisError) -> Self {
        DomainError::Internal(format!("presence store: {e}"))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
