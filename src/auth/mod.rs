// src/auth/mod.rs
// Authentication and session component.

mod jwt;
mod password;
mod service;

pub use service::{AuthService, AuthTokens};

use thiserror::Error;

use crate::domain::DomainError;

/// Leaf error enum naming the literal auth error taxonomy
/// (`invalid_credentials`, `email_taken`, ...), kept distinct from
/// `DomainError` until the boundary adapter folds it in.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid_credentials")]
    InvalidCredentials,
    #[error("email_taken")]
    EmailTaken,
    #[error("invalid_token")]
    InvalidToken,
    #[error("token_revoked")]
    TokenRevoked,
    #[error("user_not_found")]
    UserNotFound,
}

impl From<AuthError> for DomainError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => DomainError::Authentication,
            AuthError::EmailTaken => DomainError::Conflict("email_taken".to_string()),
            AuthError::InvalidToken => DomainError::Authentication,
            AuthError::TokenRevoked => DomainError::Authentication,
            AuthError::UserNotFound => DomainError::NotFound("user_not_found".to_string()),
        }
    }
}
