use std::sync::Arc;

use crate::config::auth::AuthConfig;
use crate::domain::{DomainError, DomainResult, User};
use crate::presence::PresenceStore;
use crate::repo::UserRepository;

use super::jwt::{create_token, verify_token};
use super::password::{hash_password, verify_password};
use super::AuthError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    presence: Arc<dyn PresenceStore>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, presence: Arc<dyn PresenceStore>, config: AuthConfig) -> Self {
        Self { users, presence, config }
    }

    async fn issue_tokens(&self, user_id: &str) -> DomainResult<AuthTokens> {
        let access_token = create_token(user_id, &self.config.access_token_secret, self.config.access_token_ttl_seconds)?;
        let refresh_token = create_token(user_id, &self.config.refresh_token_secret, self.config.refresh_token_ttl_seconds)?;

        self.presence
            .bind_refresh_token(user_id, &refresh_token, self.config.refresh_token_ttl_seconds)
            .await?;

        Ok(AuthTokens { access_token, refresh_token })
    }

    pub async fn signup(&self, email: &str, display_name: &str, password: &str) -> DomainResult<(User, AuthTokens)> {
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }

        let password_hash = hash_password(password, self.config.bcrypt_cost)?;
        let user = self.users.create(email, display_name, &password_hash).await?;
        let tokens = self.issue_tokens(&user.id).await?;

        Ok((user, tokens))
    }

    pub async fn login(&self, email: &str, password: &str) -> DomainResult<(User, AuthTokens)> {
        let with_password = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &with_password.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issue_tokens(&with_password.id).await?;
        Ok((with_password.into(), tokens))
    }

    pub async fn refresh(&self, user_id: &str, presented_refresh_token: &str) -> DomainResult<AuthTokens> {
        let matches = self.presence.check_refresh_token(user_id, presented_refresh_token).await?;
        if !matches {
            return Err(AuthError::TokenRevoked.into());
        }

        self.issue_tokens(user_id).await
    }

    pub async fn logout(&self, user_id: &str) -> DomainResult<()> {
        self.presence.revoke_refresh_token(user_id).await
    }

    /// Verifies an access token and returns the user id in its `sub` claim.
    /// Used by the WebSocket handshake and the `Authorization` header
    /// extractor for the HTTP surface.
    pub fn verify_access_token(&self, token: &str) -> DomainResult<String> {
        let claims = verify_token(token, &self.config.access_token_secret).map_err(|_| AuthError::InvalidToken)?;
        Ok(claims.sub)
    }

    pub async fn me(&self, user_id: &str) -> DomainResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::from(AuthError::UserNotFound))
    }
}
