// src/auth/jwt.rs
// Access and refresh tokens are signed with separate secrets so a leaked
// access-token key cannot be used to forge a refresh token.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn create_token(user_id: &str, secret: &str, ttl_seconds: i64) -> Result<String, DomainError> {
    let now = chrono::Utc::now();
    let exp = now
        .checked_add_signed(chrono::Duration::seconds(ttl_seconds))
        .ok_or_else(|| DomainError::Internal("token expiry overflowed".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| DomainError::Internal(format!("failed to create token: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, DomainError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| DomainError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_subject() {
        let token = create_token("user-1", "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let token = create_token("user-1", "secret-a", 60).unwrap();
        let err = verify_token(&token, "secret-b").unwrap_err();
        assert!(matches!(err, DomainError::Authentication));
    }

    #[test]
    fn rejects_an_expired_token() {
        let token = create_token("user-1", "secret", -60).unwrap();
        let err = verify_token(&token, "secret").unwrap_err();
        assert!(matches!(err, DomainError::Authentication));
    }
}
