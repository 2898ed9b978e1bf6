// src/auth/password.rs

use bcrypt::{hash, verify, BcryptError};

use crate::domain::DomainError;

pub fn hash_password(password: &str, cost: u32) -> Result<String, DomainError> {
    hash(password, cost).map_err(|e: BcryptError| DomainError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, DomainError> {
    verify(password, hash).map_err(|e: BcryptError| DomainError::Internal(format!("failed to verify password: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn verifies_the_correct_password() {
        let hashed = hash_password("correct horse battery staple", TEST_COST).unwrap();
        assert!(verify_password("correct horse battery staple", &hashed).unwrap());
    }

    #[test]
    fn rejects_the_wrong_password() {
        let hashed = hash_password("correct horse battery staple", TEST_COST).unwrap();
        assert!(!verify_password("wrong password", &hashed).unwrap());
    }
}
