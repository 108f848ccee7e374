//! Password hashing and opaque session tokens
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are 32
//! random bytes handed to the client as hex; only their SHA-256 digest is
//! persisted, so a leaked database does not leak usable tokens.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Length of a raw session token in bytes
pub const TOKEN_BYTES: usize = 32;

/// Hash a password into an Argon2id PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
///
/// A malformed stored hash verifies as `false` rather than erroring, so
/// callers report it as bad credentials.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Verified against when an account does not exist, so an unknown email
/// costs the same Argon2 work as a wrong password
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("mealwise-unknown-account").unwrap_or_default());

/// [`hash_password`] on the blocking pool
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Check a login attempt on the blocking pool
///
/// `stored_hash` is `None` for an unknown account; a dummy hash is still
/// verified and the result is always `false`.
pub async fn verify_credentials_blocking(password: String, stored_hash: Option<String>) -> bool {
    let result = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            verify_password(&password, &DUMMY_HASH);
            false
        }
    })
    .await;
    match result {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!(error = %e, "Password verification task failed");
            false
        }
    }
}

/// Generate a new random token (hex encoded)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a token as 64 hex characters
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_same_password_different_salt() {
        let a = hash_password("password123").unwrap();
        let b = hash_password("password123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hash = hash_password_blocking("correct horse battery".to_string())
            .await
            .unwrap();
        assert!(verify_credentials_blocking("correct horse battery".to_string(), Some(hash.clone())).await);
        assert!(!verify_credentials_blocking("wrong password".to_string(), Some(hash)).await);
    }

    #[tokio::test]
    async fn test_unknown_account_still_verifies_dummy() {
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(!verify_credentials_blocking("mealwise-unknown-account".to_string(), None).await);
        assert!(!verify_credentials_blocking("anything".to_string(), None).await);
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_hash_token_is_stable() {
        let digest = hash_token("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("abc"));
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
