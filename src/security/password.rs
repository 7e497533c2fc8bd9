//! Argon2id password hashing and the account password policy.

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};

use crate::error::{AppError, AppResult};

/// Hash a password for storage. The policy check runs first, so a weak
/// password never reaches the hasher.
pub fn hash_password(password: &str) -> AppResult<String> {
    validate_password_strength(password)?;

    let salt = SaltString::generate(rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AppError::Internal)?;

    Ok(hash.to_string())
}

/// Check a login attempt against the stored hash. A mismatch is an
/// authentication failure, an unparseable hash is a server fault.
pub fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| AppError::Internal)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized)
}

/// Account password policy: at least 8 characters, with an uppercase
/// letter, a lowercase letter, a digit and a special character.
fn validate_password_strength(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters long".into(),
        ));
    }

    let required = [
        password.chars().any(char::is_uppercase),
        password.chars().any(char::is_lowercase),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    if required.iter().all(|met| *met) {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Password must contain uppercase, lowercase, digit and special characters".into(),
        ))
    }
}
