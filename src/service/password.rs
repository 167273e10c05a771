//! Argon2id password hashing and detection of password-like body keys.

use crate::error::AppError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde_json::{Map, Value};

/// Key fragments that mark a body field as a password (matched case-insensitively).
const PASSWORD_KEY_FRAGMENTS: &[&str] = &["password", "contrasena", "passw"];

/// PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// `Ok(false)` on mismatch. A stored value that is not a PHC hash is an error.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::Internal(format!("stored password is not a valid hash: {}", e)))?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!("password verification failed: {}", e))),
    }
}

pub fn is_password_key(key: &str) -> bool {
    let key = key.to_lowercase();
    PASSWORD_KEY_FRAGMENTS.iter().any(|f| key.contains(f))
}

/// Replace every non-empty string under a password-like key with its hash.
pub fn hash_password_fields(body: &mut Map<String, Value>) -> Result<usize, AppError> {
    let mut hashed = 0;
    for (key, value) in body.iter_mut() {
        if !is_password_key(key) {
            continue;
        }
        if let Value::String(plain) = value {
            if plain.is_empty() {
                continue;
            }
            *value = Value::String(hash_password(plain)?);
            hashed += 1;
        }
    }
    Ok(hashed)
}
