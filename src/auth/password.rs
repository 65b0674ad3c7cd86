//! Password hashing with bcrypt.
//!
//! bcrypt is CPU bound, so both operations run on the blocking pool.

use crate::errors::AppError;

/// Hash a plain-text password with the given work factor.
pub async fn hash_password(plain: &str, cost: u32) -> Result<String, AppError> {
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Check a plain-text password against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(plain: &str, hash: &str) -> Result<bool, AppError> {
    let plain = plain.to_string();
    let hash = hash.to_string();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?;

    match verified {
        Ok(ok) => Ok(ok),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            Ok(false)
        }
    }
}
