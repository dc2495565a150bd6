//! PBKDF2 password hashing.
//!
//! Stored form is `iterations:base64(salt):base64(hash)` using HMAC-SHA1,
//! which is what the rest of the constellation produces and expects.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use super::AuthError;

/// Salt length in bytes.
pub const SALT_BYTE_SIZE: usize = 24;

/// Derived key length in bytes.
pub const HASH_BYTE_SIZE: usize = 20;

/// PBKDF2 iteration count for new hashes.
pub const PBKDF2_ITERATIONS: u32 = 1000;

/// Hash a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTE_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let hash = derive(password, &salt, PBKDF2_ITERATIONS, HASH_BYTE_SIZE);
    format!(
        "{PBKDF2_ITERATIONS}:{}:{}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    )
}

/// Verify a password against a stored hash.
///
/// Iteration count and key length are taken from the stored value, so
/// hashes produced with other parameters still verify.
///
/// # Errors
///
/// Returns `AuthError::Internal` if the stored hash is malformed.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let mut parts = stored.split(':');
    let (Some(iterations), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("expected three fields"));
    };

    let iterations: u32 = iterations
        .parse()
        .map_err(|_| malformed("invalid iteration count"))?;
    if iterations == 0 {
        return Err(malformed("iteration count is zero"));
    }
    let salt = STANDARD
        .decode(salt)
        .map_err(|_| malformed("invalid salt encoding"))?;
    let expected = STANDARD
        .decode(hash)
        .map_err(|_| malformed("invalid hash encoding"))?;
    if expected.is_empty() {
        return Err(malformed("empty hash"));
    }

    let actual = derive(password, &salt, iterations, expected.len());
    Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
}

fn derive(password: &str, salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn malformed(reason: &str) -> AuthError {
    AuthError::Internal(format!("Malformed password hash: {reason}"))
}
