use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::OAuthError;

/// Minimum length for generated client secrets.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Default length for generated client secrets.
pub const DEFAULT_SECRET_LENGTH: usize = 48;

/// Bcrypt cost factor for client secret hashing.
pub const BCRYPT_COST: u32 = 12;

const SECRET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";

/// Generate a cryptographically secure random client secret (admin-flow use; the core never
/// calls this itself, but it lives next to `hash_secret`/`verify_secret` since it shares their
/// character-set and length conventions).
pub fn generate_secret() -> String {
    generate_secret_with_length(DEFAULT_SECRET_LENGTH)
}

pub fn generate_secret_with_length(length: usize) -> String {
    let length = length.max(MIN_SECRET_LENGTH);
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..SECRET_CHARSET.len());
            SECRET_CHARSET[idx] as char
        })
        .collect()
}

/// Hash a client secret for storage. Used for CONFIDENTIAL client registration.
pub fn hash_secret(secret: &str) -> Result<String, OAuthError> {
    bcrypt::hash(secret, BCRYPT_COST)
        .map_err(|e| OAuthError::ServerError(format!("secret hashing failed: {e}")))
}

/// Verify a client secret against its stored bcrypt hash. Constant-time by construction
/// (bcrypt compares the full derived hash, not a byte-prefix).
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, OAuthError> {
    bcrypt::verify(secret, hash)
        .map_err(|e| OAuthError::ServerError(format!("secret verification failed: {e}")))
}

/// Generate the 32 random bytes (hex-encoded) used as an authorization code value.
pub fn generate_auth_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token (access/refresh token JWT, or an authorization code) for storage: SHA-256
/// hex of the raw string. This is the only form persisted — the JWT/code itself is never
/// stored, so a stolen database dump cannot be replayed directly.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a token (or code) against a stored hash, in constant time.
pub fn verify_token_hash(token: &str, hash: &str) -> bool {
    constant_time_compare(&hash_token(token), hash)
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_minimum_length() {
        let secret = generate_secret();
        assert!(secret.len() >= MIN_SECRET_LENGTH);
    }

    #[test]
    fn test_generate_secret_default_length() {
        let secret = generate_secret();
        assert_eq!(secret.len(), DEFAULT_SECRET_LENGTH);
    }

    #[test]
    fn test_generate_secret_enforces_minimum() {
        let secret = generate_secret_with_length(10);
        assert!(secret.len() >= MIN_SECRET_LENGTH);
    }

    #[test]
    fn test_generate_secret_uniqueness() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_hash_secret_produces_bcrypt_hash() {
        let hash = hash_secret("test_secret_123").unwrap();
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_secret_correct_and_incorrect() {
        let secret = generate_secret();
        let hash = hash_secret(&secret).unwrap();
        assert!(verify_secret(&secret, &hash).unwrap());
        assert!(!verify_secret(&generate_secret(), &hash).unwrap());
    }

    #[test]
    fn test_hash_secret_salts_each_call() {
        let hash1 = hash_secret("same_secret").unwrap();
        let hash2 = hash_secret("same_secret").unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_secret("same_secret", &hash1).unwrap());
        assert!(verify_secret("same_secret", &hash2).unwrap());
    }

    #[test]
    fn test_generate_auth_code_is_hex_and_unique() {
        let a = generate_auth_code();
        let b = generate_auth_code();
        assert_eq!(a.len(), 64); // 32 bytes hex-encoded
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_is_hex_and_deterministic() {
        let hash1 = hash_token("some.jwt.value");
        let hash2 = hash_token("some.jwt.value");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert!(hash1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_token_hash() {
        let token = "header.payload.signature";
        let hash = hash_token(token);
        assert!(verify_token_hash(token, &hash));
        assert!(!verify_token_hash("different", &hash));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
