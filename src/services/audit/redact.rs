//! Redaction helpers. Nothing that reaches a log line may carry a raw token,
//! a secret key or a session token; identifiers are hashed.

use sha2::{Digest, Sha256};

pub const REDACTED: &str = "[REDACTED]";

const USER_HASH_HEX_LEN: usize = 16;
const TOKEN_FINGERPRINT_HEX_LEN: usize = 12;

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Stable pseudonymous identifier for a user id.
pub fn hash_user_id(user_id: &str) -> String {
    let mut digest = sha256_hex(user_id.as_bytes());
    digest.truncate(USER_HASH_HEX_LEN);
    digest
}

/// Short fingerprint used to correlate log lines for the same token.
pub fn token_fingerprint(token: &str) -> String {
    let mut digest = sha256_hex(token.as_bytes());
    digest.truncate(TOKEN_FINGERPRINT_HEX_LEN);
    digest
}
