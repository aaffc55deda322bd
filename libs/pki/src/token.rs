//! Shared secret minting and comparison.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Token bytes (32 bytes = 256 bits of entropy).
const TOKEN_BYTES: usize = 32;

/// Mint a new shared token for one deployment lifecycle.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare a presented token against the expected one.
///
/// Both sides are hashed first so the comparison always walks 32 bytes
/// regardless of input length, and the digests are folded with XOR instead
/// of short-circuiting on the first difference. An empty expected token
/// never matches.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());

    expected
        .iter()
        .zip(presented.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
