// formwork-core/src/core/hashing.rs
// ============================================================================
// Module: Formwork Hashing
// Description: SHA-256 helpers for password digests and sealed record ids.
// Purpose: Centralize digest computation and hex encoding.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Password columns store salted SHA-256 digests, sealed record ids carry a
//! truncated SHA-256 tag, and audit events fingerprint bearer tokens. All of
//! them go through the helpers in this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Computes SHA-256 over the concatenation of `parts`.
#[must_use]
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Computes the lowercase hex SHA-256 digest of `salt || value`.
#[must_use]
pub fn salted_sha256_hex(salt: &str, value: &str) -> String {
    hex_encode(&sha256_parts(&[salt.as_bytes(), value.as_bytes()]))
}

/// Returns a short fingerprint for secrets that must not be logged.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    let digest = sha256_parts(&[secret.as_bytes()]);
    hex_encode(&digest[.. 8])
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salted_digest_depends_on_salt() {
        let first = salted_sha256_hex("a", "secret");
        let second = salted_sha256_hex("b", "secret");
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        assert_eq!(fingerprint("token").len(), 16);
    }
}
