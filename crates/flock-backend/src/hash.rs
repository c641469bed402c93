//! Model fingerprinting.
//!
//! Uses FNV-1a over the raw model bytes. Not cryptographically secure; it
//! only needs to tell distinct models apart so identical assets share one
//! scheduler.

use flock_core::ModelId;

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

#[inline]
fn fnv1a_byte(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// Fingerprint model bytes into a [`ModelId`].
///
/// The byte length is folded in first so a prefix never collides with
/// the full buffer by construction.
pub fn fingerprint(bytes: &[u8]) -> ModelId {
    let mut hash = FNV_OFFSET;
    for &b in &(bytes.len() as u64).to_le_bytes() {
        hash = fnv1a_byte(hash, b);
    }
    for &b in bytes {
        hash = fnv1a_byte(hash, b);
    }
    ModelId(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_fingerprint() {
        assert_eq!(fingerprint(b"model"), fingerprint(b"model"));
    }

    #[test]
    fn different_bytes_differ() {
        assert_ne!(fingerprint(b"model-a"), fingerprint(b"model-b"));
        assert_ne!(fingerprint(b""), fingerprint(&[0]));
    }
}
