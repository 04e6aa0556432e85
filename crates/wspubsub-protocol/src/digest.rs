//! Hashes the protocol fixes: SHA-256 for the connection nonce and SHA-512
//! for payload integrity.

use sha2::{Digest, Sha256, Sha512};

/// Length of each peer's nonce contribution and of the derived nonce.
pub const NONCE_LEN: usize = 32;

/// Length of `x-compressed-sha512`.
pub const SHA512_LEN: usize = 64;

/// `SHA256(subscriber_nonce || broadcaster_nonce)`.
pub fn derive_connection_nonce(
    subscriber_nonce: &[u8; NONCE_LEN],
    broadcaster_nonce: &[u8; NONCE_LEN],
) -> [u8; NONCE_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(subscriber_nonce);
    hasher.update(broadcaster_nonce);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&hasher.finalize());
    nonce
}

/// SHA-512 of a (compressed) payload.
pub fn payload_sha512(payload: &[u8]) -> [u8; SHA512_LEN] {
    let mut hasher = PayloadHasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Incremental SHA-512 over payload parts.
#[derive(Debug, Clone, Default)]
pub struct PayloadHasher {
    inner: Sha512,
}

impl PayloadHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, part: &[u8]) {
        self.inner.update(part);
    }

    pub fn finalize(self) -> [u8; SHA512_LEN] {
        let mut hash = [0u8; SHA512_LEN];
        hash.copy_from_slice(&self.inner.finalize());
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_nonce_is_sha256_of_concatenation() {
        let subscriber = [1u8; NONCE_LEN];
        let broadcaster = [2u8; NONCE_LEN];

        let mut joined = Vec::new();
        joined.extend_from_slice(&subscriber);
        joined.extend_from_slice(&broadcaster);
        let expected = Sha256::digest(&joined);

        assert_eq!(
            &derive_connection_nonce(&subscriber, &broadcaster)[..],
            &expected[..]
        );
    }

    #[test]
    fn nonce_depends_on_order() {
        let a = [1u8; NONCE_LEN];
        let b = [2u8; NONCE_LEN];
        assert_ne!(derive_connection_nonce(&a, &b), derive_connection_nonce(&b, &a));
    }

    #[test]
    fn incremental_hash_matches_one_shot() {
        let mut hasher = PayloadHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), payload_sha512(b"hello world"));
    }
}
