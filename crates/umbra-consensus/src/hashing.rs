//! Double-SHA-256 hashing and the 32-byte digest type.

use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit digest. Used for block hashes, transaction hashes and
/// merkle roots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero digest, used as a null marker.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Whether this is the null digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a byte slice. Returns `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA-256 applied twice, the block/transaction hash of this chain
/// family.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256_known_vector() {
        // double-SHA256 of the empty string
        let h = double_sha256(b"");
        assert_eq!(
            h.to_hex(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!double_sha256(b"x").is_zero());
    }

    #[test]
    fn test_from_slice_roundtrip() {
        let h = double_sha256(b"roundtrip");
        let again = Hash256::from_slice(h.as_bytes()).unwrap();
        assert_eq!(h, again);
        assert!(Hash256::from_slice(&[0u8; 31]).is_none());
    }
}
