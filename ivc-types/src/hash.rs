use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit content hash.
///
/// `Hash` is the sole identity primitive used throughout the framework: every
/// ADS node, log entry and paging token is ultimately addressed by one of
/// these.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hashes `data` with SHA-256.
    pub fn sum(data: &[u8]) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns bit `i` of the hash, where bit 0 is the least-significant bit
    /// of byte 0.
    pub fn bit(&self, i: usize) -> u8 {
        (self.0[i / 8] >> (i % 8)) & 1
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_is_deterministic() {
        let a = Hash::sum(b"hello");
        let b = Hash::sum(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn bit_matches_byte_layout() {
        let h = Hash::sum(b"x");
        for i in 0..256 {
            let expected = (h.0[i / 8] >> (i % 8)) & 1;
            assert_eq!(h.bit(i), expected);
        }
    }
}
