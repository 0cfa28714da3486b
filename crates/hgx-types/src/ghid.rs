use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content address of a Golix primitive.
///
/// A `Ghid` is an algorithm tag followed by a fixed-length digest. The same
/// bytes always hash to the same `Ghid`, so primitives are deduplicated and
/// verifiable by construction. Equality and ordering are by byte value
/// (tag first, then digest).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ghid {
    algo: u8,
    digest: [u8; 32],
}

impl Ghid {
    /// Algorithm tag for BLAKE3-256 digests.
    pub const ALGO_BLAKE3: u8 = 1;

    /// Length of the textual/binary form: one tag byte plus the digest.
    pub const LEN: usize = 33;

    /// Compute a `Ghid` by hashing raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_digest(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed BLAKE3 digest.
    pub const fn from_digest(digest: [u8; 32]) -> Self {
        Self {
            algo: Self::ALGO_BLAKE3,
            digest,
        }
    }

    /// The algorithm tag.
    pub fn algo(&self) -> u8 {
        self.algo
    }

    /// The raw digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Tag and digest as one contiguous array.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.algo;
        out[1..].copy_from_slice(&self.digest);
        out
    }

    /// Parse from the contiguous binary form produced by [`Self::to_bytes`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != Self::LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != Self::ALGO_BLAKE3 {
            return Err(TypeError::UnsupportedAlgorithm(bytes[0]));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[1..]);
        Ok(Self::from_digest(digest))
    }

    /// Hex-encoded string representation (tag + digest).
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Short hex representation of the digest (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Ghid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ghid({})", self.short_hex())
    }
}

impl fmt::Display for Ghid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Ghid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_bytes_is_deterministic() {
        let id1 = Ghid::from_bytes(b"hello world");
        let id2 = Ghid::from_bytes(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_data_produces_different_ghids() {
        assert_ne!(Ghid::from_bytes(b"hello"), Ghid::from_bytes(b"world"));
    }

    #[test]
    fn hex_roundtrip() {
        let id = Ghid::from_bytes(b"test");
        let parsed = Ghid::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn display_carries_algorithm_tag() {
        let id = Ghid::from_bytes(b"test");
        let display = format!("{id}");
        assert_eq!(display.len(), Ghid::LEN * 2);
        assert!(display.starts_with("01"));
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(Ghid::from_bytes(b"test").short_hex().len(), 8);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let mut bytes = Ghid::from_bytes(b"x").to_bytes();
        bytes[0] = 0x7f;
        assert_eq!(
            Ghid::from_slice(&bytes),
            Err(TypeError::UnsupportedAlgorithm(0x7f))
        );
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Ghid::from_hex("0102").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: Ghid::LEN,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(Ghid::from_hex("zz"), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn ordering_is_by_digest_bytes() {
        let a = Ghid::from_digest([0; 32]);
        let b = Ghid::from_digest([1; 32]);
        assert!(a < b);
    }

    #[test]
    fn serde_roundtrip() {
        let id = Ghid::from_bytes(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: Ghid = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn same_bytes_same_ghid(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(Ghid::from_bytes(&data), Ghid::from_bytes(&data));
            let parsed: Ghid = Ghid::from_bytes(&data).to_hex().parse().unwrap();
            prop_assert_eq!(parsed, Ghid::from_bytes(&data));
        }
    }
}
