use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier an application uses to declare interest in a class of objects.
///
/// Objects carry the `ApiId` of the schema they were written with; the
/// dispatcher routes shares and updates to every connection subscribed to
/// that identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiId([u8; 32]);

impl ApiId {
    /// Length of an API identifier in bytes.
    pub const LEN: usize = 32;

    /// Derive an API identifier from a human-readable schema name.
    pub fn derive(name: &str) -> Self {
        Self(*blake3::hash(name.as_bytes()).as_bytes())
    }

    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Session token identifying one application across reconnects.
///
/// The all-zero token is reserved: it is always "known" to the dispatcher
/// and is never issued to an application.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppToken([u8; 4]);

impl AppToken {
    /// Length of a token in bytes.
    pub const LEN: usize = 4;

    /// The reserved null token.
    pub const fn null() -> Self {
        Self([0u8; 4])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 4]
    }

    /// Draw a random token. May return the null token or a token already in
    /// use; callers are responsible for collision checks.
    pub fn random() -> Self {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_raw(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppToken({})", self.to_hex())
    }
}

impl fmt::Display for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_id_derive_is_deterministic() {
        assert_eq!(ApiId::derive("notes.v1"), ApiId::derive("notes.v1"));
        assert_ne!(ApiId::derive("notes.v1"), ApiId::derive("notes.v2"));
    }

    #[test]
    fn api_id_from_slice_checks_length() {
        let id = ApiId::derive("x");
        assert_eq!(ApiId::from_slice(id.as_bytes()).unwrap(), id);
        assert_eq!(
            ApiId::from_slice(&[1, 2, 3]),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 3
            })
        );
    }

    #[test]
    fn null_token() {
        assert!(AppToken::null().is_null());
        assert!(!AppToken::from_raw([0, 0, 0, 1]).is_null());
    }

    #[test]
    fn token_display_is_hex() {
        assert_eq!(AppToken::from_raw([0xde, 0xad, 0xbe, 0xef]).to_string(), "deadbeef");
    }
}
