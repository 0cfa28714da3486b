use hgx_crypto::{CipherError, SignatureError};

use crate::primitive::PrimitiveKind;

/// Errors from packing, parsing, and opening primitives.
#[derive(Debug, thiserror::Error)]
pub enum GolixError {
    /// The bytes are not a packed primitive.
    #[error("malformed primitive: {0}")]
    Malformed(String),

    #[error("unsupported primitive version: {0}")]
    UnsupportedVersion(u8),

    #[error("expected {expected} primitive, got {actual}")]
    WrongKind {
        expected: PrimitiveKind,
        actual: PrimitiveKind,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Signature missing or not made by the claimed author.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Decryption failure: wrong secret or tampered container.
    #[error("security error: {0}")]
    Security(#[from] CipherError),
}

/// Result alias for primitive operations.
pub type GolixResult<T> = Result<T, GolixError>;
