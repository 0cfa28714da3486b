//! Cryptographic building blocks for Hypergolix.
//!
//! Provides domain-separated BLAKE3 content addressing, Ed25519 signing and
//! verification, symmetric [`Secret`]s with a deterministic ratchet, and
//! ChaCha20-Poly1305 payload sealing.
//!
//! All crypto operations wrap established libraries — no custom cryptography.

pub mod cipher;
pub mod hasher;
pub mod secret;
pub mod signer;

pub use cipher::{open, seal, CipherError};
pub use hasher::ContentHasher;
pub use secret::Secret;
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
