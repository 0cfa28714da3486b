use rand::RngCore;
use serde::{Deserialize, Serialize};

use hgx_types::Ghid;

const RATCHET_CONTEXT: &str = "hgx secret ratchet v1";

/// Symmetric secret protecting a single container.
///
/// A secret is a ChaCha20-Poly1305 key plus the nonce it is used with. Every
/// container gets its own secret, so a key/nonce pair is never reused.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    key: [u8; 32],
    nonce: [u8; 12],
}

impl Secret {
    /// Draw a fresh random secret.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    pub fn from_parts(key: [u8; 32], nonce: [u8; 12]) -> Self {
        Self { key, nonce }
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn nonce(&self) -> &[u8; 12] {
        &self.nonce
    }

    /// Derive the next secret in a chain.
    ///
    /// `proxy` is the logical address of the object whose history is being
    /// ratcheted and `target` the container the current secret protects. The
    /// derivation is deterministic: any holder of `self` can recompute every
    /// later secret, but not earlier ones.
    pub fn ratchet(&self, proxy: &Ghid, target: &Ghid) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(RATCHET_CONTEXT);
        hasher.update(&self.key);
        hasher.update(&self.nonce);
        hasher.update(&target.to_bytes());
        hasher.update(&proxy.to_bytes());

        let mut okm = [0u8; 44];
        hasher.finalize_xof().fill(&mut okm);

        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        key.copy_from_slice(&okm[..32]);
        nonce.copy_from_slice(&okm[32..]);
        Self { key, nonce }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}
