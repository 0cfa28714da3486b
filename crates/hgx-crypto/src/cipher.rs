use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::secret::Secret;

/// Errors from payload sealing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed")]
    Encryption,
    /// Authentication tag mismatch: wrong secret or tampered ciphertext.
    #[error("decryption failed: wrong secret or tampered payload")]
    Decryption,
}

/// Encrypt `plaintext` under `secret`.
pub fn seal(plaintext: &[u8], secret: &Secret) -> Result<Vec<u8>, CipherError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.key()));
    cipher
        .encrypt(Nonce::from_slice(secret.nonce()), plaintext)
        .map_err(|_| CipherError::Encryption)
}

/// Decrypt and authenticate `ciphertext` under `secret`.
pub fn open(ciphertext: &[u8], secret: &Secret) -> Result<Vec<u8>, CipherError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.key()));
    cipher
        .decrypt(Nonce::from_slice(secret.nonce()), ciphertext)
        .map_err(|_| CipherError::Decryption)
}
