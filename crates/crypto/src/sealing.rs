//! Salt sealing at rest with ChaCha20-Poly1305.
//!
//! Sealed form is `nonce (12 bytes) || ciphertext+tag`. The commitment the
//! salt belongs to is used as associated data, so a sealed salt cannot be
//! swapped onto another registry row.

use crate::commitment::Salt;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum SealingError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: sealed salt is corrupt or bound to another record")]
    Decryption,

    #[error("Sealed salt too short: {0} bytes")]
    Truncated(usize),
}

pub type SealingResult<T> = Result<T, SealingError>;

#[derive(Clone)]
pub struct SaltSealer {
    cipher: ChaCha20Poly1305,
}

impl SaltSealer {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Zeroizing::new(*key);
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_slice())),
        }
    }

    pub fn seal(&self, salt: &Salt, associated_data: &[u8]) -> SealingResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: salt.as_bytes(),
                    aad: associated_data,
                },
            )
            .map_err(|e| SealingError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8], associated_data: &[u8]) -> SealingResult<Salt> {
        if sealed.len() <= NONCE_SIZE {
            return Err(SealingError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| SealingError::Decryption)?;
        Ok(Salt::from_bytes(plaintext))
    }
}

impl std::fmt::Debug for SaltSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltSealer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let sealer = SaltSealer::new(&[7u8; 32]);
        let salt = Salt::from_bytes(vec![1u8; 32]);
        let sealed = sealer.seal(&salt, b"commitment-a").unwrap();
        assert_ne!(&sealed[NONCE_SIZE..NONCE_SIZE + 32], salt.as_bytes());
        assert_eq!(sealer.open(&sealed, b"commitment-a").unwrap(), salt);
    }

    #[test]
    fn test_wrong_binding_or_key_fails() {
        let sealer = SaltSealer::new(&[7u8; 32]);
        let salt = Salt::from_bytes(vec![1u8; 32]);
        let sealed = sealer.seal(&salt, b"commitment-a").unwrap();
        assert!(matches!(
            sealer.open(&sealed, b"commitment-b"),
            Err(SealingError::Decryption)
        ));
        assert!(SaltSealer::new(&[8u8; 32]).open(&sealed, b"commitment-a").is_err());
        assert!(matches!(
            sealer.open(&sealed[..5], b"commitment-a"),
            Err(SealingError::Truncated(5))
        ));
    }

    #[test]
    fn test_nonces_differ() {
        let sealer = SaltSealer::new(&[7u8; 32]);
        let salt = Salt::from_bytes(vec![1u8; 32]);
        assert_ne!(sealer.seal(&salt, b"c").unwrap(), sealer.seal(&salt, b"c").unwrap());
    }
}
