//! AES-256-GCM authenticated encryption for key wrapping.
//!
//! Wrapped keys are laid out as `nonce (12 bytes) || ciphertext || tag`.
//! Nonces are drawn from the OS RNG for every wrap; COI keys wrap few
//! messages, well below the random-nonce birthday bound.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use crate::error::{CoiError, Result};

/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Algorithm label recorded on every COI key entry and KAO.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Encrypts `plaintext` under `key` with an explicit nonce.
///
/// Returns ciphertext with the authentication tag appended.
pub fn encrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    debug_assert_ne!(key, &[0u8; 32], "AES-256 key is all zeros (degenerate key)");

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CoiError::Encryption(e.to_string()))?;
    let payload = Payload {
        msg: plaintext,
        aad: associated_data,
    };

    cipher
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| CoiError::Encryption(e.to_string()))
}

/// Decrypts and authenticates `ciphertext` (with appended tag).
pub fn decrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CoiError::Decryption)?;
    let payload = Payload {
        msg: ciphertext,
        aad: associated_data,
    };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CoiError::Decryption)
}

/// Fresh random nonce.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts under a random nonce and prefixes the nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
    let nonce = random_nonce();
    let ciphertext = encrypt(key, &nonce, plaintext, associated_data)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Inverse of [`seal`].
pub fn open(key: &[u8; 32], sealed: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CoiError::MalformedWrappedKey(format!(
            "expected at least {} bytes, got {}",
            NONCE_LEN + TAG_LEN,
            sealed.len()
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(nonce);
    decrypt(key, &nonce_bytes, ciphertext, associated_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn test_encrypt_decrypt_with_explicit_nonce() {
        let nonce = [1u8; NONCE_LEN];
        let ciphertext = encrypt(&KEY, &nonce, b"dek bytes", b"aad").unwrap();
        assert_eq!(ciphertext.len(), b"dek bytes".len() + TAG_LEN);
        assert_eq!(decrypt(&KEY, &nonce, &ciphertext, b"aad").unwrap(), b"dek bytes");
    }

    #[test]
    fn test_seal_open() {
        let sealed = seal(&KEY, b"secret", b"doc-1").unwrap();
        assert_eq!(open(&KEY, &sealed, b"doc-1").unwrap(), b"secret");
    }

    #[test]
    fn test_wrong_associated_data_fails() {
        let sealed = seal(&KEY, b"secret", b"doc-1").unwrap();
        assert!(matches!(open(&KEY, &sealed, b"doc-2"), Err(CoiError::Decryption)));
    }

    #[test]
    fn test_tampering_detected() {
        let mut sealed = seal(&KEY, b"secret", b"").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(open(&KEY, &sealed, b""), Err(CoiError::Decryption)));
    }

    #[test]
    fn test_short_input_is_malformed() {
        assert!(matches!(
            open(&KEY, &[0u8; 10], b""),
            Err(CoiError::MalformedWrappedKey(_))
        ));
    }

    #[test]
    fn test_nonces_differ() {
        let a = seal(&KEY, b"same", b"").unwrap();
        let b = seal(&KEY, b"same", b"").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }
}
