//! Key registry error types.

use thiserror::Error;

/// Result type for COI key operations.
pub type Result<T> = std::result::Result<T, CoiError>;

#[derive(Debug, Error)]
pub enum CoiError {
    #[error("COI identifier must not be empty")]
    EmptyCoi,

    #[error("no key registered for COI '{0}'")]
    UnknownCoi(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, wrong associated data, or tampered ciphertext.
    #[error("authentication failed: ciphertext tampered or wrong key")]
    Decryption,

    #[error("malformed wrapped key: {0}")]
    MalformedWrappedKey(String),

    #[error("key store unavailable: {0}")]
    StoreUnavailable(String),
}
