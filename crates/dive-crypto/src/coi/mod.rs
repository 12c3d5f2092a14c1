//! COI key registry.
//!
//! Keys are created lazily: the first reference to an unknown COI generates
//! fresh key material (version 1) and every later lookup returns the same
//! bytes until the key is rotated.

mod selection;
mod store;

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use selection::{DEFAULT_COI, FVEY, NATO, coi_members, select_coi_for_resource};
pub use store::{CoiKeyStore, MemoryCoiKeyStore};

use crate::aes_gcm;
use crate::error::{CoiError, Result};

// -----------------------------------------------------------------------------
// Key material
// -----------------------------------------------------------------------------

/// 256-bit community key.
///
/// Key material is zeroed from memory when dropped and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CoiKey {
    key: [u8; 32],
}

impl CoiKey {
    /// Generates a key from system randomness.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        debug_assert_ne!(key, [0u8; 32], "COI key is all zeros (degenerate)");
        Self { key }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes (sensitive).
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl PartialEq for CoiKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for CoiKey {}

impl fmt::Debug for CoiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CoiKey([REDACTED])")
    }
}

// -----------------------------------------------------------------------------
// Entries
// -----------------------------------------------------------------------------

/// The current key of one community.
#[derive(Debug, Clone)]
pub struct CoiKeyEntry {
    pub coi: String,
    pub key: CoiKey,
    /// Starts at 1, incremented by every rotation.
    pub version: u32,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

impl CoiKeyEntry {
    /// A version 1 entry.
    pub fn new(coi: impl Into<String>, key: CoiKey, created_at: DateTime<Utc>) -> Self {
        Self {
            coi: coi.into(),
            key,
            version: 1,
            algorithm: aes_gcm::ALGORITHM.to_string(),
            created_at,
        }
    }

    /// Metadata without key material.
    pub fn info(&self) -> CoiKeyInfo {
        CoiKeyInfo {
            coi: self.coi.clone(),
            version: self.version,
            algorithm: self.algorithm.clone(),
            created_at: self.created_at,
            retired_at: None,
        }
    }
}

/// Key metadata, safe to log or display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoiKeyInfo {
    pub coi: String,
    pub version: u32,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoiKeyStats {
    pub total_keys: usize,
    /// Sorted COI identifiers.
    pub cois: Vec<String>,
    /// Highest key version across all communities (0 when empty).
    pub current_version: u32,
}

// -----------------------------------------------------------------------------
// Registry
// -----------------------------------------------------------------------------

/// Maps COI identifiers to stable keys through an injected [`CoiKeyStore`].
#[derive(Clone)]
pub struct CoiKeyRegistry {
    store: Arc<dyn CoiKeyStore>,
}

impl fmt::Debug for CoiKeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoiKeyRegistry").finish_non_exhaustive()
    }
}

impl CoiKeyRegistry {
    pub fn new(store: Arc<dyn CoiKeyStore>) -> Self {
        Self { store }
    }

    /// Registry backed by a fresh [`MemoryCoiKeyStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCoiKeyStore::new()))
    }

    /// Returns the current entry for `coi`, generating version 1 if unknown.
    pub fn get_entry(&self, coi: &str) -> Result<CoiKeyEntry> {
        if coi.trim().is_empty() {
            return Err(CoiError::EmptyCoi);
        }

        if let Some(entry) = self.store.get(coi)? {
            return Ok(entry);
        }

        let stored = self
            .store
            .set(CoiKeyEntry::new(coi, CoiKey::generate(), Utc::now()))?;
        info!(coi = %coi, version = stored.version, "generated COI key");
        Ok(stored)
    }

    /// Returns the key for `coi`.
    ///
    /// Deterministic per COI string until [`rotate_key`](Self::rotate_key).
    pub fn get_key(&self, coi: &str) -> Result<CoiKey> {
        self.get_entry(coi).map(|entry| entry.key)
    }

    /// Replaces the key material of `coi` and increments its version.
    ///
    /// Keys wrapped under the previous version can no longer be unwrapped
    /// through this registry.
    pub fn rotate_key(&self, coi: &str) -> Result<CoiKeyEntry> {
        let previous = self.get_entry(coi)?;
        let rotated = self.store.rotate(coi, CoiKey::generate(), Utc::now())?;
        info!(
            coi = %coi,
            from_version = previous.version,
            to_version = rotated.version,
            "rotated COI key"
        );
        Ok(rotated)
    }

    pub fn list_cois(&self) -> Result<Vec<String>> {
        let mut cois: Vec<String> = self.store.list()?.into_iter().map(|i| i.coi).collect();
        cois.sort();
        Ok(cois)
    }

    pub fn stats(&self) -> Result<CoiKeyStats> {
        let infos = self.store.list()?;
        let mut cois: Vec<String> = infos.iter().map(|i| i.coi.clone()).collect();
        cois.sort();
        Ok(CoiKeyStats {
            total_keys: infos.len(),
            cois,
            current_version: infos.iter().map(|i| i.version).max().unwrap_or(0),
        })
    }

    /// Retired versions of `coi`, oldest first.
    pub fn history(&self, coi: &str) -> Result<Vec<CoiKeyInfo>> {
        self.store.history(coi)
    }

    /// Wraps `dek` under the current key of `coi`.
    ///
    /// Returns base64 of `nonce || ciphertext || tag`. `aad` (normally the
    /// resource id) must be presented again to unwrap.
    pub fn wrap_key(&self, coi: &str, dek: &[u8], aad: &[u8]) -> Result<String> {
        let entry = self.get_entry(coi)?;
        let sealed = aes_gcm::seal(entry.key.as_bytes(), dek, aad)?;
        debug!(coi = %coi, version = entry.version, "wrapped DEK under COI key");
        Ok(STANDARD.encode(sealed))
    }

    /// Unwraps a key produced by [`wrap_key`](Self::wrap_key).
    ///
    /// Never creates a key: an unknown COI is an error.
    pub fn unwrap_key(&self, coi: &str, wrapped: &str, aad: &[u8]) -> Result<Vec<u8>> {
        let sealed = STANDARD
            .decode(wrapped.trim())
            .map_err(|e| CoiError::MalformedWrappedKey(e.to_string()))?;
        let entry = self
            .store
            .get(coi)?
            .ok_or_else(|| CoiError::UnknownCoi(coi.to_string()))?;
        aes_gcm::open(entry.key.as_bytes(), &sealed, aad)
    }
}
