//! Storage contract for COI keys.
//!
//! The registry never holds keys itself; it goes through a [`CoiKeyStore`] so
//! deployments can back keys with a document store or HSM, and tests can use
//! an isolated in-memory store per case.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{CoiKey, CoiKeyEntry, CoiKeyInfo};
use crate::error::{CoiError, Result};

/// Persistence contract for COI keys.
pub trait CoiKeyStore: Send + Sync {
    /// Returns the current entry for `coi`, if any.
    fn get(&self, coi: &str) -> Result<Option<CoiKeyEntry>>;

    /// Stores `entry` unless `coi` already has a key.
    ///
    /// Returns the entry that is stored after the call. When two callers race
    /// to create the same COI, the first writer wins and both observe its key.
    fn set(&self, entry: CoiKeyEntry) -> Result<CoiKeyEntry>;

    /// Replaces the key material of an existing COI and bumps its version.
    ///
    /// The previous version's metadata moves to the COI's history.
    fn rotate(&self, coi: &str, key: CoiKey, at: DateTime<Utc>) -> Result<CoiKeyEntry>;

    /// Metadata for every current key.
    fn list(&self) -> Result<Vec<CoiKeyInfo>>;

    /// Metadata for retired versions of `coi`, oldest first.
    fn history(&self, coi: &str) -> Result<Vec<CoiKeyInfo>>;
}

#[derive(Debug)]
struct Slot {
    current: CoiKeyEntry,
    retired: Vec<CoiKeyInfo>,
}

/// Process-local key store.
#[derive(Debug, Default)]
pub struct MemoryCoiKeyStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryCoiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> CoiError {
    CoiError::StoreUnavailable("key store lock poisoned".to_string())
}

impl CoiKeyStore for MemoryCoiKeyStore {
    fn get(&self, coi: &str) -> Result<Option<CoiKeyEntry>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.get(coi).map(|slot| slot.current.clone()))
    }

    fn set(&self, entry: CoiKeyEntry) -> Result<CoiKeyEntry> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots.entry(entry.coi.clone()).or_insert_with(|| Slot {
            current: entry,
            retired: Vec::new(),
        });
        Ok(slot.current.clone())
    }

    fn rotate(&self, coi: &str, key: CoiKey, at: DateTime<Utc>) -> Result<CoiKeyEntry> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots
            .get_mut(coi)
            .ok_or_else(|| CoiError::UnknownCoi(coi.to_string()))?;

        let mut retired = slot.current.info();
        retired.retired_at = Some(at);
        slot.retired.push(retired);

        slot.current = CoiKeyEntry {
            coi: coi.to_string(),
            key,
            version: slot.current.version + 1,
            algorithm: slot.current.algorithm.clone(),
            created_at: at,
        };
        Ok(slot.current.clone())
    }

    fn list(&self) -> Result<Vec<CoiKeyInfo>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.values().map(|slot| slot.current.info()).collect())
    }

    fn history(&self, coi: &str) -> Result<Vec<CoiKeyInfo>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots
            .get(coi)
            .map(|slot| slot.retired.clone())
            .unwrap_or_default())
    }
}
