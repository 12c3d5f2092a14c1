//! # dive-crypto: Community-of-Interest keys
//!
//! Every COI has one symmetric 256-bit key. A DEK wrapped under a COI key can
//! be unwrapped by any member of that community, so a nation joining the
//! community gains access to historical resources without re-encryption.
//!
//! ```text
//! releasabilityTo + COI tags ──► select_coi_for_resource ──► "FVEY"
//!                                                               │
//!                         CoiKeyRegistry::get_key("FVEY") ◄─────┘
//!                                  │
//!                          CoiKeyStore (get / set / rotate)
//! ```
//!
//! # Example
//!
//! ```
//! use dive_crypto::{CoiKeyRegistry, select_coi_for_resource};
//!
//! let registry = CoiKeyRegistry::in_memory();
//! let coi = select_coi_for_resource(&["USA".into(), "CAN".into()], &[]);
//! assert_eq!(coi, "CAN-US");
//!
//! let wrapped = registry.wrap_key(&coi, &[7u8; 32], b"doc-1").unwrap();
//! let dek = registry.unwrap_key(&coi, &wrapped, b"doc-1").unwrap();
//! assert_eq!(dek, vec![7u8; 32]);
//! ```

pub mod aes_gcm;
pub mod coi;
mod error;

pub use coi::{
    CoiKey, CoiKeyEntry, CoiKeyInfo, CoiKeyRegistry, CoiKeyStats, CoiKeyStore, MemoryCoiKeyStore,
    coi_members, select_coi_for_resource,
};
pub use error::{CoiError, Result};
