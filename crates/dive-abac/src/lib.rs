//! # dive-abac: Coalition attribute-based access control
//!
//! Decisions are rendered by an external policy decision point (OPA); this
//! crate wraps it with the local concerns of a federated instance:
//!
//! - [`LocalDecisionEngine`]: validation, PDP delegation, obligations and
//!   the [`DecisionCache`] (SIEVE eviction, TTL, single-flight)
//! - [`BilateralTrustVerifier`]: pairwise trust ceilings for cross-instance
//!   requests
//! - [`replay`]: the six-step rule trace explaining a decision
//! - [`clearance`]: national clearance vocabularies mapped onto the
//!   canonical hierarchy
//! - [`provenance`]: where each subject attribute came from
//!
//! ```text
//! AccessRequest ──► BilateralTrustVerifier ──► LocalDecisionEngine ──► DecisionCache
//!                      (cross-instance)                │                    │ miss
//!                                                      └──────────────► PolicyDecisionPoint
//! ```

pub mod bilateral;
pub mod cache;
pub mod clearance;
pub mod engine;
pub mod pdp;
pub mod provenance;
pub mod replay;

pub use bilateral::{
    BilateralTrust, BilateralTrustTable, BilateralTrustVerifier, TrustDirectory, TrustLevel,
};
pub use cache::{CacheStats, DecisionCache, fingerprint};
pub use clearance::{translate_clearance, try_translate_clearance};
pub use engine::LocalDecisionEngine;
pub use pdp::{OpaClient, PdpDecision, PolicyDecisionPoint, PolicyInput};
pub use provenance::{Provenance, build_provenance};
pub use replay::{DecisionReplay, replay};
