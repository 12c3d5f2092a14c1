//! # dive-federation: Federated authorization and key release
//!
//! The entry point of a DIVE instance. [`FederationOrchestrator`] answers
//! single-resource decisions (routing cross-instance requests through
//! bilateral trust), explains them, and fans federated searches out to
//! partner instances. [`KeyReleaseCoordinator`] turns an allow decision
//! carrying a `KAS_KEY_REQUEST` obligation into a DEK, using the local COI
//! key registry or an external KAS.
//!
//! ```text
//!                 ┌──────────────────────────┐
//! AccessRequest ─►│  FederationOrchestrator  │──► AuditSink
//!                 └────┬──────────────┬──────┘
//!                      │              │ query_federated_resources
//!        BilateralTrustVerifier   JoinSet ─► partner instances
//!                      │
//!              LocalDecisionEngine ─► OPA
//!
//! allow + KAS_KEY_REQUEST ─► KeyReleaseCoordinator ─► CoiKeyRegistry | KasClient
//! ```

pub mod audit;
mod error;
pub mod key_release;
pub mod orchestrator;
pub mod search;

pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::{AttemptFailure, FederationError, KeyReleaseAttempt, KeyReleaseError, Result};
pub use key_release::{KeyReleaseCoordinator, KeySource, ReleasedKey};
pub use orchestrator::{
    FailedQuery, FanOutSettings, FederatedQueryResult, FederationOrchestrator, InstanceResult,
    OrchestratorBuilder, QueryStats,
};
pub use search::{
    FederatedQuery, FederatedResource, FederatedSearchClient, FederationInstance,
    HttpFederatedSearchClient, InstanceSearchResponse,
};
