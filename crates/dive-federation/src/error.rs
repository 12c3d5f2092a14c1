//! Federation error types.

use std::fmt;

use dive_config::ConfigError;
use dive_crypto::CoiError;
use dive_kas::KasError;
use dive_types::DecisionError;
use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, FederationError>;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Kas(#[from] KasError),

    #[error(transparent)]
    Crypto(#[from] CoiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown federation instance '{0}'")]
    UnknownInstance(String),

    /// A partner instance failed a federated search call.
    #[error("federated search on {instance} failed: {message}")]
    Search {
        instance: String,
        status: Option<u16>,
        message: String,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Why one KAO could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The KAO's policy binding or the KAS refused the subject.
    Denied(String),
    /// The key could not be recovered for a non-policy reason.
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReleaseAttempt {
    pub kao_id: String,
    pub kas_id: String,
    pub failure: AttemptFailure,
}

impl KeyReleaseAttempt {
    pub fn is_denial(&self) -> bool {
        matches!(self.failure, AttemptFailure::Denied(_))
    }
}

impl fmt::Display for KeyReleaseAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            AttemptFailure::Denied(reason) => {
                write!(f, "{} via {}: denied ({reason})", self.kao_id, self.kas_id)
            }
            AttemptFailure::Fault(message) => {
                write!(f, "{} via {}: {message}", self.kao_id, self.kas_id)
            }
        }
    }
}

/// Key release failure.
///
/// `Denied` and `Fault` are never conflated: a caller can always tell
/// "refused by policy" from "could not reach a KAS".
#[derive(Debug, Error)]
pub enum KeyReleaseError {
    /// The authorization decision does not permit key release.
    #[error("key release not authorized: {0}")]
    NotAuthorized(String),

    #[error("resource {0} carries no key access objects")]
    NoKeyAccessObjects(String),

    /// Every KAO was refused on policy grounds.
    #[error("key release denied by policy: {reason}")]
    Denied {
        reason: String,
        attempts: Vec<KeyReleaseAttempt>,
    },

    /// At least one KAO failed for a non-policy reason and none succeeded.
    #[error("key release failed: {}", summarize(.attempts))]
    Fault { attempts: Vec<KeyReleaseAttempt> },
}

impl KeyReleaseError {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    pub fn is_policy_denial(&self) -> bool {
        matches!(self, Self::Denied { .. } | Self::NotAuthorized(_))
    }

    pub fn attempts(&self) -> &[KeyReleaseAttempt] {
        match self {
            Self::Denied { attempts, .. } | Self::Fault { attempts } => attempts,
            _ => &[],
        }
    }
}

fn summarize(attempts: &[KeyReleaseAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
