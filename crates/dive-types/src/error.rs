//! Decision error taxonomy.
//!
//! Policy denials and system faults are distinct variants so callers never
//! mistake "could not reach the PDP/KAS" for "denied by policy".

use std::fmt::{self, Display};

use thiserror::Error;

use crate::clearance::Clearance;
use crate::decision::AuditEntry;

/// Result type for decision operations.
pub type Result<T> = std::result::Result<T, DecisionError>;

/// A failed call to a remote collaborator (PDP, KAS, partner instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalServiceError {
    /// Which collaborator failed (e.g. "opa", "kas:fra-kas").
    pub service: String,
    /// HTTP status, if the remote answered.
    pub status: Option<u16>,
    /// Original error message or response body.
    pub message: String,
}

impl ExternalServiceError {
    pub fn new(service: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status,
            message: message.into(),
        }
    }
}

impl Display for ExternalServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} request failed with status {status}: {}",
                self.service, self.message
            ),
            None => write!(f, "{} request failed: {}", self.service, self.message),
        }
    }
}

impl std::error::Error for ExternalServiceError {}

#[derive(Debug, Error)]
pub enum DecisionError {
    /// Access denied by policy.
    #[error("Access denied: {reason}")]
    Denied { reason: String },

    /// Malformed subject or resource input.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Resource, KAO or instance absent.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No bilateral trust between {origin} and {target}")]
    NoBilateralTrust { origin: String, target: String },

    #[error("Classification {classification} exceeds bilateral trust limit {limit}")]
    ClassificationExceedsTrust {
        classification: Clearance,
        limit: Clearance,
    },

    /// Network failure, timeout or non-2xx from a remote collaborator.
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),

    /// The decision cache could not be used; callers degrade to direct compute.
    #[error("Decision cache unavailable: {0}")]
    CacheUnavailable(String),

    /// An error raised part-way through an audited evaluation, with the
    /// entries recorded before and at the failure.
    #[error("{error}")]
    Audited {
        error: Box<DecisionError>,
        audit_trail: Vec<AuditEntry>,
    },
}

impl DecisionError {
    /// Attaches the audit entries recorded so far.
    pub fn with_audit_trail(self, audit_trail: Vec<AuditEntry>) -> Self {
        match self {
            Self::Audited {
                error,
                audit_trail: mut earlier,
            } => {
                earlier.extend(audit_trail);
                Self::Audited {
                    error,
                    audit_trail: earlier,
                }
            }
            error => Self::Audited {
                error: Box::new(error),
                audit_trail,
            },
        }
    }

    /// The underlying error, without any attached audit trail.
    pub fn root(&self) -> &DecisionError {
        match self {
            Self::Audited { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn audit_trail(&self) -> &[AuditEntry] {
        match self {
            Self::Audited { audit_trail, .. } => audit_trail,
            _ => &[],
        }
    }

    /// True for system faults (as opposed to policy outcomes or bad input).
    pub fn is_fault(&self) -> bool {
        matches!(self.root(), Self::ExternalService(_) | Self::CacheUnavailable(_))
    }

    /// True when the error is a policy verdict rather than a failure.
    pub fn is_policy_denial(&self) -> bool {
        matches!(
            self.root(),
            Self::Denied { .. } | Self::NoBilateralTrust { .. } | Self::ClassificationExceedsTrust { .. }
        )
    }
}
