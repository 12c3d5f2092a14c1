//! Authorization decisions, obligations, audit entries and replay steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecisionError;

/// Well-known obligation types.
pub mod obligation {
    /// Access crosses instance boundaries and must be audited as federated.
    pub const AUDIT_FEDERATED_ACCESS: &str = "AUDIT_FEDERATED_ACCESS";
    /// Subject nation differs from the resource's originating nation.
    pub const MARK_COALITION_ACCESS: &str = "MARK_COALITION_ACCESS";
    /// The caller must obtain the DEK from a KAS before serving content.
    pub const KAS_KEY_REQUEST: &str = "KAS_KEY_REQUEST";
}

// ============================================================================
// Obligations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    #[default]
    Pending,
    Fulfilled,
    Failed,
}

/// An action the enforcement point must carry out alongside an allow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: ObligationStatus,
    /// Obligation-specific parameters, flattened onto the wire object.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Obligation {
    /// A pending obligation with no parameters.
    pub fn pending(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            status: ObligationStatus::Pending,
            params: Map::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Allow,
    Deny,
    Error,
}

/// One step in a decision's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub instance_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(instance_id: &str, action: &str, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            instance_id: instance_id.to_string(),
            action: action.to_string(),
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// Decision
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetails {
    pub cache_hit: bool,
    /// The local PDP's verdict, when one was obtained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_decision: Option<bool>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
}

/// The outcome of one authorization evaluation.
///
/// Immutable once returned to the caller. A denial always carries a
/// non-empty `reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    pub allow: bool,
    pub reason: String,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub audit_trail: Vec<AuditEntry>,
    #[serde(default)]
    pub evaluation_details: EvaluationDetails,
    pub execution_time_ms: u64,
}

impl AuthorizationDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::with_verdict(true, reason.into())
    }

    /// A denial. An empty reason is replaced so the invariant holds.
    pub fn deny(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "Access denied".to_string()
        } else {
            reason
        };
        Self::with_verdict(false, reason)
    }

    fn with_verdict(allow: bool, reason: String) -> Self {
        Self {
            allow,
            reason,
            obligations: Vec::new(),
            audit_trail: Vec::new(),
            evaluation_details: EvaluationDetails::default(),
            execution_time_ms: 0,
        }
    }

    pub fn has_obligation(&self, kind: &str) -> bool {
        self.obligations.iter().any(|o| o.kind == kind)
    }

    /// Adds an obligation unless one of the same type is already attached.
    pub fn add_obligation(&mut self, obligation: Obligation) {
        if !self.has_obligation(&obligation.kind) {
            self.obligations.push(obligation);
        }
    }

    pub fn push_audit(&mut self, entry: AuditEntry) {
        self.audit_trail.push(entry);
    }

    /// Converts a denial into `DecisionError::Denied`.
    pub fn require_allow(self) -> Result<Self, DecisionError> {
        if self.allow {
            Ok(self)
        } else {
            Err(DecisionError::Denied {
                reason: self.reason,
            })
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepResult {
    Pass,
    Fail,
}

/// One labeled predicate in a decision replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub rule: String,
    pub result: StepResult,
    pub reason: String,
}

impl ReplayStep {
    pub fn pass(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            result: StepResult::Pass,
            reason: reason.into(),
        }
    }

    pub fn fail(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            result: StepResult::Fail,
            reason: reason.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.result == StepResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obligation_wire_shape() {
        let ob = Obligation::pending(obligation::KAS_KEY_REQUEST).with_param("resourceId", "doc-1");
        let json = serde_json::to_value(&ob).unwrap();
        assert_eq!(json["type"], "KAS_KEY_REQUEST");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["resourceId"], "doc-1");
    }

    #[test]
    fn test_deny_never_has_empty_reason() {
        let decision = AuthorizationDecision::deny("  ");
        assert!(!decision.allow);
        assert_eq!(decision.reason, "Access denied");
    }

    #[test]
    fn test_add_obligation_deduplicates() {
        let mut decision = AuthorizationDecision::allow("ok");
        decision.add_obligation(Obligation::pending(obligation::MARK_COALITION_ACCESS));
        decision.add_obligation(Obligation::pending(obligation::MARK_COALITION_ACCESS));
        assert_eq!(decision.obligations.len(), 1);
    }

    #[test]
    fn test_require_allow() {
        assert!(AuthorizationDecision::allow("ok").require_allow().is_ok());
        let err = AuthorizationDecision::deny("clearance").require_allow().unwrap_err();
        assert!(err.is_policy_denial());
        assert!(!err.is_fault());
    }

    #[test]
    fn test_step_result_serializes_uppercase() {
        let step = ReplayStep::fail("is_under_embargo", "future");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["result"], "FAIL");
    }
}
