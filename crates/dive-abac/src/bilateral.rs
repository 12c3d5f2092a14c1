//! Bilateral trust: pairwise agreements capping what one instance may
//! release to another.

use std::sync::Arc;
use std::time::Instant;

use dive_types::{
    AccessRequest, AuditEntry, AuditOutcome, AuthorizationDecision, Clearance, DecisionError,
    Result,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clearance::translate_clearance;
use crate::engine::LocalDecisionEngine;

pub const AUDIT_TRUST_CHECK: &str = "bilateral_trust_check";
pub const AUDIT_TRUST_VERIFIED: &str = "bilateral_trust_verified";
pub const AUDIT_TRUST_DENIED: &str = "bilateral_trust_denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// A trust agreement between two instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilateralTrust {
    pub instance_a: String,
    pub instance_b: String,
    /// Highest classification releasable across the pair.
    pub max_classification: Clearance,
    #[serde(default)]
    pub allowed_cois: Vec<String>,
    #[serde(default)]
    pub trust_level: TrustLevel,
}

impl BilateralTrust {
    pub fn new(instance_a: &str, instance_b: &str, max_classification: Clearance) -> Self {
        Self {
            instance_a: instance_a.to_string(),
            instance_b: instance_b.to_string(),
            max_classification,
            allowed_cois: Vec::new(),
            trust_level: TrustLevel::default(),
        }
    }

    pub fn with_cois<I, S>(mut self, cois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_cois = cois.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = level;
        self
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Read-only source of trust records. Never mutated during a request.
pub trait TrustDirectory: Send + Sync {
    /// The record governing access from `origin` to resources of `target`.
    fn lookup(&self, origin: &str, target: &str) -> Option<BilateralTrust>;

    fn list(&self) -> Vec<BilateralTrust>;
}

/// In-memory trust table.
///
/// Symmetric tables match a record in either direction; directional tables
/// only match `instance_a -> instance_b`.
#[derive(Debug, Clone, Default)]
pub struct BilateralTrustTable {
    records: Vec<BilateralTrust>,
    symmetric: bool,
}

impl BilateralTrustTable {
    pub fn new(records: Vec<BilateralTrust>, symmetric: bool) -> Self {
        Self { records, symmetric }
    }

    pub fn symmetric(records: Vec<BilateralTrust>) -> Self {
        Self::new(records, true)
    }

    pub fn directional(records: Vec<BilateralTrust>) -> Self {
        Self::new(records, false)
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }
}

impl TrustDirectory for BilateralTrustTable {
    fn lookup(&self, origin: &str, target: &str) -> Option<BilateralTrust> {
        let forward = |t: &&BilateralTrust| {
            t.instance_a.eq_ignore_ascii_case(origin) && t.instance_b.eq_ignore_ascii_case(target)
        };
        let backward = |t: &&BilateralTrust| {
            t.instance_a.eq_ignore_ascii_case(target) && t.instance_b.eq_ignore_ascii_case(origin)
        };

        self.records
            .iter()
            .find(forward)
            .or_else(|| {
                if self.symmetric {
                    self.records.iter().find(backward)
                } else {
                    None
                }
            })
            .cloned()
    }

    fn list(&self) -> Vec<BilateralTrust> {
        self.records.clone()
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Gates cross-instance requests on a trust record, then delegates to the
/// local engine.
pub struct BilateralTrustVerifier {
    directory: Arc<dyn TrustDirectory>,
    engine: Arc<LocalDecisionEngine>,
}

impl std::fmt::Debug for BilateralTrustVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BilateralTrustVerifier")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl BilateralTrustVerifier {
    pub fn new(directory: Arc<dyn TrustDirectory>, engine: Arc<LocalDecisionEngine>) -> Self {
        Self { directory, engine }
    }

    pub fn has_bilateral_trust(&self, instance_a: &str, instance_b: &str) -> bool {
        self.directory.lookup(instance_a, instance_b).is_some()
    }

    pub fn trusts(&self) -> Vec<BilateralTrust> {
        self.directory.list()
    }

    /// Evaluates a cross-instance request.
    ///
    /// 1. Deny without a trust record for the pair.
    /// 2. Deny when the resource classification exceeds the pair's ceiling.
    /// 3. Delegate to the local engine with the subject clearance translated
    ///    to the canonical hierarchy; for COI-tagged resources additionally
    ///    require a subject COI the agreement allows.
    ///
    /// The audit trail always gets `bilateral_trust_check` followed by
    /// exactly one of `bilateral_trust_verified` / `bilateral_trust_denied`.
    /// When the engine fails, both entries travel with the error
    /// ([`DecisionError::audit_trail`]), the second with outcome `error`.
    pub async fn evaluate_access_with_bilateral_trust(
        &self,
        request: &AccessRequest,
    ) -> Result<AuthorizationDecision> {
        let started = Instant::now();
        request.validate()?;

        let local = self.engine.instance_id();
        let origin = first_non_empty(&request.subject.origin_instance, &request.subject.country_of_affiliation);
        let target = first_non_empty(&request.resource.instance_id, local);
        let check = AuditEntry::new(local, AUDIT_TRUST_CHECK, AuditOutcome::Allow)
            .with_detail(format!("{origin} -> {target}"));

        let Some(trust) = self.directory.lookup(origin, target) else {
            let reason = DecisionError::NoBilateralTrust {
                origin: origin.to_string(),
                target: target.to_string(),
            }
            .to_string();
            return Ok(self.denied(check, reason, started));
        };

        let classification = request.resource.classification;
        if classification > trust.max_classification {
            let reason = DecisionError::ClassificationExceedsTrust {
                classification,
                limit: trust.max_classification,
            }
            .to_string();
            return Ok(self.denied(check, reason, started));
        }

        let translated = normalize_subject_clearance(request);
        let mut decision = match self.engine.evaluate_access(&translated).await {
            Ok(decision) => decision,
            Err(error) => {
                warn!(origin, target, error = %error, "bilateral evaluation failed");
                let failed = AuditEntry::new(local, AUDIT_TRUST_DENIED, AuditOutcome::Error)
                    .with_detail(error.to_string());
                return Err(error.with_audit_trail(vec![check, failed]));
            }
        };
        decision.audit_trail.insert(0, check);

        if decision.allow && !request.resource.coi.is_empty() && !translated.subject.shares_coi(&trust.allowed_cois) {
            decision.allow = false;
            decision.reason = format!(
                "No subject COI permitted by bilateral trust {origin} -> {target} (allowed: [{}])",
                trust.allowed_cois.join(", ")
            );
            decision.obligations.clear();
        }

        let (action, outcome) = if decision.allow {
            (AUDIT_TRUST_VERIFIED, AuditOutcome::Allow)
        } else {
            (AUDIT_TRUST_DENIED, AuditOutcome::Deny)
        };
        decision.push_audit(AuditEntry::new(local, action, outcome).with_detail(decision.reason.clone()));
        decision.execution_time_ms = elapsed_ms(started);

        info!(
            origin,
            target,
            allow = decision.allow,
            max_classification = %trust.max_classification,
            reason = %decision.reason,
            "bilateral trust evaluation"
        );
        Ok(decision)
    }

    fn denied(&self, check: AuditEntry, reason: String, started: Instant) -> AuthorizationDecision {
        warn!(reason = %reason, "bilateral trust denied");
        let mut decision = AuthorizationDecision::deny(reason);
        decision.push_audit(check);
        decision.push_audit(
            AuditEntry::new(self.engine.instance_id(), AUDIT_TRUST_DENIED, AuditOutcome::Deny)
                .with_detail(decision.reason.clone()),
        );
        decision.evaluation_details.latency_ms = elapsed_ms(started);
        decision.execution_time_ms = elapsed_ms(started);
        decision
    }
}

fn first_non_empty<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() { fallback } else { preferred }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Copy of `request` whose subject clearance is a canonical level name.
///
/// The national value is kept in `clearance_original`.
pub fn normalize_subject_clearance(request: &AccessRequest) -> AccessRequest {
    let mut normalized = request.clone();
    let subject = &mut normalized.subject;
    if Clearance::parse(&subject.clearance).is_none() {
        let level = translate_clearance(&subject.clearance, Some(&subject.country_of_affiliation));
        if subject.clearance_original.is_none() {
            subject.clearance_original = Some(subject.clearance.clone());
        }
        subject.clearance = level.as_str().to_string();
    }
    normalized
}
