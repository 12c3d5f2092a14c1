//! Local decision engine: validation, caching, PDP delegation and
//! obligation attachment.

use std::sync::Arc;
use std::time::Instant;

use dive_types::{
    AccessRequest, Action, AuditEntry, AuditOutcome, AuthorizationDecision, DecisionError,
    Obligation, Result, obligation,
};
use tracing::{info, warn};

use crate::cache::{CacheStats, DecisionCache, fingerprint};
use crate::pdp::{PolicyDecisionPoint, PolicyInput};

pub const AUDIT_LOCAL_EVALUATION: &str = "local_evaluation";
pub const AUDIT_CACHE_HIT: &str = "cache_hit";

/// Delegates ABAC decisions to a PDP and memoizes them.
pub struct LocalDecisionEngine {
    pdp: Arc<dyn PolicyDecisionPoint>,
    cache: DecisionCache,
    instance_id: String,
}

impl std::fmt::Debug for LocalDecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDecisionEngine")
            .field("instance_id", &self.instance_id)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl LocalDecisionEngine {
    pub fn new(
        pdp: Arc<dyn PolicyDecisionPoint>,
        cache: DecisionCache,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            pdp,
            cache,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Evaluates `request`.
    ///
    /// Malformed input and PDP failures are errors; they never become an
    /// allow. A repeat of a cached fingerprint within the TTL does not call
    /// the PDP and reports `cacheHit = true`.
    pub async fn evaluate_access(&self, request: &AccessRequest) -> Result<AuthorizationDecision> {
        let started = Instant::now();
        request.validate()?;

        let key = fingerprint(request);
        let cached = self
            .cache
            .get_or_compute(&key, || self.evaluate_uncached(request))
            .await?;

        let mut decision = cached.decision;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        decision.evaluation_details.cache_hit = cached.cache_hit;
        decision.execution_time_ms = elapsed;
        if cached.cache_hit {
            decision.evaluation_details.latency_ms = elapsed;
            decision.push_audit(
                AuditEntry::new(&self.instance_id, AUDIT_CACHE_HIT, outcome(decision.allow))
                    .with_detail(format!("fingerprint {}", &key[..16])),
            );
        }

        Ok(decision)
    }

    async fn evaluate_uncached(&self, request: &AccessRequest) -> Result<AuthorizationDecision> {
        let started = Instant::now();
        let input = PolicyInput::from(request);

        let verdict = match self.pdp.evaluate(&input).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(
                    subject = %request.subject.unique_id,
                    resource = %request.resource.resource_id,
                    error = %error,
                    "PDP evaluation failed"
                );
                return Err(DecisionError::ExternalService(error));
            }
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut decision = if verdict.allow {
            AuthorizationDecision::allow(verdict.reason)
        } else {
            AuthorizationDecision::deny(verdict.reason)
        };
        decision.evaluation_details.local_decision = Some(verdict.allow);
        decision.evaluation_details.latency_ms = latency_ms;
        decision.evaluation_details.decision_id = verdict.decision_id;

        if decision.allow {
            for obligation in verdict.obligations {
                decision.add_obligation(obligation);
            }
            self.attach_obligations(request, &mut decision);
        }

        decision.push_audit(
            AuditEntry::new(&self.instance_id, AUDIT_LOCAL_EVALUATION, outcome(decision.allow))
                .with_detail(decision.reason.clone()),
        );

        info!(
            subject = %request.subject.unique_id,
            resource = %request.resource.resource_id,
            action = %request.action,
            allow = decision.allow,
            reason = %decision.reason,
            latency_ms,
            "access decision"
        );

        Ok(decision)
    }

    /// Obligations added to every allow, on top of those from the PDP.
    fn attach_obligations(&self, request: &AccessRequest, decision: &mut AuthorizationDecision) {
        let subject = &request.subject;
        let resource = &request.resource;

        if !resource.instance_id.is_empty() && resource.instance_id != self.instance_id {
            decision.add_obligation(
                Obligation::pending(obligation::AUDIT_FEDERATED_ACCESS)
                    .with_param("originInstance", resource.instance_id.clone())
                    .with_param("accessingInstance", self.instance_id.clone()),
            );
        }

        if let Some(origin) = resource.originating_country() {
            if origin != subject.country_of_affiliation {
                decision.add_obligation(
                    Obligation::pending(obligation::MARK_COALITION_ACCESS)
                        .with_param("subjectCountry", subject.country_of_affiliation.clone())
                        .with_param("resourceCountry", origin.to_string()),
                );
            }
        }

        if request.action == Action::Decrypt {
            decision.add_obligation(
                Obligation::pending(obligation::KAS_KEY_REQUEST)
                    .with_param("resourceId", resource.resource_id.clone()),
            );
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!(instance = %self.instance_id, "decision cache cleared");
    }
}

pub(crate) fn outcome(allow: bool) -> AuditOutcome {
    if allow {
        AuditOutcome::Allow
    } else {
        AuditOutcome::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use dive_types::{
        Clearance, ExternalServiceError, RequestContext, ResourceSecurityLabel, SubjectAttributes,
    };

    use crate::pdp::PdpDecision;

    /// PDP that allows everything and counts calls.
    struct CountingPdp {
        allow: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PolicyDecisionPoint for CountingPdp {
        async fn evaluate(
            &self,
            _input: &PolicyInput<'_>,
        ) -> std::result::Result<PdpDecision, ExternalServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PdpDecision {
                allow: self.allow,
                reason: if self.allow { "ok" } else { "Insufficient clearance" }.to_string(),
                obligations: Vec::new(),
                decision_id: None,
            })
        }
    }

    struct DownPdp;

    #[async_trait]
    impl PolicyDecisionPoint for DownPdp {
        async fn evaluate(
            &self,
            _input: &PolicyInput<'_>,
        ) -> std::result::Result<PdpDecision, ExternalServiceError> {
            Err(ExternalServiceError::new("opa", None, "connection refused"))
        }
    }

    fn engine(pdp: Arc<dyn PolicyDecisionPoint>) -> LocalDecisionEngine {
        LocalDecisionEngine::new(pdp, DecisionCache::new(16, Duration::from_secs(60)), "USA")
    }

    fn request(action: &str, instance: &str) -> AccessRequest {
        AccessRequest::new(
            SubjectAttributes::new("john", "SECRET", "USA").with_coi(["FVEY"]).with_origin("USA"),
            ResourceSecurityLabel::new("doc-1", Clearance::Secret, &["USA", "GBR"])
                .with_coi(["FVEY"])
                .with_instance(instance),
            action,
            RequestContext::now("req-1"),
        )
    }

    #[tokio::test]
    async fn test_second_evaluation_hits_cache() {
        let pdp = Arc::new(CountingPdp {
            allow: true,
            calls: AtomicUsize::new(0),
        });
        let engine = engine(pdp.clone());

        let first = engine.evaluate_access(&request("read", "USA")).await.unwrap();
        let mut again = request("read", "USA");
        again.context.request_id = "req-2".into();
        let second = engine.evaluate_access(&again).await.unwrap();

        assert!(!first.evaluation_details.cache_hit);
        assert!(second.evaluation_details.cache_hit);
        assert_eq!(pdp.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cache_stats().hits, 1);
        assert!(second.audit_trail.iter().any(|e| e.action == AUDIT_CACHE_HIT));
    }

    #[tokio::test]
    async fn test_obligations_for_foreign_decrypt() {
        let engine = engine(Arc::new(CountingPdp {
            allow: true,
            calls: AtomicUsize::new(0),
        }));
        let decision = engine.evaluate_access(&request("decrypt", "GBR")).await.unwrap();

        assert!(decision.has_obligation(obligation::AUDIT_FEDERATED_ACCESS));
        assert!(decision.has_obligation(obligation::MARK_COALITION_ACCESS));
        assert!(decision.has_obligation(obligation::KAS_KEY_REQUEST));
    }

    #[tokio::test]
    async fn test_no_obligations_for_local_read() {
        let engine = engine(Arc::new(CountingPdp {
            allow: true,
            calls: AtomicUsize::new(0),
        }));
        let decision = engine.evaluate_access(&request("read", "USA")).await.unwrap();
        assert!(decision.obligations.is_empty());
        assert_eq!(decision.evaluation_details.local_decision, Some(true));
    }

    #[tokio::test]
    async fn test_denial_carries_reason_and_no_obligations() {
        let engine = engine(Arc::new(CountingPdp {
            allow: false,
            calls: AtomicUsize::new(0),
        }));
        let decision = engine.evaluate_access(&request("decrypt", "GBR")).await.unwrap();
        assert!(!decision.allow);
        assert_eq!(decision.reason, "Insufficient clearance");
        assert!(decision.obligations.is_empty());
        assert_eq!(decision.audit_trail[0].outcome, AuditOutcome::Deny);
    }

    #[tokio::test]
    async fn test_pdp_failure_is_fault_not_allow() {
        let engine = engine(Arc::new(DownPdp));
        let err = engine.evaluate_access(&request("read", "USA")).await.unwrap_err();
        assert!(err.is_fault());
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_pdp() {
        let pdp = Arc::new(CountingPdp {
            allow: true,
            calls: AtomicUsize::new(0),
        });
        let engine = engine(pdp.clone());
        let mut bad = request("read", "USA");
        bad.subject.unique_id = String::new();

        let err = engine.evaluate_access(&bad).await.unwrap_err();
        assert!(matches!(err, DecisionError::Validation(_)));
        assert_eq!(pdp.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_pdp_call() {
        let pdp = Arc::new(CountingPdp {
            allow: true,
            calls: AtomicUsize::new(0),
        });
        let engine = engine(pdp.clone());
        engine.evaluate_access(&request("read", "USA")).await.unwrap();
        engine.clear_cache();
        engine.evaluate_access(&request("read", "USA")).await.unwrap();
        assert_eq!(pdp.calls.load(Ordering::SeqCst), 2);
    }
}
