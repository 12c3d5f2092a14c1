//! Federated authorization orchestrator.
//!
//! Routes single-resource decisions to the local engine or, for
//! cross-instance requests, through bilateral trust first. Fans federated
//! searches out to partner instances with bounded concurrency, a per-instance
//! timeout and an overall deadline; a failing partner never fails the query.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dive_abac::bilateral::normalize_subject_clearance;
use dive_abac::{
    BilateralTrust, BilateralTrustTable, BilateralTrustVerifier, CacheStats, DecisionCache,
    DecisionReplay, LocalDecisionEngine, OpaClient, TrustDirectory, replay,
};
use dive_config::DiveConfig;
use dive_types::{
    AccessRequest, AuditEntry, AuditOutcome, AuthorizationDecision, DecisionError,
    SubjectAttributes,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::error::Result;
use crate::search::{
    FederatedQuery, FederatedResource, FederatedSearchClient, FederationInstance,
    HttpFederatedSearchClient, InstanceSearchResponse,
};

pub const AUDIT_FEDERATED_SEARCH: &str = "federated_search";

// ============================================================================
// Query results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedQuery {
    pub instance: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResult {
    pub latency_ms: u64,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub instances_queried: usize,
    /// Wall-clock time of the whole fan-out.
    pub total_latency_ms: u64,
    pub failed_queries: Vec<FailedQuery>,
    pub instance_results: HashMap<String, InstanceResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedQueryResult {
    pub results: Vec<FederatedResource>,
    pub total_resources: usize,
    /// Instances that answered successfully.
    pub federated_from: Vec<String>,
    pub query_stats: QueryStats,
}

/// Fan-out limits.
#[derive(Debug, Clone, Copy)]
pub struct FanOutSettings {
    pub query_timeout: Duration,
    pub deadline: Duration,
    pub max_concurrency: usize,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(30),
            max_concurrency: 8,
        }
    }
}

struct InstanceOutcome {
    code: String,
    latency_ms: u64,
    outcome: std::result::Result<InstanceSearchResponse, String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct FederationOrchestrator {
    engine: Arc<LocalDecisionEngine>,
    verifier: BilateralTrustVerifier,
    instances: Vec<FederationInstance>,
    search: Arc<dyn FederatedSearchClient>,
    audit: Arc<dyn AuditSink>,
    settings: FanOutSettings,
}

impl std::fmt::Debug for FederationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationOrchestrator")
            .field("instance_id", &self.engine.instance_id())
            .field("instances", &self.instances)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FederationOrchestrator`].
pub struct OrchestratorBuilder {
    engine: Arc<LocalDecisionEngine>,
    directory: Arc<dyn TrustDirectory>,
    instances: Vec<FederationInstance>,
    search: Option<Arc<dyn FederatedSearchClient>>,
    audit: Arc<dyn AuditSink>,
    settings: FanOutSettings,
}

impl OrchestratorBuilder {
    pub fn instances(mut self, instances: impl IntoIterator<Item = FederationInstance>) -> Self {
        self.instances = instances.into_iter().collect();
        self
    }

    pub fn search_client(mut self, client: Arc<dyn FederatedSearchClient>) -> Self {
        self.search = Some(client);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn settings(mut self, settings: FanOutSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<FederationOrchestrator> {
        let search = match self.search {
            Some(search) => search,
            None => Arc::new(HttpFederatedSearchClient::new(
                self.engine.instance_id(),
                self.settings.query_timeout,
            )?),
        };

        Ok(FederationOrchestrator {
            verifier: BilateralTrustVerifier::new(self.directory, Arc::clone(&self.engine)),
            engine: self.engine,
            instances: self.instances,
            search,
            audit: self.audit,
            settings: FanOutSettings {
                max_concurrency: self.settings.max_concurrency.max(1),
                ..self.settings
            },
        })
    }
}

impl FederationOrchestrator {
    pub fn builder(
        engine: Arc<LocalDecisionEngine>,
        directory: Arc<dyn TrustDirectory>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            engine,
            directory,
            instances: Vec::new(),
            search: None,
            audit: Arc::new(TracingAuditSink),
            settings: FanOutSettings::default(),
        }
    }

    /// Wires OPA, the decision cache, the trust table and partner instances
    /// from configuration.
    pub fn from_config(config: &DiveConfig) -> Result<Self> {
        config.validate()?;

        let opa = OpaClient::new(&config.opa.url, &config.opa.decision_path, config.opa.timeout())
            .map_err(DecisionError::ExternalService)?;
        let engine = LocalDecisionEngine::new(
            Arc::new(opa),
            DecisionCache::new(config.cache.capacity, config.cache.ttl()),
            config.instance.id.clone(),
        );
        let directory =
            BilateralTrustTable::new(config.trust.bilateral.clone(), config.trust.symmetric);

        Self::builder(Arc::new(engine), Arc::new(directory))
            .instances(config.federation.instances.iter().map(FederationInstance::from))
            .settings(FanOutSettings {
                query_timeout: config.federation.query_timeout(),
                deadline: config.federation.deadline(),
                max_concurrency: config.federation.max_concurrency,
            })
            .build()
    }

    pub fn instance_id(&self) -> &str {
        self.engine.instance_id()
    }

    pub fn instances(&self) -> &[FederationInstance] {
        &self.instances
    }

    /// Evaluates a single-resource request.
    ///
    /// Requests for resources owned by another instance go through bilateral
    /// trust; everything else goes straight to the local engine.
    pub async fn evaluate_access(&self, request: &AccessRequest) -> Result<AuthorizationDecision> {
        let resource_instance = &request.resource.instance_id;
        let foreign_resource =
            !resource_instance.is_empty() && !resource_instance.eq_ignore_ascii_case(self.instance_id());

        let decision = if foreign_resource || request.is_cross_instance() {
            self.verifier.evaluate_access_with_bilateral_trust(request).await
        } else {
            self.engine.evaluate_access(request).await
        };
        self.finish(request, decision)
    }

    pub async fn evaluate_access_with_bilateral_trust(
        &self,
        request: &AccessRequest,
    ) -> Result<AuthorizationDecision> {
        let decision = self.verifier.evaluate_access_with_bilateral_trust(request).await;
        self.finish(request, decision)
    }

    fn finish(
        &self,
        request: &AccessRequest,
        decision: dive_types::Result<AuthorizationDecision>,
    ) -> Result<AuthorizationDecision> {
        let request_id = &request.context.request_id;
        match decision {
            Ok(decision) => {
                for entry in &decision.audit_trail {
                    self.audit.record(request_id, entry);
                }
                Ok(decision)
            }
            Err(error) => {
                if error.audit_trail().is_empty() {
                    let entry =
                        AuditEntry::new(self.instance_id(), "evaluate_access", AuditOutcome::Error)
                            .with_detail(error.to_string());
                    self.audit.record(request_id, &entry);
                } else {
                    for entry in error.audit_trail() {
                        self.audit.record(request_id, entry);
                    }
                }
                Err(error.into())
            }
        }
    }

    /// Step-by-step explanation of `request`, independent of the PDP.
    pub fn explain(&self, request: &AccessRequest) -> DecisionReplay {
        replay(&normalize_subject_clearance(request))
    }

    /// Queries partner instances concurrently and merges their results.
    ///
    /// `targets` restricts the fan-out to the named instances; otherwise
    /// every enabled instance is queried. Failures, timeouts and instances
    /// still running at the deadline land in `failedQueries`. Results are
    /// limited to those releasable to the subject and de-duplicated by
    /// `(originRealm, resourceId)`.
    ///
    /// `deadline` bounds the whole fan-out and replaces the configured one
    /// when given.
    pub async fn query_federated_resources(
        &self,
        query: &FederatedQuery,
        subject: &SubjectAttributes,
        targets: Option<&[String]>,
        deadline: Option<Duration>,
    ) -> FederatedQueryResult {
        let started = Instant::now();
        let query_id = Uuid::new_v4().to_string();
        let mut failed = Vec::new();

        let selected: Vec<FederationInstance> = match targets {
            None => self.instances.iter().filter(|i| i.enabled).cloned().collect(),
            Some(codes) => {
                let mut selected = Vec::new();
                for code in codes {
                    match self.instances.iter().find(|i| i.code.eq_ignore_ascii_case(code)) {
                        Some(instance) if instance.enabled => selected.push(instance.clone()),
                        Some(_) => failed.push(FailedQuery {
                            instance: code.clone(),
                            error: "instance disabled".to_string(),
                        }),
                        None => failed.push(FailedQuery {
                            instance: code.clone(),
                            error: "unknown instance".to_string(),
                        }),
                    }
                }
                selected
            }
        };

        let order: Vec<String> = selected.iter().map(|i| i.code.clone()).collect();
        let deadline = deadline.unwrap_or(self.settings.deadline);
        let mut outcomes = self.fan_out(selected, query, subject, deadline).await;

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut federated_from = Vec::new();
        let mut instance_results = HashMap::new();

        for code in &order {
            let Some(outcome) = outcomes.remove(code) else {
                continue;
            };
            match outcome.outcome {
                Ok(response) => {
                    let count = response.results.len();
                    for mut resource in response.results {
                        if resource.origin_realm.is_empty() {
                            resource.origin_realm.clone_from(code);
                        }
                        if !resource.is_releasable_to(&subject.country_of_affiliation) {
                            continue;
                        }
                        if seen.insert((resource.origin_realm.clone(), resource.resource_id.clone())) {
                            results.push(resource);
                        }
                    }
                    federated_from.push(code.clone());
                    instance_results.insert(
                        code.clone(),
                        InstanceResult {
                            latency_ms: outcome.latency_ms,
                            result_count: count,
                            error: None,
                        },
                    );
                    self.audit.record(
                        &query_id,
                        &AuditEntry::new(code, AUDIT_FEDERATED_SEARCH, AuditOutcome::Allow)
                            .with_detail(format!("{count} results")),
                    );
                }
                Err(error) => {
                    warn!(instance = %code, error = %error, "federated query failed");
                    self.audit.record(
                        &query_id,
                        &AuditEntry::new(code, AUDIT_FEDERATED_SEARCH, AuditOutcome::Error)
                            .with_detail(error.clone()),
                    );
                    instance_results.insert(
                        code.clone(),
                        InstanceResult {
                            latency_ms: outcome.latency_ms,
                            result_count: 0,
                            error: Some(error.clone()),
                        },
                    );
                    failed.push(FailedQuery {
                        instance: code.clone(),
                        error,
                    });
                }
            }
        }

        let total_latency_ms = elapsed_ms(started);
        info!(
            query_id = %query_id,
            instances = order.len(),
            failed = failed.len(),
            results = results.len(),
            latency_ms = total_latency_ms,
            "federated query complete"
        );

        FederatedQueryResult {
            total_resources: results.len(),
            results,
            federated_from,
            query_stats: QueryStats {
                instances_queried: order.len(),
                total_latency_ms,
                failed_queries: failed,
                instance_results,
            },
        }
    }

    /// One task per instance. Every instance in `selected` gets an outcome.
    async fn fan_out(
        &self,
        selected: Vec<FederationInstance>,
        query: &FederatedQuery,
        subject: &SubjectAttributes,
        budget: Duration,
    ) -> HashMap<String, InstanceOutcome> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + budget;
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let per_call = self.settings.query_timeout;

        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut tasks = JoinSet::new();
        for instance in selected {
            pending.insert(instance.code.clone());
            let client = Arc::clone(&self.search);
            let semaphore = Arc::clone(&semaphore);
            let query = query.clone();
            let subject = subject.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let call_started = Instant::now();
                let outcome =
                    match tokio::time::timeout(per_call, client.search(&instance, &query, &subject)).await {
                        Ok(Ok(response)) => Ok(response),
                        Ok(Err(error)) => Err(error.to_string()),
                        Err(_) => Err(format!("timed out after {}ms", per_call.as_millis())),
                    };
                InstanceOutcome {
                    code: instance.code,
                    latency_ms: elapsed_ms(call_started),
                    outcome,
                }
            });
        }

        let mut outcomes = HashMap::new();
        let mut deadline_hit = false;
        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok(outcome))) => {
                    pending.remove(&outcome.code);
                    outcomes.insert(outcome.code.clone(), outcome);
                }
                Ok(Some(Err(error))) => {
                    warn!(error = %error, "federated search task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let reason = if deadline_hit {
            format!("deadline of {}ms exceeded", budget.as_millis())
        } else {
            "search task aborted".to_string()
        };
        for code in pending {
            outcomes.insert(
                code.clone(),
                InstanceOutcome {
                    code,
                    latency_ms: elapsed_ms(started),
                    outcome: Err(reason.clone()),
                },
            );
        }
        outcomes
    }

    pub fn get_bilateral_trusts(&self) -> Vec<BilateralTrust> {
        self.verifier.trusts()
    }

    pub fn has_bilateral_trust(&self, instance_a: &str, instance_b: &str) -> bool {
        self.verifier.has_bilateral_trust(instance_a, instance_b)
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.engine.clear_cache();
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dive_abac::pdp::{PdpDecision, PolicyDecisionPoint, PolicyInput};
    use dive_abac::bilateral::AUDIT_TRUST_CHECK;
    use dive_types::{Clearance, ExternalServiceError, RequestContext, ResourceSecurityLabel};
    use test_case::test_case;

    use crate::audit::MemoryAuditSink;
    use crate::error::FederationError;

    struct AllowPdp;

    #[async_trait]
    impl PolicyDecisionPoint for AllowPdp {
        async fn evaluate(
            &self,
            _input: &PolicyInput<'_>,
        ) -> std::result::Result<PdpDecision, ExternalServiceError> {
            Ok(PdpDecision {
                allow: true,
                reason: "ok".into(),
                obligations: Vec::new(),
                decision_id: None,
            })
        }
    }

    struct FailingPdp;

    #[async_trait]
    impl PolicyDecisionPoint for FailingPdp {
        async fn evaluate(
            &self,
            _input: &PolicyInput<'_>,
        ) -> std::result::Result<PdpDecision, ExternalServiceError> {
            Err(ExternalServiceError::new("opa", Some(500), "down"))
        }
    }

    /// Answers per instance code: results, an error, or a stall.
    struct ScriptedSearch;

    #[async_trait]
    impl FederatedSearchClient for ScriptedSearch {
        async fn search(
            &self,
            instance: &FederationInstance,
            _query: &FederatedQuery,
            _subject: &SubjectAttributes,
        ) -> Result<InstanceSearchResponse> {
            let resource = |id: &str, realm: &str| FederatedResource {
                resource_id: id.to_string(),
                origin_realm: realm.to_string(),
                classification: "SECRET".into(),
                releasability_to: vec!["USA".into(), "GBR".into()],
                coi: Vec::new(),
                extra: serde_json::Map::new(),
            };
            match instance.code.as_str() {
                "GBR" => Ok(InstanceSearchResponse {
                    results: vec![resource("doc-1", "GBR"), resource("doc-1", "GBR")],
                    total_results: Some(2),
                }),
                "CAN" => Ok(InstanceSearchResponse {
                    results: vec![resource("doc-1", "CAN"), resource("doc-2", "")],
                    total_results: None,
                }),
                "SLOW" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(InstanceSearchResponse::default())
                }
                other => Err(FederationError::Search {
                    instance: other.to_string(),
                    status: Some(503),
                    message: "unavailable".into(),
                }),
            }
        }
    }

    fn orchestrator(audit: Arc<MemoryAuditSink>, settings: FanOutSettings) -> FederationOrchestrator {
        let engine = LocalDecisionEngine::new(
            Arc::new(AllowPdp),
            DecisionCache::new(16, Duration::from_secs(60)),
            "USA",
        );
        let table = BilateralTrustTable::symmetric(vec![BilateralTrust::new("USA", "GBR", Clearance::Secret)]);
        FederationOrchestrator::builder(Arc::new(engine), Arc::new(table))
            .instances(["GBR", "CAN", "DEU", "SLOW"].map(|c| FederationInstance::new(c, format!("https://{c}"))))
            .search_client(Arc::new(ScriptedSearch))
            .audit_sink(audit)
            .settings(settings)
            .build()
            .unwrap()
    }

    fn subject() -> SubjectAttributes {
        SubjectAttributes::new("john", "SECRET", "USA").with_origin("USA")
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_healthy_results() {
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = orchestrator(audit.clone(), FanOutSettings::default());
        let targets = vec!["GBR".to_string(), "CAN".to_string(), "DEU".to_string()];

        let result = orchestrator
            .query_federated_resources(&FederatedQuery::default(), &subject(), Some(&targets), None)
            .await;

        assert_eq!(result.query_stats.instances_queried, 3);
        assert_eq!(result.query_stats.failed_queries.len(), 1);
        assert_eq!(result.query_stats.failed_queries[0].instance, "DEU");
        // GBR duplicate collapsed; CAN doc-1 is a different realm.
        assert_eq!(result.total_resources, 3);
        assert_eq!(result.federated_from, vec!["GBR", "CAN"]);
        assert!(result.results.iter().any(|r| r.resource_id == "doc-2" && r.origin_realm == "CAN"));
        assert_eq!(audit.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_instance_times_out() {
        let orchestrator = orchestrator(
            Arc::new(MemoryAuditSink::new()),
            FanOutSettings {
                query_timeout: Duration::from_secs(2),
                ..FanOutSettings::default()
            },
        );
        let targets = vec!["GBR".to_string(), "SLOW".to_string()];

        let result = orchestrator
            .query_federated_resources(&FederatedQuery::default(), &subject(), Some(&targets), None)
            .await;

        assert_eq!(result.query_stats.failed_queries.len(), 1);
        assert!(result.query_stats.failed_queries[0].error.contains("timed out"));
        assert_eq!(result.total_resources, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_pending_instances_failed() {
        let orchestrator = orchestrator(
            Arc::new(MemoryAuditSink::new()),
            FanOutSettings {
                query_timeout: Duration::from_secs(120),
                deadline: Duration::from_secs(5),
                max_concurrency: 4,
            },
        );
        let targets = vec!["SLOW".to_string(), "CAN".to_string()];

        let result = orchestrator
            .query_federated_resources(&FederatedQuery::default(), &subject(), Some(&targets), None)
            .await;

        assert_eq!(result.query_stats.failed_queries.len(), 1);
        assert!(result.query_stats.failed_queries[0].error.contains("deadline"));
        assert_eq!(result.federated_from, vec!["CAN"]);
    }

    #[tokio::test]
    async fn test_unknown_target_reported() {
        let orchestrator = orchestrator(Arc::new(MemoryAuditSink::new()), FanOutSettings::default());
        let targets = vec!["GBR".to_string(), "NZL".to_string()];

        let result = orchestrator
            .query_federated_resources(&FederatedQuery::default(), &subject(), Some(&targets), None)
            .await;

        assert_eq!(result.query_stats.instances_queried, 1);
        assert_eq!(result.query_stats.failed_queries[0].instance, "NZL");
    }

    #[tokio::test]
    async fn test_foreign_resource_routes_through_bilateral_trust() {
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = orchestrator(audit.clone(), FanOutSettings::default());
        let request = AccessRequest::new(
            subject(),
            ResourceSecurityLabel::new("doc-deu", Clearance::Secret, &["USA"]).with_instance("DEU"),
            "read",
            RequestContext::now("req-deu"),
        );

        let decision = orchestrator.evaluate_access(&request).await.unwrap();

        assert!(!decision.allow);
        assert!(decision.reason.contains("No bilateral trust"));
        let recorded = audit.entries_for("req-deu");
        assert_eq!(recorded.len(), decision.audit_trail.len());
    }

    #[test_case("", true, false ; "no owning instance stays local")]
    #[test_case("USA", true, false ; "local instance stays local")]
    #[test_case("GBR", true, true ; "trusted partner")]
    #[test_case("DEU", false, true ; "untrusted partner")]
    #[tokio::test]
    async fn test_routing(resource_instance: &str, allow: bool, via_trust: bool) {
        let orchestrator = orchestrator(Arc::new(MemoryAuditSink::new()), FanOutSettings::default());
        let mut resource = ResourceSecurityLabel::new("doc-r", Clearance::Secret, &["USA"]);
        resource.instance_id = resource_instance.to_string();
        let request = AccessRequest::new(subject(), resource, "read", RequestContext::now("req-r"));

        let decision = orchestrator.evaluate_access(&request).await.unwrap();

        assert_eq!(decision.allow, allow, "{}", decision.reason);
        let checked = decision.audit_trail.iter().any(|e| e.action == AUDIT_TRUST_CHECK);
        assert_eq!(checked, via_trust);
    }

    #[tokio::test]
    async fn test_pdp_fault_records_trust_check() {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = LocalDecisionEngine::new(
            Arc::new(FailingPdp),
            DecisionCache::new(16, Duration::from_secs(60)),
            "USA",
        );
        let table = BilateralTrustTable::symmetric(vec![BilateralTrust::new("USA", "GBR", Clearance::Secret)]);
        let orchestrator = FederationOrchestrator::builder(Arc::new(engine), Arc::new(table))
            .search_client(Arc::new(ScriptedSearch))
            .audit_sink(audit.clone())
            .build()
            .unwrap();
        let request = AccessRequest::new(
            subject(),
            ResourceSecurityLabel::new("doc-gbr", Clearance::Secret, &["USA"]).with_instance("GBR"),
            "read",
            RequestContext::now("req-fault"),
        );

        let err = orchestrator.evaluate_access(&request).await.unwrap_err();

        assert!(matches!(err, FederationError::Decision(ref e) if e.is_fault()));
        let recorded = audit.entries_for("req-fault");
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].action, AUDIT_TRUST_CHECK);
        assert_eq!(recorded[1].outcome, AuditOutcome::Error);
    }

    #[tokio::test]
    async fn test_local_resource_uses_engine_and_cache() {
        let orchestrator = orchestrator(Arc::new(MemoryAuditSink::new()), FanOutSettings::default());
        let request = AccessRequest::new(
            subject(),
            ResourceSecurityLabel::new("doc-usa", Clearance::Secret, &["USA"]).with_instance("USA"),
            "read",
            RequestContext::now("req-usa"),
        );

        let first = orchestrator.evaluate_access(&request).await.unwrap();
        let second = orchestrator.evaluate_access(&request).await.unwrap();
        assert!(first.allow);
        assert!(second.evaluation_details.cache_hit);
        assert_eq!(orchestrator.get_cache_stats().hits, 1);

        orchestrator.clear_cache();
        assert_eq!(orchestrator.get_cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_explain_translates_national_clearance() {
        let orchestrator = orchestrator(Arc::new(MemoryAuditSink::new()), FanOutSettings::default());
        let subject = SubjectAttributes::new("pierre", "SECRET DEFENSE", "FRA").with_origin("FRA");
        let request = AccessRequest::new(
            subject,
            ResourceSecurityLabel::new("doc-1", Clearance::Secret, &["FRA"]).with_instance("FRA"),
            "read",
            RequestContext::now("req-fra"),
        );

        let trace = orchestrator.explain(&request);
        assert!(trace.allow, "{}", trace.reason);
    }
}
