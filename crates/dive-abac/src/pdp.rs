//! Policy decision point delegation.
//!
//! The authoritative decision is rendered by an external PDP (OPA). This
//! module defines the seam and the HTTP client; the engine never evaluates
//! policy itself.

use std::time::Duration;

use async_trait::async_trait;
use dive_types::{
    AccessRequest, Action, ExternalServiceError, Obligation, ObligationStatus, RequestContext,
    ResourceSecurityLabel, SubjectAttributes,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Canonical document sent to the PDP as `input`.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput<'a> {
    pub subject: &'a SubjectAttributes,
    pub action: &'a Action,
    pub resource: &'a ResourceSecurityLabel,
    pub context: &'a RequestContext,
}

impl<'a> From<&'a AccessRequest> for PolicyInput<'a> {
    fn from(request: &'a AccessRequest) -> Self {
        Self {
            subject: &request.subject,
            action: &request.action,
            resource: &request.resource,
            context: &request.context,
        }
    }
}

/// What the PDP decided.
#[derive(Debug, Clone, PartialEq)]
pub struct PdpDecision {
    pub allow: bool,
    pub reason: String,
    /// Normalized to `status: pending`.
    pub obligations: Vec<Obligation>,
    pub decision_id: Option<String>,
}

#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
    /// Evaluates one request. Transport failures are faults, never denials.
    async fn evaluate(&self, input: &PolicyInput<'_>) -> Result<PdpDecision, ExternalServiceError>;
}

// ============================================================================
// OPA
// ============================================================================

/// Default decision document path under the OPA base URL.
pub const DEFAULT_DECISION_PATH: &str = "v1/data/dive/authorization/decision";

const SERVICE: &str = "opa";

#[derive(Serialize)]
struct OpaRequest<'a, 'b> {
    input: &'a PolicyInput<'b>,
}

#[derive(Deserialize)]
struct OpaResponse {
    #[serde(default)]
    result: Option<OpaResult>,
    #[serde(default)]
    decision_id: Option<String>,
}

/// OPA answers with either `result.decision.{..}` or a flat `result.{..}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OpaResult {
    Nested {
        decision: OpaVerdict,
        #[serde(default)]
        decision_id: Option<String>,
    },
    Flat(OpaVerdict),
}

#[derive(Deserialize)]
struct OpaVerdict {
    allow: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    obligations: Vec<Value>,
}

/// HTTP client for an OPA decision endpoint.
#[derive(Debug, Clone)]
pub struct OpaClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OpaClient {
    /// `base_url` is the OPA server, `decision_path` the rule document.
    pub fn new(base_url: &str, decision_path: &str, timeout: Duration) -> Result<Self, ExternalServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dive-abac/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExternalServiceError::new(SERVICE, None, e.to_string()))?;

        let endpoint = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            decision_path.trim_start_matches('/')
        );

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PolicyDecisionPoint for OpaClient {
    async fn evaluate(&self, input: &PolicyInput<'_>) -> Result<PdpDecision, ExternalServiceError> {
        debug!(
            endpoint = %self.endpoint,
            subject = %input.subject.unique_id,
            resource = %input.resource.resource_id,
            action = %input.action,
            "querying PDP"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&OpaRequest { input })
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "PDP unreachable");
                ExternalServiceError::new(SERVICE, None, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "PDP returned error status");
            return Err(ExternalServiceError::new(SERVICE, Some(status.as_u16()), body));
        }

        let parsed: OpaResponse = response
            .json()
            .await
            .map_err(|e| ExternalServiceError::new(SERVICE, Some(status.as_u16()), e.to_string()))?;

        into_decision(parsed)
    }
}

fn into_decision(response: OpaResponse) -> Result<PdpDecision, ExternalServiceError> {
    let Some(result) = response.result else {
        return Err(ExternalServiceError::new(
            SERVICE,
            None,
            "response has no result (policy not loaded?)",
        ));
    };

    let (verdict, nested_id) = match result {
        OpaResult::Nested {
            decision,
            decision_id,
        } => (decision, decision_id),
        OpaResult::Flat(verdict) => (verdict, None),
    };

    let reason = verdict
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| {
            if verdict.allow {
                "Access granted by policy".to_string()
            } else {
                "Access denied by policy".to_string()
            }
        });

    Ok(PdpDecision {
        allow: verdict.allow,
        reason,
        obligations: verdict
            .obligations
            .into_iter()
            .filter_map(normalize_obligation)
            .collect(),
        decision_id: response.decision_id.or(nested_id),
    })
}

/// Accepts `"TYPE"` or `{type, ...params}` and forces `status: pending`.
fn normalize_obligation(value: Value) -> Option<Obligation> {
    match value {
        Value::String(kind) => Some(Obligation::pending(&kind)),
        Value::Object(mut map) => {
            let kind = map.remove("type")?.as_str()?.to_string();
            map.remove("status");
            let mut obligation = Obligation::pending(&kind);
            obligation.params = map;
            obligation.status = ObligationStatus::Pending;
            Some(obligation)
        }
        _ => None,
    }
}
