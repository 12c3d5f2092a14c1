//! Federated resource search across partner instances.

use std::time::Duration;

use async_trait::async_trait;
use dive_config::InstanceEntry;
use dive_types::{Clearance, SubjectAttributes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FederationError, Result};

/// Path of the search endpoint on every instance.
pub const FEDERATED_SEARCH_PATH: &str = "api/resources/federated-search";

pub const DEFAULT_LIMIT: usize = 100;

/// A partner instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationInstance {
    /// Three-letter instance code, e.g. `GBR`.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub api_url: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

impl FederationInstance {
    pub fn new(code: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            api_url: api_url.into(),
            enabled: true,
        }
    }

    pub fn search_url(&self) -> String {
        format!("{}/{FEDERATED_SEARCH_PATH}", self.api_url.trim_end_matches('/'))
    }
}

impl From<&InstanceEntry> for FederationInstance {
    fn from(entry: &InstanceEntry) -> Self {
        Self {
            code: entry.code.clone(),
            name: entry.name.clone(),
            api_url: entry.api_url.clone(),
            enabled: entry.enabled,
        }
    }
}

/// Body of `POST /api/resources/federated-search`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Clearance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coi: Option<String>,
    pub limit: usize,
    /// Forwarded as `Authorization: Bearer`, never in the body.
    #[serde(skip)]
    pub bearer_token: Option<String>,
}

impl Default for FederatedQuery {
    fn default() -> Self {
        Self {
            classification: None,
            coi: None,
            limit: DEFAULT_LIMIT,
            bearer_token: None,
        }
    }
}

impl FederatedQuery {
    pub fn with_classification(mut self, classification: Clearance) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn with_coi(mut self, coi: impl Into<String>) -> Self {
        self.coi = Some(coi.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for FederatedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedQuery")
            .field("classification", &self.classification)
            .field("coi", &self.coi)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// One resource returned by a partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedResource {
    pub resource_id: String,
    /// Instance that owns the resource.
    #[serde(default)]
    pub origin_realm: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub releasability_to: Vec<String>,
    #[serde(rename = "COI", default)]
    pub coi: Vec<String>,
    /// Remaining fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FederatedResource {
    pub fn is_releasable_to(&self, country: &str) -> bool {
        self.releasability_to.iter().any(|c| c.eq_ignore_ascii_case(country))
    }
}

/// What one instance answered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSearchResponse {
    #[serde(default)]
    pub results: Vec<FederatedResource>,
    #[serde(default)]
    pub total_results: Option<usize>,
}

#[async_trait]
pub trait FederatedSearchClient: Send + Sync {
    async fn search(
        &self,
        instance: &FederationInstance,
        query: &FederatedQuery,
        subject: &SubjectAttributes,
    ) -> Result<InstanceSearchResponse>;
}

/// Searches partners over HTTP.
///
/// The requesting instance and the subject's country and clearance travel
/// as headers so the partner can apply its own release policy.
#[derive(Debug, Clone)]
pub struct HttpFederatedSearchClient {
    http: reqwest::Client,
    local_instance: String,
}

impl HttpFederatedSearchClient {
    pub fn new(local_instance: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dive-federation/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FederationError::Client(e.to_string()))?;
        Ok(Self {
            http,
            local_instance: local_instance.into(),
        })
    }
}

#[async_trait]
impl FederatedSearchClient for HttpFederatedSearchClient {
    async fn search(
        &self,
        instance: &FederationInstance,
        query: &FederatedQuery,
        subject: &SubjectAttributes,
    ) -> Result<InstanceSearchResponse> {
        let url = instance.search_url();
        debug!(instance = %instance.code, url = %url, "federated search");

        let failed = |status: Option<u16>, message: String| FederationError::Search {
            instance: instance.code.clone(),
            status,
            message,
        };

        let mut request = self
            .http
            .post(&url)
            .header("X-Origin-Instance", &self.local_instance)
            .header("X-Subject-Country", &subject.country_of_affiliation)
            .header("X-Subject-Clearance", &subject.clearance)
            .json(query);
        if let Some(token) = &query.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| failed(None, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(Some(status.as_u16()), format!("HTTP {}: {body}", status.as_u16())));
        }

        response
            .json::<InstanceSearchResponse>()
            .await
            .map_err(|e| failed(Some(status.as_u16()), format!("invalid response: {e}")))
    }
}
