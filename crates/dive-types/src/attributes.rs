//! Attribute types for access requests.
//!
//! Three attribute categories drive access decisions:
//! - **Subject attributes**: clearance, nation, communities of interest, origin instance
//! - **Resource attributes**: classification, releasability, COI tags, embargo anchor
//! - **Context**: request time and request identity
//!
//! Field names on the wire follow the coalition attribute profile
//! (`uniqueID`, `acpCOI`, `releasabilityTo`, `COI`), hence the serde renames.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clearance::Clearance;
use crate::error::DecisionError;

// ============================================================================
// Subject
// ============================================================================

/// Security attributes of the requesting subject.
///
/// Populated from the identity provider's token at the start of each request
/// and never mutated afterwards. `clearance` is kept as presented by the IdP
/// because partner nations may use their own vocabulary; canonicalization is
/// the job of the clearance translation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttributes {
    /// Globally unique subject identifier.
    #[serde(rename = "uniqueID")]
    pub unique_id: String,
    /// Clearance as asserted by the IdP.
    pub clearance: String,
    /// Original national clearance string, if the IdP normalized it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance_original: Option<String>,
    /// ISO 3166-1 alpha-3 country code.
    pub country_of_affiliation: String,
    /// Communities of interest the subject belongs to.
    #[serde(rename = "acpCOI", default)]
    pub acp_coi: Vec<String>,
    /// Instance (spoke) whose IdP authenticated the subject.
    #[serde(default)]
    pub origin_instance: String,
    /// Whether the subject completed authentication.
    #[serde(default)]
    pub authenticated: bool,
}

impl SubjectAttributes {
    /// Creates an authenticated subject with no COI memberships.
    pub fn new(unique_id: &str, clearance: &str, country: &str) -> Self {
        Self {
            unique_id: unique_id.to_string(),
            clearance: clearance.to_string(),
            clearance_original: None,
            country_of_affiliation: country.to_string(),
            acp_coi: Vec::new(),
            origin_instance: String::new(),
            authenticated: true,
        }
    }

    /// Sets the COI memberships.
    pub fn with_coi<I, S>(mut self, cois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acp_coi = cois.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the origin instance.
    pub fn with_origin(mut self, instance: &str) -> Self {
        self.origin_instance = instance.to_string();
        self
    }

    /// Sets the national clearance string.
    pub fn with_clearance_original(mut self, original: &str) -> Self {
        self.clearance_original = Some(original.to_string());
        self
    }

    /// Marks the subject as (un)authenticated.
    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// The canonical clearance, if `clearance` is already a canonical name.
    pub fn canonical_clearance(&self) -> Option<Clearance> {
        Clearance::parse(&self.clearance)
    }

    /// Returns true if the subject holds at least one of `tags`.
    pub fn shares_coi(&self, tags: &[String]) -> bool {
        self.acp_coi.iter().any(|c| tags.contains(c))
    }

    /// Rejects subjects that cannot be evaluated at all.
    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.unique_id.trim().is_empty() {
            return Err(DecisionError::Validation(
                "subject uniqueID must not be empty".to_string(),
            ));
        }
        if !is_alpha3(&self.country_of_affiliation) {
            return Err(DecisionError::Validation(format!(
                "subject countryOfAffiliation '{}' is not an ISO 3166-1 alpha-3 code",
                self.country_of_affiliation
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Security label bound to a resource.
///
/// An empty `releasability_to` releases to nobody; an empty `coi` means the
/// resource carries no community restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSecurityLabel {
    pub resource_id: String,
    pub classification: Clearance,
    #[serde(default)]
    pub releasability_to: Vec<String>,
    #[serde(rename = "COI", default)]
    pub coi: Vec<String>,
    #[serde(default)]
    pub caveats: Vec<String>,
    /// Embargo anchor: the resource is not releasable before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    /// Instance that owns the resource.
    #[serde(default)]
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,
    /// Originating nation, when it differs from the owning instance code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,
    /// Whether the payload is ZTDF-encrypted (release requires a KAS).
    #[serde(default)]
    pub encrypted: bool,
}

impl ResourceSecurityLabel {
    /// Creates a label with no COI restriction, caveats or embargo.
    pub fn new(resource_id: &str, classification: Clearance, releasability_to: &[&str]) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            classification,
            releasability_to: releasability_to.iter().map(ToString::to_string).collect(),
            coi: Vec::new(),
            caveats: Vec::new(),
            creation_date: None,
            instance_id: String::new(),
            instance_url: None,
            origin_country: None,
            encrypted: false,
        }
    }

    /// Sets the COI tags.
    pub fn with_coi<I, S>(mut self, cois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coi = cois.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the owning instance.
    pub fn with_instance(mut self, instance_id: &str) -> Self {
        self.instance_id = instance_id.to_string();
        self
    }

    /// Sets the embargo anchor.
    pub fn with_creation_date(mut self, date: DateTime<Utc>) -> Self {
        self.creation_date = Some(date);
        self
    }

    /// Marks the resource as encrypted.
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// The nation the resource originates from.
    ///
    /// Falls back to the owning instance code, which is an alpha-3 code for
    /// national spokes.
    pub fn originating_country(&self) -> Option<&str> {
        self.origin_country
            .as_deref()
            .or_else(|| is_alpha3(&self.instance_id).then_some(self.instance_id.as_str()))
    }

    /// Returns true if `country` is listed in `releasabilityTo`.
    pub fn is_releasable_to(&self, country: &str) -> bool {
        self.releasability_to.iter().any(|c| c == country)
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.resource_id.trim().is_empty() {
            return Err(DecisionError::Validation(
                "resourceId must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self.releasability_to.iter().find(|c| !is_alpha3(c)) {
            return Err(DecisionError::Validation(format!(
                "releasabilityTo entry '{bad}' is not an ISO 3166-1 alpha-3 code"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Action
// ============================================================================

/// The operation the subject wants to perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Read,
    View,
    List,
    Search,
    Download,
    Decrypt,
    Write,
    Update,
    Upload,
    Delete,
    /// Any action outside the known vocabulary.
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Read => "read",
            Action::View => "view",
            Action::List => "list",
            Action::Search => "search",
            Action::Download => "download",
            Action::Decrypt => "decrypt",
            Action::Write => "write",
            Action::Update => "update",
            Action::Upload => "upload",
            Action::Delete => "delete",
            Action::Other(other) => other,
        }
    }

    /// Actions that only observe the resource.
    pub fn is_read_class(&self) -> bool {
        matches!(
            self,
            Action::Read
                | Action::View
                | Action::List
                | Action::Search
                | Action::Download
                | Action::Decrypt
        )
    }

    /// Actions that mutate the resource.
    pub fn is_write_class(&self) -> bool {
        matches!(
            self,
            Action::Write | Action::Update | Action::Upload | Action::Delete
        )
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "read" => Action::Read,
            "view" => Action::View,
            "list" => Action::List,
            "search" => Action::Search,
            "download" => Action::Download,
            "decrypt" => Action::Decrypt,
            "write" => Action::Write,
            "update" => Action::Update,
            "upload" => Action::Upload,
            "delete" => Action::Delete,
            _ => Action::Other(value),
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Action::from(value.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Context
// ============================================================================

/// Environment of a single request.
///
/// Computed by the receiving instance, not supplied by the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub current_time: DateTime<Utc>,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: &str, current_time: DateTime<Utc>) -> Self {
        Self {
            current_time,
            request_id: request_id.to_string(),
            source_ip: None,
        }
    }

    /// A context stamped with the current wall-clock time.
    pub fn now(request_id: &str) -> Self {
        Self::new(request_id, Utc::now())
    }
}

/// A complete authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub subject: SubjectAttributes,
    pub resource: ResourceSecurityLabel,
    pub action: Action,
    pub context: RequestContext,
}

impl AccessRequest {
    pub fn new(
        subject: SubjectAttributes,
        resource: ResourceSecurityLabel,
        action: impl Into<Action>,
        context: RequestContext,
    ) -> Self {
        Self {
            subject,
            resource,
            action: action.into(),
            context,
        }
    }

    /// True when the subject's origin instance differs from the resource owner.
    pub fn is_cross_instance(&self) -> bool {
        !self.subject.origin_instance.is_empty()
            && !self.resource.instance_id.is_empty()
            && self.subject.origin_instance != self.resource.instance_id
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        self.subject.validate()?;
        self.resource.validate()
    }
}

fn is_alpha3(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

// ============================================================================
// Tests
// ============================================================================
