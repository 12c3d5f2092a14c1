//! Multi-KAS key release.
//!
//! A resource carries one or more KAOs, each independently sufficient to
//! recover the DEK. KAOs are tried in order:
//!
//! ```text
//! decision.allow + KAS_KEY_REQUEST ──► for each KAO:
//!     policy binding vs subject ──fail──► Denied
//!     internal KAS ──► COI key registry unwrap (AAD = resource id)
//!     external KAS ──► KasClient::request_key
//!                          401/403 ──► Denied, other errors ──► Fault
//! first success wins
//! ```

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use dive_abac::translate_clearance;
use dive_config::DiveConfig;
use dive_crypto::CoiKeyRegistry;
use dive_kas::{KasClient, KeyRequest};
use dive_types::{AuthorizationDecision, Clearance, KeyAccessObject, SubjectAttributes, obligation};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{AttemptFailure, KeyReleaseAttempt, KeyReleaseError};

type Result<T> = std::result::Result<T, KeyReleaseError>;

/// Where the DEK was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Unwrapped locally under a COI key.
    CoiRegistry,
    /// Released by an external KAS.
    ExternalKas,
}

/// A recovered DEK. The bytes are wiped on drop.
pub struct ReleasedKey {
    pub kao_id: String,
    pub kas_id: String,
    pub source: KeySource,
    dek: Zeroizing<Vec<u8>>,
}

impl ReleasedKey {
    pub fn dek(&self) -> &[u8] {
        &self.dek
    }
}

impl fmt::Debug for ReleasedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleasedKey")
            .field("kao_id", &self.kao_id)
            .field("kas_id", &self.kas_id)
            .field("source", &self.source)
            .field("dek", &"[REDACTED]")
            .finish()
    }
}

pub struct KeyReleaseCoordinator {
    registry: Arc<CoiKeyRegistry>,
    kas: Arc<KasClient>,
}

impl fmt::Debug for KeyReleaseCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyReleaseCoordinator")
            .field("kas", &self.kas)
            .finish_non_exhaustive()
    }
}

impl KeyReleaseCoordinator {
    pub fn new(registry: Arc<CoiKeyRegistry>, kas: Arc<KasClient>) -> Self {
        Self { registry, kas }
    }

    /// Builds the KAS client from the `kas` and `instance` sections.
    pub fn from_config(config: &DiveConfig, registry: Arc<CoiKeyRegistry>) -> crate::Result<Self> {
        let kas = KasClient::new(config.kas.external.clone(), config.instance.kas_url.clone())?;
        Ok(Self::new(registry, Arc::new(kas)))
    }

    /// Recovers the DEK of `resource_id` for `subject`.
    ///
    /// `decision` must allow access and carry a `KAS_KEY_REQUEST`
    /// obligation. No KAO is tried twice.
    pub async fn release_key(
        &self,
        decision: &AuthorizationDecision,
        subject: &SubjectAttributes,
        resource_id: &str,
        kaos: &[KeyAccessObject],
        bearer_token: &str,
    ) -> Result<ReleasedKey> {
        if !decision.allow {
            return Err(KeyReleaseError::NotAuthorized(decision.reason.clone()));
        }
        if !decision.has_obligation(obligation::KAS_KEY_REQUEST) {
            return Err(KeyReleaseError::NotAuthorized(format!(
                "decision carries no {} obligation",
                obligation::KAS_KEY_REQUEST
            )));
        }
        if kaos.is_empty() {
            return Err(KeyReleaseError::NoKeyAccessObjects(resource_id.to_string()));
        }

        let mut attempts = Vec::with_capacity(kaos.len());
        for kao in kaos {
            let outcome = match check_binding(kao, subject) {
                Err(reason) => Err(AttemptFailure::Denied(reason)),
                Ok(()) if self.kas.is_external_kas(&kao.kas_url) => {
                    self.release_external(kao, resource_id, bearer_token).await
                }
                Ok(()) => self.release_internal(kao, resource_id),
            };

            match outcome {
                Ok(released) => {
                    info!(
                        resource = %resource_id,
                        kao = %kao.kao_id,
                        kas = %kao.kas_id,
                        source = ?released.source,
                        failed_attempts = attempts.len(),
                        "key released"
                    );
                    return Ok(released);
                }
                Err(failure) => {
                    warn!(
                        resource = %resource_id,
                        kao = %kao.kao_id,
                        kas = %kao.kas_id,
                        failure = ?failure,
                        "KAO attempt failed"
                    );
                    attempts.push(KeyReleaseAttempt {
                        kao_id: kao.kao_id.clone(),
                        kas_id: kao.kas_id.clone(),
                        failure,
                    });
                }
            }
        }

        if attempts.iter().all(KeyReleaseAttempt::is_denial) {
            let reason = match attempts.first().map(|a| &a.failure) {
                Some(AttemptFailure::Denied(reason)) => reason.clone(),
                _ => "Access denied".to_string(),
            };
            Err(KeyReleaseError::Denied { reason, attempts })
        } else {
            Err(KeyReleaseError::Fault { attempts })
        }
    }

    fn release_internal(
        &self,
        kao: &KeyAccessObject,
        resource_id: &str,
    ) -> std::result::Result<ReleasedKey, AttemptFailure> {
        let Some(coi) = kao.coi() else {
            return Err(AttemptFailure::Fault(
                "internal KAO names no COI key".to_string(),
            ));
        };
        let dek = self
            .registry
            .unwrap_key(coi, &kao.wrapped_key, resource_id.as_bytes())
            .map_err(|e| AttemptFailure::Fault(e.to_string()))?;

        Ok(ReleasedKey {
            kao_id: kao.kao_id.clone(),
            kas_id: kao.kas_id.clone(),
            source: KeySource::CoiRegistry,
            dek: Zeroizing::new(dek),
        })
    }

    async fn release_external(
        &self,
        kao: &KeyAccessObject,
        resource_id: &str,
        bearer_token: &str,
    ) -> std::result::Result<ReleasedKey, AttemptFailure> {
        let Some(config) = self.kas.resolve(&kao.kas_id, &kao.kas_url) else {
            return Err(AttemptFailure::Fault(format!(
                "no external KAS configured for {} ({})",
                kao.kas_id, kao.kas_url
            )));
        };

        let request = KeyRequest {
            resource_id: resource_id.to_string(),
            kao_id: kao.kao_id.clone(),
            wrapped_key: kao.wrapped_key.clone(),
            bearer_token: bearer_token.to_string(),
            request_id: Uuid::new_v4().to_string(),
            request_timestamp: Utc::now(),
        };

        let response = match self.kas.request_key(&config.kas_id, &request).await {
            Ok(response) => response,
            Err(error) if error.is_policy_denial() => {
                return Err(AttemptFailure::Denied(error.to_string()));
            }
            Err(error) => return Err(AttemptFailure::Fault(error.to_string())),
        };

        if !response.success {
            return Err(AttemptFailure::Fault(format!(
                "KAS {} reported an unsuccessful unwrap",
                config.kas_id
            )));
        }
        let dek = STANDARD
            .decode(response.unwrapped_key.trim())
            .map_err(|e| AttemptFailure::Fault(format!("KAS {} returned an invalid key: {e}", config.kas_id)))?;

        Ok(ReleasedKey {
            kao_id: kao.kao_id.clone(),
            kas_id: config.kas_id.clone(),
            source: KeySource::ExternalKas,
            dek: Zeroizing::new(dek),
        })
    }
}

/// Checks a KAO's policy binding against the subject.
fn check_binding(kao: &KeyAccessObject, subject: &SubjectAttributes) -> std::result::Result<(), String> {
    let binding = &kao.policy_binding;

    let clearance = Clearance::parse(&subject.clearance).unwrap_or_else(|| {
        translate_clearance(&subject.clearance, Some(&subject.country_of_affiliation))
    });
    if !clearance.dominates(binding.clearance_required) {
        return Err(format!(
            "Clearance {clearance} below {} required by KAO {}",
            binding.clearance_required, kao.kao_id
        ));
    }

    if !binding.countries_allowed.is_empty()
        && !binding
            .countries_allowed
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&subject.country_of_affiliation))
    {
        return Err(format!(
            "Country {} not allowed by KAO {}",
            subject.country_of_affiliation, kao.kao_id
        ));
    }

    if !binding.coi_required.is_empty() && !subject.shares_coi(&binding.coi_required) {
        return Err(format!(
            "No COI overlap with KAO {} (requires {})",
            kao.kao_id,
            binding.coi_required.join(", ")
        ));
    }

    Ok(())
}
