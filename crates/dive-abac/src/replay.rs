//! Decision replay: a PDP-independent, step-by-step explanation.
//!
//! Every step is evaluated, even after a failure, so the trace shows all the
//! reasons a request would be refused. The overall decision is ALLOW iff all
//! six steps pass.

use dive_types::{AccessRequest, Clearance, ReplayStep};
use serde::Serialize;

use crate::clearance::try_translate_clearance;

pub const STEP_AUTHENTICATED: &str = "is_not_authenticated";
pub const STEP_CLEARANCE: &str = "is_insufficient_clearance";
pub const STEP_RELEASABILITY: &str = "is_not_releasable_to_country";
pub const STEP_COI: &str = "is_coi_violation";
pub const STEP_EMBARGO: &str = "is_under_embargo";
pub const STEP_ACTION: &str = "is_action_not_permitted";

/// Result of replaying one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReplay {
    pub allow: bool,
    /// First failing step's reason, or a summary when everything passed.
    pub reason: String,
    pub steps: Vec<ReplayStep>,
}

impl DecisionReplay {
    pub fn failed_steps(&self) -> impl Iterator<Item = &ReplayStep> {
        self.steps.iter().filter(|s| !s.passed())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Replays the ABAC predicates for `request`.
pub fn replay(request: &AccessRequest) -> DecisionReplay {
    let steps = vec![
        check_authenticated(request),
        check_clearance(request),
        check_releasability(request),
        check_coi(request),
        check_embargo(request),
        check_action(request),
    ];

    let allow = steps.iter().all(ReplayStep::passed);
    let reason = steps
        .iter()
        .find(|s| !s.passed())
        .map_or_else(|| "All access checks passed".to_string(), |s| s.reason.clone());

    DecisionReplay {
        allow,
        reason,
        steps,
    }
}

/// True iff `subject_clearance` ranks at or above `resource_classification`.
///
/// Only canonical names are comparable; anything else yields `false`.
pub fn compare_clearance(subject_clearance: &str, resource_classification: &str) -> bool {
    match (
        Clearance::parse(subject_clearance),
        Clearance::parse(resource_classification),
    ) {
        (Some(subject), Some(resource)) => subject.rank() >= resource.rank(),
        _ => false,
    }
}

// ============================================================================
// Steps
// ============================================================================

fn check_authenticated(request: &AccessRequest) -> ReplayStep {
    if request.subject.authenticated {
        ReplayStep::pass(STEP_AUTHENTICATED, "Subject is authenticated")
    } else {
        ReplayStep::fail(STEP_AUTHENTICATED, "Subject is not authenticated")
    }
}

fn check_clearance(request: &AccessRequest) -> ReplayStep {
    let subject = &request.subject;
    let classification = request.resource.classification;

    // National vocabularies are mapped first; the comparison itself only
    // accepts canonical names, so an unmapped value stays incomparable.
    let country = Some(subject.country_of_affiliation.as_str());
    let effective = try_translate_clearance(&subject.clearance, country)
        .or_else(|| {
            subject
                .clearance_original
                .as_deref()
                .and_then(|original| try_translate_clearance(original, country))
        })
        .map_or_else(|| subject.clearance.clone(), |level| level.as_str().to_string());

    if compare_clearance(&effective, classification.as_str()) {
        ReplayStep::pass(
            STEP_CLEARANCE,
            format!("Clearance {effective} meets classification {classification}"),
        )
    } else {
        ReplayStep::fail(
            STEP_CLEARANCE,
            format!(
                "Insufficient clearance: {} < {classification}",
                subject.clearance
            ),
        )
    }
}

fn check_releasability(request: &AccessRequest) -> ReplayStep {
    let country = &request.subject.country_of_affiliation;
    let releasable = &request.resource.releasability_to;

    if releasable.is_empty() {
        ReplayStep::fail(
            STEP_RELEASABILITY,
            "Resource has empty releasabilityTo (releasable to no one)",
        )
    } else if request.resource.is_releasable_to(country) {
        ReplayStep::pass(
            STEP_RELEASABILITY,
            format!("Country {country} is in releasabilityTo [{}]", releasable.join(", ")),
        )
    } else {
        ReplayStep::fail(
            STEP_RELEASABILITY,
            format!(
                "Country {country} not in releasabilityTo [{}]",
                releasable.join(", ")
            ),
        )
    }
}

fn check_coi(request: &AccessRequest) -> ReplayStep {
    let required = &request.resource.coi;
    if required.is_empty() {
        return ReplayStep::pass(STEP_COI, "No COI restrictions");
    }

    let overlap: Vec<&str> = request
        .subject
        .acp_coi
        .iter()
        .filter(|c| required.contains(c))
        .map(String::as_str)
        .collect();

    if overlap.is_empty() {
        ReplayStep::fail(
            STEP_COI,
            format!(
                "No COI overlap: subject [{}], resource [{}]",
                request.subject.acp_coi.join(", "),
                required.join(", ")
            ),
        )
    } else {
        ReplayStep::pass(STEP_COI, format!("COI overlap: {}", overlap.join(", ")))
    }
}

fn check_embargo(request: &AccessRequest) -> ReplayStep {
    let Some(created) = request.resource.creation_date else {
        return ReplayStep::pass(STEP_EMBARGO, "No creation date, no embargo");
    };

    let now = request.context.current_time;
    if now >= created {
        ReplayStep::pass(
            STEP_EMBARGO,
            format!("Resource released at {}", created.to_rfc3339()),
        )
    } else {
        ReplayStep::fail(
            STEP_EMBARGO,
            format!("Resource embargoed until {}", created.to_rfc3339()),
        )
    }
}

fn check_action(request: &AccessRequest) -> ReplayStep {
    let action = &request.action;

    if action.is_read_class() {
        return ReplayStep::pass(STEP_ACTION, format!("Action {action} is permitted"));
    }

    if action.is_write_class() {
        let origin = &request.subject.origin_instance;
        let owner = &request.resource.instance_id;
        return if !origin.is_empty() && origin == owner {
            ReplayStep::pass(
                STEP_ACTION,
                format!("Action {action} permitted on resource owned by {owner}"),
            )
        } else {
            ReplayStep::fail(
                STEP_ACTION,
                format!("Action {action} requires ownership; resource is owned by {owner}"),
            )
        };
    }

    ReplayStep::fail(STEP_ACTION, format!("Action {action} is not recognized"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use dive_types::{RequestContext, ResourceSecurityLabel, StepResult, SubjectAttributes};
    use test_case::test_case;

    fn request(
        subject: SubjectAttributes,
        resource: ResourceSecurityLabel,
        action: &str,
    ) -> AccessRequest {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AccessRequest::new(subject, resource, action, RequestContext::new("req-1", now))
    }

    fn fvey_subject() -> SubjectAttributes {
        SubjectAttributes::new("john.doe@mil", "SECRET", "USA")
            .with_coi(["FVEY"])
            .with_origin("USA")
    }

    fn fvey_resource() -> ResourceSecurityLabel {
        ResourceSecurityLabel::new("doc-1", Clearance::Secret, &["USA", "GBR"])
            .with_coi(["FVEY"])
            .with_instance("USA")
    }

    fn step<'a>(replay: &'a DecisionReplay, rule: &str) -> &'a ReplayStep {
        replay.steps.iter().find(|s| s.rule == rule).unwrap()
    }

    #[test_case("TOP_SECRET", "UNCLASSIFIED", true)]
    #[test_case("CONFIDENTIAL", "SECRET", false)]
    #[test_case("RESTRICTED", "UNCLASSIFIED", true)]
    #[test_case("UNKNOWN", "SECRET", false)]
    #[test_case("SECRET", "SECRET", true)]
    #[test_case("secret", "UNCLASSIFIED", true)]
    #[test_case("SECRET", "BOGUS", false)]
    fn test_compare_clearance(subject: &str, resource: &str, expected: bool) {
        assert_eq!(compare_clearance(subject, resource), expected);
    }

    #[test]
    fn test_end_to_end_allow() {
        let replay = replay(&request(fvey_subject(), fvey_resource(), "read"));
        assert!(replay.allow);
        assert_eq!(replay.steps.len(), 6);
        assert!(replay.steps.iter().all(|s| s.result == StepResult::Pass));
        assert_eq!(step(&replay, STEP_COI).reason, "COI overlap: FVEY");
    }

    #[test]
    fn test_unauthenticated_fails() {
        let subject = fvey_subject().with_authenticated(false);
        let replay = replay(&request(subject, fvey_resource(), "read"));
        assert!(!replay.allow);
        assert!(!step(&replay, STEP_AUTHENTICATED).passed());
        assert_eq!(replay.reason, "Subject is not authenticated");
    }

    #[test]
    fn test_empty_releasability_always_fails() {
        for country in ["USA", "GBR", "FRA"] {
            let mut subject = fvey_subject();
            subject.country_of_affiliation = country.to_string();
            let resource = ResourceSecurityLabel::new("doc-2", Clearance::Unclassified, &[]);
            let replay = replay(&request(subject, resource, "read"));
            assert!(!step(&replay, STEP_RELEASABILITY).passed());
        }
    }

    #[test]
    fn test_coi_violation() {
        let subject = fvey_subject().with_coi(["NATO"]);
        let replay = replay(&request(subject, fvey_resource(), "read"));
        let coi = step(&replay, STEP_COI);
        assert!(!coi.passed());
        assert!(coi.reason.starts_with("No COI overlap"));
    }

    #[test]
    fn test_no_coi_restriction_passes() {
        let subject = fvey_subject().with_coi(Vec::<String>::new());
        let resource = ResourceSecurityLabel::new("doc-3", Clearance::Secret, &["USA"]);
        let replay = replay(&request(subject, resource, "read"));
        assert_eq!(step(&replay, STEP_COI).reason, "No COI restrictions");
    }

    #[test]
    fn test_future_creation_date_is_embargoed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let resource = fvey_resource().with_creation_date(now + Duration::days(1));
        let replay = replay(&request(fvey_subject(), resource, "read"));
        assert!(!step(&replay, STEP_EMBARGO).passed());

        let released = fvey_resource().with_creation_date(now - Duration::days(1));
        let replay = super::replay(&request(fvey_subject(), released, "read"));
        assert!(step(&replay, STEP_EMBARGO).passed());
    }

    #[test]
    fn test_insufficient_clearance() {
        let subject = SubjectAttributes::new("analyst", "CONFIDENTIAL", "USA")
            .with_coi(["FVEY"])
            .with_origin("USA");
        let replay = replay(&request(subject, fvey_resource(), "read"));
        assert!(!step(&replay, STEP_CLEARANCE).passed());
    }

    #[test]
    fn test_national_clearance_is_translated() {
        let mut subject = SubjectAttributes::new("pierre", "SECRET DEFENSE", "FRA")
            .with_clearance_original("SECRET DEFENSE")
            .with_origin("FRA");
        subject.acp_coi = vec!["NATO".into()];
        let resource = ResourceSecurityLabel::new("doc-4", Clearance::Secret, &["FRA"])
            .with_coi(["NATO"])
            .with_instance("USA");
        let replay = replay(&request(subject, resource, "read"));
        assert!(step(&replay, STEP_CLEARANCE).passed());
    }

    #[test_case("GEHEIM", "DEU", true ; "german secret")]
    #[test_case("secret defense", "FRA", true ; "french secret any case")]
    #[test_case("OFFICIAL-SENSITIVE", "GBR", false ; "uk restricted below secret")]
    #[test_case("NOT A LEVEL", "USA", false ; "unmapped stays incomparable")]
    fn test_raw_national_clearance(clearance: &str, country: &str, expected: bool) {
        let subject = SubjectAttributes::new("officer", clearance, country).with_origin(country);
        let resource = ResourceSecurityLabel::new("doc-5", Clearance::Secret, &[country]);
        let replay = replay(&request(subject, resource, "read"));
        assert_eq!(step(&replay, STEP_CLEARANCE).passed(), expected);
    }

    #[test_case("read", "GBR", true ; "read anywhere")]
    #[test_case("decrypt", "GBR", true ; "decrypt is read class")]
    #[test_case("update", "USA", true ; "write on own resource")]
    #[test_case("delete", "GBR", false ; "write on foreign resource")]
    #[test_case("launch", "USA", false ; "unknown action")]
    fn test_action_step(action: &str, owner: &str, expected: bool) {
        let resource = fvey_resource().with_instance(owner);
        let replay = replay(&request(fvey_subject(), resource, action));
        assert_eq!(step(&replay, STEP_ACTION).passed(), expected);
    }

    #[test]
    fn test_all_failures_reported() {
        let subject = SubjectAttributes::new("x", "RESTRICTED", "FRA").with_authenticated(false);
        let replay = replay(&request(subject, fvey_resource(), "read"));
        assert_eq!(replay.failed_steps().count(), 4);
    }
}
