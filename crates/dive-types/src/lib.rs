//! # dive-types: Core types for coalition access control
//!
//! This crate contains the shared data model used across the DIVE system:
//! - Classification hierarchy ([`Clearance`])
//! - Request attributes ([`SubjectAttributes`], [`ResourceSecurityLabel`], [`RequestContext`])
//! - Access requests ([`AccessRequest`], [`Action`])
//! - Decisions ([`AuthorizationDecision`], [`Obligation`], [`AuditEntry`])
//! - Replay traces ([`ReplayStep`])
//! - Key access objects ([`KeyAccessObject`], [`PolicyBinding`])
//! - The decision error taxonomy ([`DecisionError`])

mod attributes;
mod clearance;
mod decision;
mod error;
mod kao;

pub use attributes::{AccessRequest, Action, RequestContext, ResourceSecurityLabel, SubjectAttributes};
pub use clearance::{Clearance, ParseClearanceError};
pub use decision::{
    AuditEntry, AuditOutcome, AuthorizationDecision, EvaluationDetails, Obligation,
    ObligationStatus, ReplayStep, StepResult, obligation,
};
pub use error::{DecisionError, ExternalServiceError, Result};
pub use kao::{KeyAccessObject, PolicyBinding};
