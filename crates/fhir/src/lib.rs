//! FHIR wire/boundary support for the PROM patient record store.
//!
//! This crate provides **wire models** and **format/translation helpers** for the FHIR-style
//! bundles the store holds:
//! - [`Bundle`] / [`Entry`] documents and on-demand decoding into typed [`Resource`]s
//! - the free-text label translation layer ([`labels`]) that turns narrative strings and code
//!   labels into closed enums
//! - builders ([`builders`]) that produce the bundles written by registration, questionnaire
//!   and surgery-detail workflows
//!
//! Decoding is deliberately lenient: stored documents have no enforced schema, so a field with
//! an unexpected JSON type decodes to its empty value rather than failing the resource, and a
//! malformed entry is skipped rather than failing the bundle. The only hard failure is a
//! document that is not a JSON object at all.

pub mod builders;
pub mod bundle;
pub mod labels;
pub mod resources;
mod wire;

// Re-export facades
pub use builders::{
    CommentData, PatientBaseData, PatientContactData, PatientMedicalData,
    QuestionnaireAssignmentData, QuestionnaireScoreData, Questionnaires, Registration,
    SurgeryDetails, SurgeryDetailsData, SurgeryFieldUpdate,
};
pub use bundle::{Bundle, Entry};
pub use resources::{
    Appointment, Coverage, DocumentReference, FhirResource, Observation, Organization, Patient,
    Practitioner, Provenance, Resource,
};

// Re-export public domain-level types
pub use labels::{
    Gender, Instrument, ObservationCode, Phase, PractitionerRole, ProvenanceActivity, Side,
};
pub use wire::{
    Address, Annotation, Attachment, CodeableConcept, Coding, ContactPoint, DocumentContent,
    HumanName, Identifier, Meta, Narrative, ObservationComponent, Participant, Period,
    ProvenanceAgent, Quantity, Reference,
};

// Re-export identifier types from prom_uuid crate
pub use prom_uuid::ResourceId;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
