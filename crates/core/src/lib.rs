//! # PROM Core
//!
//! Core business logic for the PROM patient record backend.
//!
//! This crate reads patient data spread over several bundle collections and turns it into one
//! record per patient:
//! - [`locator`]: find a patient's bundles across collections
//! - [`parser`]: decode one bundle into a [`ParsedRecord`]
//! - [`merge`]: combine per-collection records in a configured precedence
//! - [`metrics`]: questionnaire completion and post-operative phase
//! - [`view`]: the response shapes built from a merged patient
//!
//! Writes go through the services in [`repositories`]. Persistence is behind the
//! [`store::DocumentStore`] trait.
//!
//! **No API concerns**: HTTP servers and request DTOs belong in `api-rest` and `api-shared`.

pub mod collection;
pub mod config;
pub mod constants;
pub mod error;
pub mod locator;
pub mod merge;
pub mod metrics;
pub mod parser;
pub mod patient;
pub mod record;
pub mod repositories;
pub mod store;
pub mod view;

pub use collection::Collection;
pub use config::CoreConfig;
pub use error::{PatientError, PatientResult};
pub use patient::PatientService;
pub use record::{MergedPatient, ParsedRecord};
pub use repositories::follow_up::FollowUpService;
pub use repositories::questionnaires::{
    AssignmentOutcome, AssignmentRequest, QuestionnaireService,
};
pub use repositories::registration::RegistrationService;
pub use repositories::surgery::SurgeryService;
pub use repositories::update::PatientUpdate;
pub use store::{DocumentStore, JsonFileStore, MemoryStore, StoredBundle};
pub use view::{DoctorPatientSides, PatientView, ReminderView, StaffPatientSummary};
