//! Write-side services.
//!
//! Each service builds bundles through [`fhir::builders`] and persists them through a
//! [`crate::store::DocumentStore`]:
//!
//! - [`registration`]: base, contact and medical registration bundles
//! - [`questionnaires`]: assigning, scoring and deleting questionnaires on a side
//! - [`follow_up`]: appending follow-up comments to the medical bundle
//! - [`update`]: correcting a registered patient across every bundle they own
//! - [`surgery`]: capturing, looking up and correcting surgery details
//!
//! Updates are read-modify-write on a whole bundle with no locking.

pub mod follow_up;
pub mod questionnaires;
pub mod registration;
pub mod surgery;
pub mod update;
