//! Follow-up comments on the medical record.

use crate::collection::Collection;
use crate::locator::{find_one, BundleQuery};
use crate::store::DocumentStore;
use crate::{PatientError, PatientResult};
use chrono::Utc;
use fhir::Registration;
use prom_types::{NonEmptyText, Uhid};
use std::sync::Arc;

#[derive(Clone)]
pub struct FollowUpService {
    store: Arc<dyn DocumentStore>,
}

impl FollowUpService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append a follow-up comment provenance to the patient's medical bundle.
    ///
    /// The bundle is the first in `patient_medical` holding a resource whose id is the UHID.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the patient has no medical bundle.
    pub fn add_follow_up(&self, uhid: &Uhid, comment: &NonEmptyText) -> PatientResult<()> {
        let mut stored = find_one(
            self.store.as_ref(),
            Collection::PatientMedical,
            BundleQuery::ResourceId(uhid.as_str()),
        )?
        .ok_or_else(|| PatientError::NotFound(format!("patient {uhid}")))?;

        stored
            .bundle
            .entry
            .push(Registration::follow_up_entry(comment.as_str(), Utc::now())?);
        self.store
            .replace(Collection::PatientMedical, &stored.id, &stored.bundle)?;

        tracing::info!(%uhid, bundle = %stored.id, "added follow-up comment");
        Ok(())
    }
}
