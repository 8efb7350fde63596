//! Surgery details: capture, lookup and field corrections.
//!
//! Each capture is stored as its own bundle in `patient_surgery_details`. Lookups and updates
//! find bundles by the UHID on their patient entry, matched as a whole identifier.

use crate::collection::Collection;
use crate::locator::{find_all, find_one, BundleQuery};
use crate::store::{DocumentStore, StoredBundle};
use crate::{PatientError, PatientResult};
use fhir::{Resource, SurgeryDetails, SurgeryDetailsData, SurgeryFieldUpdate};
use prom_types::Uhid;
use prom_uuid::BundleId;
use std::sync::Arc;

#[derive(Clone)]
pub struct SurgeryService {
    store: Arc<dyn DocumentStore>,
}

impl SurgeryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store one capture of operation records.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if there are no records.
    pub fn store_details(&self, data: &SurgeryDetailsData) -> PatientResult<BundleId> {
        if data.records.is_empty() {
            return Err(PatientError::InvalidInput(
                "surgery details need at least one record".into(),
            ));
        }
        let bundle = SurgeryDetails::bundle(data)?;
        let id = self.store.insert(Collection::SurgeryDetails, &bundle)?;
        tracing::info!(uhid = %data.uhid, side = %data.side, bundle = %id, "stored surgery details");
        Ok(id)
    }

    /// Every surgery details bundle of a patient, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the patient has none.
    pub fn details_for_patient(&self, uhid: &Uhid) -> PatientResult<Vec<StoredBundle>> {
        let found = find_all(
            self.store.as_ref(),
            Collection::SurgeryDetails,
            BundleQuery::PatientId(uhid.as_str()),
        )?;
        if found.is_empty() {
            return Err(PatientError::NotFound(format!("surgery details for {uhid}")));
        }
        Ok(found)
    }

    /// Apply a correction to the patient's first surgery details bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the patient has no surgery details or no
    /// observation holds the field.
    pub fn update_field(&self, uhid: &Uhid, update: &SurgeryFieldUpdate) -> PatientResult<()> {
        let mut stored = find_one(
            self.store.as_ref(),
            Collection::SurgeryDetails,
            BundleQuery::PatientId(uhid.as_str()),
        )?
        .ok_or_else(|| PatientError::NotFound(format!("surgery details for {uhid}")))?;

        let mut updated = false;
        for entry in &mut stored.bundle.entry {
            let Some(Resource::Observation(mut observation)) = entry.decode() else {
                continue;
            };
            if SurgeryDetails::apply_update(&mut observation, update) {
                entry.replace_resource(&observation)?;
                updated = true;
            }
        }
        if !updated {
            return Err(PatientError::NotFound(format!(
                "no matching surgery field for {uhid}"
            )));
        }

        self.store
            .replace(Collection::SurgeryDetails, &stored.id, &stored.bundle)?;
        tracing::info!(%uhid, bundle = %stored.id, "updated surgery details");
        Ok(())
    }
}
