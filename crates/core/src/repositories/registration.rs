//! Patient registration.

use crate::collection::Collection;
use crate::locator::{find_one, BundleQuery};
use crate::store::DocumentStore;
use crate::{PatientError, PatientResult};
use chrono::Utc;
use fhir::{PatientBaseData, PatientContactData, PatientMedicalData, Registration};
use prom_uuid::BundleId;
use std::sync::Arc;

/// Stores the three registration bundles of a patient.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn DocumentStore>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Store demographics and VIP status in `patient_base`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::AlreadyExists`] if a base bundle already identifies this UHID.
    pub fn store_patient_base(&self, data: &PatientBaseData) -> PatientResult<BundleId> {
        self.ensure_new(data)?;
        let bundle = Registration::base_bundle(data, Utc::now())?;
        let id = self.store.insert(Collection::PatientBase, &bundle)?;
        tracing::info!(uhid = %data.uhid, bundle = %id, "stored patient base");
        Ok(id)
    }

    /// Store contact details, care team and the first OPD appointment in `patient_contact`.
    pub fn store_patient_contact(&self, data: &PatientContactData) -> PatientResult<BundleId> {
        let bundle = Registration::contact_bundle(data, Utc::now())?;
        let id = self.store.insert(Collection::PatientContact, &bundle)?;
        tracing::info!(uhid = %data.uhid, bundle = %id, "stored patient contact");
        Ok(id)
    }

    /// Store clinical details, comments, funding and identity documents in `patient_medical`.
    pub fn store_patient_medical(&self, data: &PatientMedicalData) -> PatientResult<BundleId> {
        let bundle = Registration::medical_bundle(data, Utc::now())?;
        let id = self.store.insert(Collection::PatientMedical, &bundle)?;
        tracing::info!(uhid = %data.uhid, bundle = %id, "stored patient medical");
        Ok(id)
    }

    /// Register base, contact and medical details in one call.
    ///
    /// The duplicate check runs before anything is written, so a rejected registration leaves
    /// the store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if the three parts name different patients and
    /// [`PatientError::AlreadyExists`] if the patient is already registered.
    pub fn register_full(
        &self,
        base: &PatientBaseData,
        contact: &PatientContactData,
        medical: &PatientMedicalData,
    ) -> PatientResult<()> {
        if contact.uhid != base.uhid || medical.uhid != base.uhid {
            return Err(PatientError::InvalidInput(
                "base, contact and medical details must share one UHID".into(),
            ));
        }
        self.ensure_new(base)?;

        self.store_patient_base(base)?;
        self.store_patient_contact(contact)?;
        self.store_patient_medical(medical)?;
        Ok(())
    }

    fn ensure_new(&self, data: &PatientBaseData) -> PatientResult<()> {
        let existing = find_one(
            self.store.as_ref(),
            Collection::PatientBase,
            BundleQuery::Identifier(data.uhid.as_str()),
        )?;
        if existing.is_some() {
            return Err(PatientError::AlreadyExists(format!(
                "patient {} in patient_base",
                data.uhid
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PATIENT_VIEW_ORDER;
    use crate::config::CoreConfig;
    use crate::patient::PatientService;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use fhir::{CommentData, Gender};
    use prom_types::Uhid;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn uhid(s: &str) -> Uhid {
        Uhid::parse(s).unwrap()
    }

    fn base() -> PatientBaseData {
        PatientBaseData {
            uhid: uhid("MH001"),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            vip: true,
            birth_date: "15-08-1960".into(),
            gender: Gender::Female,
        }
    }

    fn contact() -> PatientContactData {
        PatientContactData {
            uhid: uhid("MH001"),
            email: "asha@example.org".into(),
            phone: "9000000000".into(),
            alternate_phone: String::new(),
            address: "Chennai".into(),
            left_doctor: uhid("DOC1"),
            right_doctor: uhid("DOC2"),
            admin_staff: uhid("ADM1"),
            profile_picture_url: None,
        }
    }

    fn medical() -> PatientMedicalData {
        PatientMedicalData {
            uhid: uhid("MH001"),
            blood_group: "B+".into(),
            height_cm: 160.0,
            weight_kg: 70.0,
            activation_status: true,
            activation_comments: vec![CommentData {
                timestamp: "2025-01-01".into(),
                comment: "Activation - consented".into(),
            }],
            follow_up_comments: Vec::new(),
            operation_funding: "Insurance".into(),
            id_proofs: BTreeMap::from([("Aadhar".to_string(), "1234".to_string())]),
            current_status: "Pre-op".into(),
            surgery_date_left: Some("2023-06-01".into()),
            surgery_date_right: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn duplicate_base_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = RegistrationService::new(store.clone());
        service.store_patient_base(&base()).unwrap();

        let err = service.store_patient_base(&base()).unwrap_err();
        assert!(matches!(err, PatientError::AlreadyExists(_)));
        assert_eq!(store.scan(Collection::PatientBase).unwrap().len(), 1);
    }

    #[test]
    fn register_full_rejects_mismatched_uhids_before_writing() {
        let store = Arc::new(MemoryStore::new());
        let service = RegistrationService::new(store.clone());
        let mut other = contact();
        other.uhid = uhid("MH002");

        let err = service
            .register_full(&base(), &other, &medical())
            .unwrap_err();
        assert!(matches!(err, PatientError::InvalidInput(_)));
        assert!(store.scan(Collection::PatientBase).unwrap().is_empty());
    }

    #[test]
    fn registered_patient_reads_back_through_the_view() {
        let store = Arc::new(MemoryStore::new());
        RegistrationService::new(store.clone())
            .register_full(&base(), &contact(), &medical())
            .unwrap();

        let cfg = CoreConfig::new(PathBuf::from("unused"), PATIENT_VIEW_ORDER.to_vec()).unwrap();
        let view = PatientService::new(Arc::new(cfg), store)
            .patient_view("MH001", today())
            .unwrap();
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["Patient"]["name"], json!("Asha Rao"));
        assert_eq!(value["Patient"]["birthDate"], json!("1960-08-15"));
        assert_eq!(value["Patient"]["phone"], json!("9000000000"));
        assert_eq!(value["Practitioners"]["admin_staff"], json!("ADM1"));
        assert_eq!(value["VIP_Status"], json!(true));
        assert_eq!(value["Medical"]["blood_group"], json!("B+"));
        assert_eq!(value["Medical"]["height"], json!("160.0 cm"));
        assert_eq!(value["Medical"]["id_proofs"]["aadhar"]["number"], json!("1234"));
        assert_eq!(value["Patient_Status_Left"], json!(["6W", "3M", "6M"]));
        assert_eq!(value["Patient_Status_Right"], json!("NA"));
    }
}
