//! Read-side patient operations.
//!
//! [`PatientService`] ties the locator, parser, merger and metrics together: it finds a
//! patient's bundles across collections, parses each with the side its collection implies,
//! merges them in the configured precedence and shapes the result for a caller.

use crate::collection::{Collection, REMINDER_ORDER};
use crate::config::CoreConfig;
use crate::locator::{contact_patient_uhid, find_all, find_one, locate, BundleQuery};
use crate::merge::merge;
use crate::parser::parse;
use crate::record::MergedPatient;
use crate::store::DocumentStore;
use crate::view::{DoctorPatientSides, PatientView, ReminderView, StaffPatientSummary};
use crate::{PatientError, PatientResult};
use chrono::NaiveDate;
use fhir::{Bundle, FhirResource, PractitionerRole, Resource, Side};
use prom_types::Uhid;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Pure patient data operations over a [`DocumentStore`].
#[derive(Clone)]
pub struct PatientService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn DocumentStore>,
}

impl PatientService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn DocumentStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Merge every bundle that mentions `uhid` in the collections of `order`.
    ///
    /// Returns `Ok(None)` when no collection holds a matching bundle.
    pub fn merged_patient(
        &self,
        uhid: &Uhid,
        order: &[Collection],
    ) -> PatientResult<Option<MergedPatient>> {
        let located = locate(self.store.as_ref(), uhid.as_str(), order)?;
        if located.is_empty() {
            return Ok(None);
        }

        let records: Vec<_> = located
            .iter()
            .map(|(collection, stored)| (*collection, parse(&stored.bundle, collection.side())))
            .collect();
        let merged = merge(uhid.as_str(), &records);

        if merged.unmatched_observations > 0 {
            tracing::debug!(
                uhid = %uhid,
                unmatched = merged.unmatched_observations,
                "merged patient with unrecognised observations"
            );
        }
        Ok(Some(merged))
    }

    /// Full record for one patient with completion counts and phase status.
    ///
    /// # Errors
    ///
    /// - [`PatientError::Text`] if `uhid` is not a valid identifier
    /// - [`PatientError::NotFound`] if no collection mentions the patient
    pub fn patient_view(&self, uhid: &str, today: NaiveDate) -> PatientResult<PatientView> {
        let uhid = Uhid::parse(uhid)?;
        let merged = self
            .merged_patient(&uhid, self.cfg.merge_order())?
            .ok_or_else(|| PatientError::NotFound(format!("patient {uhid}")))?;
        Ok(PatientView::new(merged, today))
    }

    /// Every patient whose contact bundle names `staff_uhid` as a practitioner.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if no patient is linked to the staff member.
    pub fn staff_patients(
        &self,
        staff_uhid: &str,
        today: NaiveDate,
    ) -> PatientResult<Vec<StaffPatientSummary>> {
        let staff_uhid = Uhid::parse(staff_uhid)?;
        let contacts = find_all(
            self.store.as_ref(),
            Collection::PatientContact,
            BundleQuery::StaffMember(staff_uhid.as_str()),
        )?;

        let mut summaries = Vec::new();
        for stored in contacts {
            let Some(patient_uhid) = contact_patient_uhid(&stored.bundle) else {
                tracing::warn!(bundle = %stored.id, "contact bundle without a patient UHID");
                continue;
            };
            let Ok(patient_uhid) = Uhid::parse(&patient_uhid) else {
                tracing::warn!(bundle = %stored.id, "contact bundle with an invalid patient UHID");
                continue;
            };
            if let Some(merged) = self.merged_patient(&patient_uhid, self.cfg.merge_order())? {
                summaries.push(PatientView::new(merged, today).into());
            }
        }

        if summaries.is_empty() {
            return Err(PatientError::NotFound(format!(
                "no patients for staff member {staff_uhid}"
            )));
        }
        Ok(summaries)
    }

    /// Every patient with a knee assigned to `doctor_uhid`, with the questionnaires of each
    /// assigned side.
    ///
    /// Sides come from the role narrative of the doctor's practitioner entry in the patient's
    /// contact bundle. Patients for whom the doctor holds no side role are left out.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if no patient has a side assigned to the doctor.
    pub fn doctor_patient_sides(
        &self,
        doctor_uhid: &str,
    ) -> PatientResult<Vec<DoctorPatientSides>> {
        let doctor_uhid = Uhid::parse(doctor_uhid)?;
        let contacts = find_all(
            self.store.as_ref(),
            Collection::PatientContact,
            BundleQuery::StaffMember(doctor_uhid.as_str()),
        )?;

        let mut rows = Vec::new();
        for stored in contacts {
            let Some(patient_uhid) = contact_patient_uhid(&stored.bundle) else {
                tracing::warn!(bundle = %stored.id, "contact bundle without a patient UHID");
                continue;
            };
            let assigned_sides = doctor_sides(&stored.bundle, doctor_uhid.as_str());
            if assigned_sides.is_empty() {
                continue;
            }

            let mut scores = BTreeMap::new();
            for &side in &assigned_sides {
                let side_scores = find_one(
                    self.store.as_ref(),
                    Collection::for_side(side),
                    BundleQuery::PatientId(&patient_uhid),
                )?
                .map(|stored| parse(&stored.bundle, Some(side)).side(side).clone())
                .unwrap_or_default();
                scores.insert(side, side_scores);
            }
            rows.push(DoctorPatientSides {
                patient_uhid,
                assigned_sides,
                scores,
            });
        }

        if rows.is_empty() {
            return Err(PatientError::NotFound(format!(
                "no patients for doctor {doctor_uhid}"
            )));
        }
        Ok(rows)
    }

    /// Contact details and outstanding questionnaires for a reminder.
    ///
    /// Only the contact, medical and per-side collections take part, in the configured order.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if none of those collections mention the patient.
    pub fn reminder_view(&self, uhid: &str) -> PatientResult<ReminderView> {
        let uhid = Uhid::parse(uhid)?;
        let order: Vec<Collection> = self
            .cfg
            .merge_order()
            .iter()
            .copied()
            .filter(|c| REMINDER_ORDER.contains(c))
            .collect();

        let merged = self
            .merged_patient(&uhid, &order)?
            .ok_or_else(|| PatientError::NotFound(format!("patient {uhid}")))?;
        Ok(merged.into())
    }
}

/// Sides for which `doctor_uhid` is the named doctor in a contact bundle, in side order.
fn doctor_sides(bundle: &Bundle, doctor_uhid: &str) -> Vec<Side> {
    let sides: BTreeSet<Side> = bundle
        .resources()
        .filter_map(|resource| match resource {
            Resource::Practitioner(practitioner)
                if practitioner
                    .identifier
                    .iter()
                    .any(|i| i.value.as_deref() == Some(doctor_uhid)) =>
            {
                match practitioner
                    .narrative_div()
                    .and_then(PractitionerRole::from_narrative)?
                {
                    PractitionerRole::LeftDoctor => Some(Side::Left),
                    PractitionerRole::RightDoctor => Some(Side::Right),
                    PractitionerRole::AdminStaff => None,
                }
            }
            _ => None,
        })
        .collect();
    sides.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PATIENT_VIEW_ORDER;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::path::PathBuf;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn bundle(entries: serde_json::Value) -> Bundle {
        Bundle::from_value(json!({ "resourceType": "Bundle", "entry": entries })).unwrap()
    }

    fn contact(uhid: &str, admin: &str, phone: &str) -> Bundle {
        bundle(json!([
            { "resource": {
                "resourceType": "Patient",
                "identifier": [{ "system": "http://hospital.smarthealth.org/uhid", "value": uhid }],
                "telecom": [{ "system": "phone", "value": phone }]
            }},
            { "resource": {
                "resourceType": "Practitioner",
                "identifier": [{ "system": "http://hospital.smarthealth.org/uhid", "value": admin }],
                "text": { "div": "<div xmlns='http://www.w3.org/1999/xhtml'>Admin Staff</div>" }
            }}
        ]))
    }

    fn questionnaire(uhid: &str, completed: bool) -> Bundle {
        bundle(json!([
            { "resource": {
                "resourceType": "Patient",
                "text": { "div": format!("<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>Patient ID: {uhid}</p></div>") }
            }},
            { "resource": {
                "resourceType": "Observation",
                "code": { "text": "Oxford Knee Score (OKS)" },
                "valueString": "Scores (Pre Op)",
                "component": [{ "code": { "text": "Completion Status" }, "valueBoolean": completed }]
            }}
        ]))
    }

    fn medical(uhid: &str, surgery_left: &str) -> Bundle {
        bundle(json!([
            { "resource": { "resourceType": "Patient", "id": uhid } },
            { "resource": {
                "resourceType": "Observation",
                "code": { "text": "Surgery Date Left" },
                "valueString": surgery_left
            }}
        ]))
    }

    fn service(store: MemoryStore) -> PatientService {
        let cfg = CoreConfig::new(PathBuf::from("unused"), PATIENT_VIEW_ORDER.to_vec()).unwrap();
        PatientService::new(Arc::new(cfg), Arc::new(store))
    }

    #[test]
    fn patient_view_merges_across_collections() {
        let store = MemoryStore::new();
        store
            .insert(Collection::PatientContact, &contact("MH001", "ADM1", "900"))
            .unwrap();
        store
            .insert(Collection::PatientMedical, &medical("MH001", "2023-06-01"))
            .unwrap();
        store
            .insert(Collection::MedicalRight, &questionnaire("mh001", true))
            .unwrap();

        let view = service(store).patient_view("MH001", today()).unwrap();
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["Patient"]["phone"], json!("900"));
        assert_eq!(value["Medical_Right"]["OKS"]["Pre_Op"]["completed"], json!(true));
        assert!(value.get("Medical_Left").is_none());
        assert_eq!(value["Medical_Right_Completion"], json!(100.0));
        assert_eq!(value["Medical_Left_Completion"], json!("NA"));
        assert_eq!(value["Patient_Status_Left"], json!(["6W", "3M", "6M"]));
    }

    #[test]
    fn unknown_patient_is_not_found() {
        let err = service(MemoryStore::new())
            .patient_view("MH404", today())
            .unwrap_err();
        assert!(matches!(err, PatientError::NotFound(_)));
    }

    #[test]
    fn invalid_uhid_is_rejected() {
        let err = service(MemoryStore::new())
            .patient_view("  ", today())
            .unwrap_err();
        assert!(matches!(err, PatientError::Text(_)));
    }

    #[test]
    fn staff_patients_lists_linked_patients_only() {
        let store = MemoryStore::new();
        store
            .insert(Collection::PatientContact, &contact("MH001", "ADM1", "900"))
            .unwrap();
        store
            .insert(Collection::PatientContact, &contact("MH002", "ADM2", "901"))
            .unwrap();
        store
            .insert(Collection::MedicalLeft, &questionnaire("MH001", false))
            .unwrap();

        let service = service(store);
        let rows = service.staff_patients("ADM1", today()).unwrap();
        assert_eq!(rows.len(), 1);
        let value = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(value["uhid"], json!("MH001"));
        assert_eq!(value["Medical_Left_Completion"], json!(0.0));
        assert!(value.get("Medical_Left").is_none());

        assert!(matches!(
            service.staff_patients("ADM9", today()),
            Err(PatientError::NotFound(_))
        ));
    }

    fn doctor_contact(uhid: &str, left: &str, right: &str) -> Bundle {
        let practitioner = |doctor: &str, role: &str| {
            json!({ "resource": {
                "resourceType": "Practitioner",
                "identifier": [{ "system": "http://hospital.smarthealth.org/uhid", "value": doctor }],
                "text": { "div": format!("<div xmlns='http://www.w3.org/1999/xhtml'>{role}</div>") }
            }})
        };
        bundle(json!([
            { "resource": {
                "resourceType": "Patient",
                "identifier": [{ "system": "http://hospital.smarthealth.org/uhid", "value": uhid }]
            }},
            practitioner(left, "Left Doctor"),
            practitioner(right, "Right Doctor"),
            practitioner("ADM1", "Admin Staff")
        ]))
    }

    #[test]
    fn doctor_patient_sides_follow_practitioner_roles() {
        let store = MemoryStore::new();
        store
            .insert(Collection::PatientContact, &doctor_contact("MH001", "DOC1", "DOC2"))
            .unwrap();
        store
            .insert(Collection::PatientContact, &doctor_contact("MH002", "DOC1", "DOC1"))
            .unwrap();
        store
            .insert(Collection::MedicalLeft, &questionnaire("MH001", true))
            .unwrap();
        store
            .insert(Collection::MedicalRight, &questionnaire("MH001", false))
            .unwrap();

        let service = service(store);
        let rows = service.doctor_patient_sides("DOC1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].patient_uhid, "MH001");
        assert_eq!(rows[0].assigned_sides, vec![Side::Left]);
        assert_eq!(
            rows[0].scores[&Side::Left].oks[&fhir::Phase::PreOp].completed,
            Some(true)
        );
        assert!(!rows[0].scores.contains_key(&Side::Right));
        assert_eq!(rows[1].assigned_sides, vec![Side::Left, Side::Right]);
        assert!(rows[1].scores[&Side::Right].is_empty());

        let right = service.doctor_patient_sides("DOC2").unwrap();
        assert_eq!(right[0].assigned_sides, vec![Side::Right]);
        assert_eq!(
            right[0].scores[&Side::Right].oks[&fhir::Phase::PreOp].completed,
            Some(false)
        );
    }

    #[test]
    fn admin_staff_has_no_doctor_sides() {
        let store = MemoryStore::new();
        store
            .insert(Collection::PatientContact, &doctor_contact("MH001", "DOC1", "DOC2"))
            .unwrap();
        assert!(matches!(
            service(store).doctor_patient_sides("ADM1"),
            Err(PatientError::NotFound(_))
        ));
    }

    #[test]
    fn reminder_view_ignores_base_collection() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::PatientBase,
                &bundle(json!([{ "resource": {
                    "resourceType": "Patient",
                    "identifier": [{ "value": "MH001" }],
                    "telecom": [{ "system": "email", "value": "base@example.org" }]
                }}])),
            )
            .unwrap();
        let service = service(store);
        assert!(matches!(
            service.reminder_view("MH001"),
            Err(PatientError::NotFound(_))
        ));
    }

    #[test]
    fn reminder_view_lists_pending_questionnaires() {
        let store = MemoryStore::new();
        store
            .insert(Collection::PatientContact, &contact("MH001", "ADM1", "900"))
            .unwrap();
        store
            .insert(Collection::MedicalLeft, &questionnaire("MH001", false))
            .unwrap();
        store
            .insert(Collection::MedicalRight, &questionnaire("MH001", true))
            .unwrap();

        let reminder = service(store).reminder_view("MH001").unwrap();
        assert_eq!(reminder.patient.phone.as_deref(), Some("900"));
        assert_eq!(reminder.medical_left.len(), 1);
        assert!(reminder.medical_right.is_empty());
    }
}
