//! In-place corrections to a registered patient.
//!
//! An update touches every bundle the patient owns, in every collection. Each field lands on
//! the resources that carry it: demographics on the named Patient resource, clinical values on
//! the matching observations, funding on the coverage and identity numbers on the document
//! references. Narratives are rewritten alongside the values they describe.

use crate::collection::Collection;
use crate::locator::{find_all, find_one, BundleQuery};
use crate::repositories::registration::RegistrationService;
use crate::{PatientError, PatientResult};
use chrono::NaiveDate;
use fhir::labels::{patient_id_from_narrative, xhtml_div, PATIENT_ID_MARKER};
use fhir::{
    Coverage, DocumentReference, Entry, Gender, HumanName, Narrative, Observation,
    ObservationCode, Patient, Quantity, Resource, Side,
};
use prom_types::Uhid;
use std::collections::{BTreeMap, BTreeSet};

const MEDICAL_UHID_MARKER: &str = "Patient UHID:";

/// Fields to change. `None` and empty maps leave the stored value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientUpdate {
    /// New UHID. Identifiers, ids, narratives and subject references are renamed.
    pub uhid: Option<Uhid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub vip: Option<bool>,
    pub blood_group: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub current_status: Option<String>,
    pub surgery_date_left: Option<String>,
    pub surgery_date_right: Option<String>,
    pub funding_source: Option<String>,
    /// Document type (for example `aadhar`) to document number.
    pub id_proofs: BTreeMap<String, String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn surgery_date(&self, side: Side) -> Option<&str> {
        match side {
            Side::Left => self.surgery_date_left.as_deref(),
            Side::Right => self.surgery_date_right.as_deref(),
        }
    }
}

impl RegistrationService {
    /// Apply `update` to every bundle of patient `uhid`. Returns the names of the fields that
    /// changed something.
    ///
    /// # Errors
    ///
    /// - [`PatientError::InvalidInput`] if nothing in the update applies to the stored bundles
    /// - [`PatientError::AlreadyExists`] if the new UHID already identifies a patient
    /// - [`PatientError::NotFound`] if no collection holds the patient
    pub fn update_patient(
        &self,
        uhid: &Uhid,
        update: &PatientUpdate,
    ) -> PatientResult<BTreeSet<String>> {
        if update.is_empty() {
            return Err(PatientError::InvalidInput("no valid fields to update".into()));
        }
        if let Some(new_uhid) = update.uhid.as_ref().filter(|new| *new != uhid) {
            self.ensure_uhid_free(new_uhid)?;
        }

        let mut found = false;
        let mut updated = BTreeSet::new();
        for collection in Collection::ALL {
            let bundles = find_all(
                self.store(),
                collection,
                BundleQuery::PatientId(uhid.as_str()),
            )?;
            for mut stored in bundles {
                found = true;
                let mut changed = false;
                for entry in &mut stored.bundle.entry {
                    changed |= amend_entry(entry, uhid, update, &mut updated)?;
                }
                if changed {
                    self.store().replace(collection, &stored.id, &stored.bundle)?;
                    tracing::info!(
                        %uhid,
                        %collection,
                        bundle = %stored.id,
                        "updated patient bundle"
                    );
                }
            }
        }

        if !found {
            return Err(PatientError::NotFound(format!("patient {uhid}")));
        }
        if updated.is_empty() {
            return Err(PatientError::InvalidInput("no valid fields to update".into()));
        }
        Ok(updated)
    }

    fn ensure_uhid_free(&self, uhid: &Uhid) -> PatientResult<()> {
        for collection in Collection::ALL {
            let existing = find_one(
                self.store(),
                collection,
                BundleQuery::PatientId(uhid.as_str()),
            )?;
            if existing.is_some() {
                return Err(PatientError::AlreadyExists(format!(
                    "UHID {uhid} in {collection}"
                )));
            }
        }
        Ok(())
    }
}

fn amend_entry(
    entry: &mut Entry,
    uhid: &Uhid,
    update: &PatientUpdate,
    updated: &mut BTreeSet<String>,
) -> PatientResult<bool> {
    match entry.decode() {
        Some(Resource::Patient(mut patient)) => {
            if amend_patient(&mut patient, uhid, update, updated) {
                entry.replace_resource(&patient)?;
                return Ok(true);
            }
        }
        Some(Resource::Observation(mut observation)) => {
            if amend_observation(&mut observation, uhid, update, updated) {
                entry.replace_resource(&observation)?;
                return Ok(true);
            }
        }
        Some(Resource::Coverage(mut coverage)) => {
            if amend_coverage(&mut coverage, update, updated) {
                entry.replace_resource(&coverage)?;
                return Ok(true);
            }
        }
        Some(Resource::DocumentReference(mut document)) => {
            if amend_document(&mut document, update, updated) {
                entry.replace_resource(&document)?;
                return Ok(true);
            }
        }
        _ => {}
    }
    Ok(false)
}

fn mark(updated: &mut BTreeSet<String>, field: &str) -> bool {
    updated.insert(field.to_owned());
    true
}

fn amend_patient(
    patient: &mut Patient,
    uhid: &Uhid,
    update: &PatientUpdate,
    updated: &mut BTreeSet<String>,
) -> bool {
    let mut changed = false;

    if let Some(new_uhid) = &update.uhid {
        let (old, new) = (uhid.as_str(), new_uhid.as_str());
        for identifier in &mut patient.identifier {
            if identifier.value.as_deref() == Some(old) {
                identifier.value = Some(new.to_owned());
                changed |= mark(updated, "uhid");
            }
        }
        if patient.id.as_deref() == Some(old) {
            patient.id = Some(new.to_owned());
            changed |= mark(updated, "uhid");
        }
        if let Some(text) = patient.text.as_mut() {
            let renamed = text
                .div
                .as_deref()
                .and_then(|div| rename_in_narrative(div, old, new));
            if let Some(div) = renamed {
                text.div = Some(div);
                changed |= mark(updated, "uhid");
            }
        }
    }

    // Demographics belong to the registered Patient resource, the one carrying a name.
    if patient.name.is_empty() {
        return changed;
    }
    let name = &mut patient.name[0];
    if let Some(first) = &update.first_name {
        name.given = vec![first.clone()];
        changed |= mark(updated, "first_name");
    }
    if let Some(last) = &update.last_name {
        name.family = Some(last.clone());
        changed |= mark(updated, "last_name");
    }
    if let Some(date) = update.birth_date {
        patient.birth_date = Some(date.format("%Y-%m-%d").to_string());
        changed |= mark(updated, "birth_date");
    }
    if let Some(gender) = update.gender {
        patient.gender = Some(gender.to_wire().into());
        changed |= mark(updated, "gender");
    }
    if update.first_name.is_some() || update.last_name.is_some() {
        let HumanName { given, family, .. } = &patient.name[0];
        let full = given
            .iter()
            .map(String::as_str)
            .chain(family.as_deref())
            .collect::<Vec<_>>()
            .join(" ");
        patient.text = Some(Narrative::generated(xhtml_div(&format!("Patient: {full}"))));
    }
    changed
}

/// The narrative with the UHID after `Patient ID:` or `Patient UHID:` replaced. Keeps the
/// lowercase form questionnaire bundles use.
fn rename_in_narrative(div: &str, old: &str, new: &str) -> Option<String> {
    if let Some(current) = patient_id_from_narrative(div).filter(|id| id.eq_ignore_ascii_case(old))
    {
        let replacement = if current == current.to_lowercase() {
            new.to_lowercase()
        } else {
            new.to_owned()
        };
        return Some(div.replacen(
            &format!("{PATIENT_ID_MARKER} {current}"),
            &format!("{PATIENT_ID_MARKER} {replacement}"),
            1,
        ));
    }
    let medical = format!("{MEDICAL_UHID_MARKER} {old}");
    div.contains(&medical)
        .then(|| div.replacen(&medical, &format!("{MEDICAL_UHID_MARKER} {new}"), 1))
}

fn amend_observation(
    observation: &mut Observation,
    uhid: &Uhid,
    update: &PatientUpdate,
    updated: &mut BTreeSet<String>,
) -> bool {
    let mut changed = false;

    if let Some(new_uhid) = &update.uhid {
        if let Some(subject) = observation.subject.as_mut() {
            if let Some(prefix) = subject
                .reference
                .as_deref()
                .and_then(|r| r.strip_suffix(uhid.as_str()))
                .map(str::to_owned)
            {
                subject.reference = Some(format!("{prefix}{new_uhid}"));
                changed |= mark(updated, "uhid");
            }
        }
    }

    let Some(code) = observation.code_text().and_then(ObservationCode::classify) else {
        return changed;
    };
    let label = code.label();
    match code {
        ObservationCode::VipStatus => {
            if let Some(vip) = update.vip {
                observation.value_boolean = Some(vip);
                observation.text = Some(Narrative::generated(xhtml_div(&format!(
                    "VIP Status: {}",
                    if vip { "Yes" } else { "No" }
                ))));
                changed |= mark(updated, "vip");
            }
        }
        ObservationCode::BloodGroup => {
            if let Some(value) = &update.blood_group {
                set_string(observation, label, value);
                changed |= mark(updated, "blood_group");
            }
        }
        ObservationCode::CurrentStatus => {
            if let Some(value) = &update.current_status {
                set_string(observation, label, value);
                changed |= mark(updated, "current_status");
            }
        }
        ObservationCode::SurgeryDate(side) => {
            if let Some(value) = update.surgery_date(side) {
                set_string(observation, label, value);
                changed |= mark(updated, &format!("surgery_date_{side}"));
            }
        }
        ObservationCode::Height => {
            if let Some(value) = update.height_cm {
                set_quantity(observation, label, value, "cm");
                changed |= mark(updated, "height");
            }
        }
        ObservationCode::Weight => {
            if let Some(value) = update.weight_kg {
                set_quantity(observation, label, value, "kg");
                changed |= mark(updated, "weight");
            }
        }
        ObservationCode::ActivationStatus | ObservationCode::Prom(_) => {}
    }
    changed
}

fn set_string(observation: &mut Observation, label: &str, value: &str) {
    observation.value_string = Some(value.to_owned());
    observation.text = Some(Narrative::generated(xhtml_div(&format!("{label}: {value}"))));
}

fn set_quantity(observation: &mut Observation, label: &str, value: f64, default_unit: &str) {
    let unit = observation
        .value_quantity
        .as_ref()
        .and_then(|q| q.unit.clone())
        .unwrap_or_else(|| default_unit.to_owned());
    let number = serde_json::Number::from_f64(value);
    let rendered = number
        .as_ref()
        .map(|n| format!("{n} {unit}"))
        .unwrap_or_default();
    observation.value_quantity = Some(Quantity {
        value: number,
        unit: Some(unit),
    });
    observation.text = Some(Narrative::generated(xhtml_div(&format!(
        "{label}: {rendered}"
    ))));
}

fn amend_coverage(
    coverage: &mut Coverage,
    update: &PatientUpdate,
    updated: &mut BTreeSet<String>,
) -> bool {
    let Some(funding) = &update.funding_source else {
        return false;
    };
    coverage.coverage_type = Some(fhir::CodeableConcept::from_text(funding.clone()));
    coverage.text = Some(Narrative::generated(xhtml_div(&format!(
        "Funding Source: {funding}"
    ))));
    mark(updated, "funding_source")
}

fn amend_document(
    document: &mut DocumentReference,
    update: &PatientUpdate,
    updated: &mut BTreeSet<String>,
) -> bool {
    let Some(doc_type) = document
        .document_type
        .as_ref()
        .and_then(|t| t.text.as_deref())
        .map(str::to_lowercase)
    else {
        return false;
    };
    let Some(number) = update
        .id_proofs
        .iter()
        .find(|(kind, _)| kind.to_lowercase() == doc_type)
        .map(|(_, number)| number)
    else {
        return false;
    };

    for content in &mut document.content {
        if let Some(attachment) = content.attachment.as_mut() {
            attachment.title = Some(number.clone());
            attachment.url = Some(format!("urn:idproof:{doc_type}:{number}"));
        }
    }
    document.text = Some(Narrative::generated(xhtml_div(&format!(
        "{}: {number}",
        doc_type.to_uppercase()
    ))));
    mark(updated, &doc_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PATIENT_VIEW_ORDER;
    use crate::config::CoreConfig;
    use crate::parser::parse;
    use crate::patient::PatientService;
    use crate::repositories::questionnaires::QuestionnaireService;
    use crate::store::{DocumentStore, MemoryStore};
    use fhir::{
        PatientBaseData, PatientContactData, PatientMedicalData, Phase,
        QuestionnaireAssignmentData,
    };
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn uhid(s: &str) -> Uhid {
        Uhid::parse(s).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn registered(store: Arc<MemoryStore>, patient: &str) -> RegistrationService {
        let service = RegistrationService::new(store);
        service
            .register_full(
                &PatientBaseData {
                    uhid: uhid(patient),
                    first_name: "Asha".into(),
                    last_name: "Rao".into(),
                    vip: false,
                    birth_date: "15-08-1960".into(),
                    gender: Gender::Female,
                },
                &PatientContactData {
                    uhid: uhid(patient),
                    email: "asha@example.org".into(),
                    phone: "9000000000".into(),
                    alternate_phone: String::new(),
                    address: "Chennai".into(),
                    left_doctor: uhid("DOC1"),
                    right_doctor: uhid("DOC2"),
                    admin_staff: uhid("ADM1"),
                    profile_picture_url: None,
                },
                &PatientMedicalData {
                    uhid: uhid(patient),
                    blood_group: "B+".into(),
                    height_cm: 160.0,
                    weight_kg: 70.0,
                    activation_status: true,
                    activation_comments: Vec::new(),
                    follow_up_comments: Vec::new(),
                    operation_funding: "Insurance".into(),
                    id_proofs: BTreeMap::from([("aadhar".to_string(), "1234".to_string())]),
                    current_status: "LEFT".into(),
                    surgery_date_left: Some("2023-06-01".into()),
                    surgery_date_right: None,
                },
            )
            .unwrap();
        service
    }

    fn view(store: Arc<MemoryStore>, patient: &str) -> serde_json::Value {
        let cfg = CoreConfig::new(PathBuf::from("unused"), PATIENT_VIEW_ORDER.to_vec()).unwrap();
        let view = PatientService::new(Arc::new(cfg), store)
            .patient_view(patient, today())
            .unwrap();
        serde_json::to_value(&view).unwrap()
    }

    #[test]
    fn update_rewrites_demographics_and_clinical_values() {
        let store = Arc::new(MemoryStore::new());
        let service = registered(store.clone(), "MH001");

        let update = PatientUpdate {
            first_name: Some("Asha K".into()),
            birth_date: NaiveDate::from_ymd_opt(1961, 2, 3),
            gender: Some(Gender::Other),
            vip: Some(true),
            blood_group: Some("O-".into()),
            weight_kg: Some(68.5),
            surgery_date_left: Some("2023-07-01".into()),
            funding_source: Some("Self Pay".into()),
            id_proofs: BTreeMap::from([("AADHAR".to_string(), "9999".to_string())]),
            ..Default::default()
        };
        let fields = service.update_patient(&uhid("MH001"), &update).unwrap();
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![
                "aadhar",
                "birth_date",
                "blood_group",
                "first_name",
                "funding_source",
                "gender",
                "surgery_date_left",
                "vip",
                "weight",
            ]
        );

        let value = view(store, "MH001");
        assert_eq!(value["Patient"]["name"], json!("Asha K Rao"));
        assert_eq!(value["Patient"]["birthDate"], json!("1961-02-03"));
        assert_eq!(value["Patient"]["gender"], json!("other"));
        assert_eq!(value["VIP_Status"], json!(true));
        assert_eq!(value["Medical"]["blood_group"], json!("O-"));
        assert_eq!(value["Medical"]["weight"], json!("68.5 kg"));
        assert_eq!(value["Medical"]["surgery_date_left"], json!("2023-07-01"));
        assert_eq!(value["Medical"]["funding_source"], json!("Self Pay"));
        assert_eq!(value["Medical"]["id_proofs"]["aadhar"]["number"], json!("9999"));
    }

    #[test]
    fn uhid_rename_moves_every_bundle() {
        let store = Arc::new(MemoryStore::new());
        let service = registered(store.clone(), "MH001");
        let assignment = QuestionnaireAssignmentData {
            name: "Oxford Knee Score (OKS)".into(),
            phase: Phase::PreOp,
            assigned_date: "2025-01-01".into(),
            deadline: "2025-01-14".into(),
            completed: false,
        };
        QuestionnaireService::new(store.clone())
            .assign(&uhid("MH001"), Side::Left, &assignment)
            .unwrap();

        let update = PatientUpdate {
            uhid: Some(uhid("MH900")),
            ..Default::default()
        };
        service.update_patient(&uhid("MH001"), &update).unwrap();

        for collection in PATIENT_VIEW_ORDER {
            let old = find_one(store.as_ref(), collection, BundleQuery::PatientId("MH001"))
                .unwrap();
            assert!(old.is_none(), "{collection} still holds MH001");
        }
        let value = view(store.clone(), "MH900");
        assert_eq!(value["uhid"], json!("MH900"));
        assert!(value["Medical_Left"]["OKS"].get("Pre_Op").is_some());
        assert_eq!(value["Medical"]["blood_group"], json!("B+"));
        assert_eq!(store.scan(Collection::MedicalLeft).unwrap().len(), 1);
    }

    #[test]
    fn uhid_rename_to_a_taken_uhid_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        registered(store.clone(), "MH002");
        let service = registered(store, "MH001");

        let update = PatientUpdate {
            uhid: Some(uhid("MH002")),
            ..Default::default()
        };
        assert!(matches!(
            service.update_patient(&uhid("MH001"), &update),
            Err(PatientError::AlreadyExists(_))
        ));
    }

    #[test]
    fn empty_or_inapplicable_updates_are_invalid() {
        let store = Arc::new(MemoryStore::new());
        let service = RegistrationService::new(store.clone());
        assert!(matches!(
            service.update_patient(&uhid("MH001"), &PatientUpdate::default()),
            Err(PatientError::InvalidInput(_))
        ));

        let blood = PatientUpdate {
            blood_group: Some("A+".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_patient(&uhid("MH001"), &blood),
            Err(PatientError::NotFound(_))
        ));

        let service = registered(store, "MH001");
        let passport = PatientUpdate {
            id_proofs: BTreeMap::from([("passport".to_string(), "P1".to_string())]),
            ..Default::default()
        };
        assert!(matches!(
            service.update_patient(&uhid("MH001"), &passport),
            Err(PatientError::InvalidInput(_))
        ));
    }

    #[test]
    fn prefix_uhid_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        registered(store.clone(), "MH10");
        let service = registered(store.clone(), "MH1");

        let update = PatientUpdate {
            blood_group: Some("AB+".into()),
            ..Default::default()
        };
        service.update_patient(&uhid("MH1"), &update).unwrap();

        let blood_group = |patient: &str| {
            let stored = find_one(
                store.as_ref(),
                Collection::PatientMedical,
                BundleQuery::PatientId(patient),
            )
            .unwrap()
            .unwrap();
            parse(&stored.bundle, None).medical.blood_group
        };
        assert_eq!(blood_group("MH1").as_deref(), Some("AB+"));
        assert_eq!(blood_group("MH10").as_deref(), Some("B+"));
    }

    #[test]
    fn narrative_rename_keeps_case_convention() {
        let div = "<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>Patient ID: mh001</p></div>";
        assert_eq!(
            rename_in_narrative(div, "MH001", "MH900").as_deref(),
            Some("<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>Patient ID: mh900</p></div>")
        );
        assert_eq!(
            rename_in_narrative("<div>Patient UHID: MH001</div>", "MH001", "MH900").as_deref(),
            Some("<div>Patient UHID: MH900</div>")
        );
        assert_eq!(rename_in_narrative("<div>Patient: Asha</div>", "MH001", "MH900"), None);
    }
}
