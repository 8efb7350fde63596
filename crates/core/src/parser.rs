//! Bundle → [`ParsedRecord`].
//!
//! Parsing is total: a missing or mistyped field leaves the corresponding value empty and an
//! unrecognised entry is skipped. Every text-based classification goes through
//! [`fhir::labels`].

use crate::record::{
    ActivationRecord, AppointmentSlot, FollowUpRecord, IdProof, ParsedRecord, PromEntry,
};
use fhir::labels::{extract_comment, patient_id_from_narrative};
use fhir::{
    Appointment, Bundle, Coverage, DocumentReference, FhirResource, Gender, Instrument,
    Observation, ObservationCode, Patient, Phase, Practitioner, PractitionerRole, Provenance,
    ProvenanceActivity, Quantity, Resource, Side,
};

/// Parse one bundle.
///
/// `side` selects which questionnaire map PROM observations populate. Without a side they go
/// to the left map.
pub fn parse(bundle: &Bundle, side: Option<Side>) -> ParsedRecord {
    let side = side.unwrap_or(Side::Left);
    let mut record = ParsedRecord::default();

    for resource in bundle.resources() {
        match resource {
            Resource::Patient(patient) => parse_patient(&mut record, &patient),
            Resource::Practitioner(practitioner) => {
                parse_practitioner(&mut record, &practitioner)
            }
            Resource::Appointment(appointment) => parse_appointment(&mut record, appointment),
            Resource::Observation(observation) => {
                parse_observation(&mut record, &observation, side)
            }
            Resource::Provenance(provenance) => parse_provenance(&mut record, &provenance),
            Resource::Coverage(coverage) => parse_coverage(&mut record, &coverage),
            Resource::DocumentReference(document) => parse_document(&mut record, &document),
            Resource::Organization(_) | Resource::Other(_) => {}
        }
    }

    if record.unmatched_observations > 0 {
        tracing::debug!(
            unmatched = record.unmatched_observations,
            bundle_id = bundle.id.as_deref().unwrap_or(""),
            "observations dropped during parse"
        );
    }

    record
}

fn parse_patient(record: &mut ParsedRecord, patient: &Patient) {
    let section = &mut record.patient;

    section.uhid = non_empty(patient.uhid_identifier())
        .or_else(|| {
            patient
                .narrative_div()
                .and_then(patient_id_from_narrative)
        })
        .or_else(|| non_empty(patient.id.as_deref()));

    section.name = patient.name.first().and_then(|name| {
        let parts: Vec<&str> = name
            .given
            .iter()
            .map(String::as_str)
            .chain(name.family.as_deref())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    });
    section.gender = patient.gender.as_deref().and_then(Gender::from_wire);
    section.birth_date = non_empty(patient.birth_date.as_deref());
    section.phone = non_empty(patient.last_telecom("phone"));
    section.email = non_empty(patient.last_telecom("email"));
    if let Some(url) = patient.photo.last().map(|p| p.url.as_deref()) {
        section.photo = non_empty(url);
    }
}

fn parse_practitioner(record: &mut ParsedRecord, practitioner: &Practitioner) {
    let Some(role) = practitioner
        .narrative_div()
        .and_then(PractitionerRole::from_narrative)
    else {
        return;
    };
    let Some(value) = practitioner.identifier.last() else {
        return;
    };

    let id = value.value.clone();
    let practitioners = &mut record.practitioners;
    match role {
        PractitionerRole::LeftDoctor => practitioners.left_doctor = id,
        PractitionerRole::RightDoctor => practitioners.right_doctor = id,
        PractitionerRole::AdminStaff => practitioners.admin_staff = id,
    }
}

fn parse_appointment(record: &mut ParsedRecord, appointment: Appointment) {
    record.appointments.push(AppointmentSlot {
        start: appointment.start,
        end: appointment.end,
    });
}

fn parse_observation(record: &mut ParsedRecord, observation: &Observation, side: Side) {
    let Some(code) = observation.code_text().and_then(ObservationCode::classify) else {
        record.unmatched_observations += 1;
        return;
    };

    let medical = &mut record.medical;
    match code {
        ObservationCode::VipStatus => record.vip_status = observation.value_boolean,
        ObservationCode::BloodGroup => medical.blood_group = observation.value_string.clone(),
        ObservationCode::Height => medical.height = measurement(observation),
        ObservationCode::Weight => medical.weight = measurement(observation),
        ObservationCode::ActivationStatus => {}
        ObservationCode::CurrentStatus => {
            medical.patient_current_status = observation.value_string.clone()
        }
        ObservationCode::SurgeryDate(Side::Left) => {
            medical.surgery_date_left = observation.value_string.clone()
        }
        ObservationCode::SurgeryDate(Side::Right) => {
            medical.surgery_date_right = observation.value_string.clone()
        }
        ObservationCode::Prom(instrument) => {
            if !record_prom(record, observation, instrument, side) {
                record.unmatched_observations += 1;
            }
        }
    }
}

/// Returns `false` when the observation names no phase.
fn record_prom(
    record: &mut ParsedRecord,
    observation: &Observation,
    instrument: Instrument,
    side: Side,
) -> bool {
    let Some(score) = observation.value_string.as_deref().filter(|v| !v.is_empty()) else {
        return false;
    };
    let Some(phase) = Phase::from_value_text(score) else {
        return false;
    };

    let entry = PromEntry {
        score: score.to_owned(),
        completed: observation.completion_status(),
        other_notes: observation.note_texts(),
        deadline: observation
            .effective_period
            .as_ref()
            .and_then(|p| p.end.clone())
            .unwrap_or_default(),
    };
    record
        .side_mut(side)
        .instrument_mut(instrument)
        .insert(phase, entry);
    true
}

/// `"<value> <unit>"` when both are present and the value is non-zero.
fn measurement(observation: &Observation) -> Option<String> {
    let Quantity { value, unit } = observation.value_quantity.as_ref()?;
    let value = value.as_ref().filter(|n| n.as_f64() != Some(0.0))?;
    let unit = unit.as_deref().filter(|u| !u.is_empty())?;
    Some(format!("{value} {unit}"))
}

fn parse_provenance(record: &mut ParsedRecord, provenance: &Provenance) {
    let Some(activity) = provenance
        .activity_text()
        .and_then(ProvenanceActivity::from_label)
    else {
        return;
    };

    let comment = extract_comment(provenance.narrative_div().unwrap_or_default(), activity);
    let recorded = provenance.recorded.clone();
    match activity {
        ProvenanceActivity::ActivationComment => {
            record.medical.activation_records.push(ActivationRecord {
                activation_status: comment.mentions_activation,
                activation_comment: comment.text,
                recorded,
            })
        }
        ProvenanceActivity::FollowUpComment => {
            record.medical.follow_up_records.push(FollowUpRecord {
                follow_up_comment: comment.text,
                recorded,
            })
        }
    }
}

fn parse_coverage(record: &mut ParsedRecord, coverage: &Coverage) {
    record.medical.funding_source = coverage
        .coverage_type
        .as_ref()
        .and_then(|t| t.text.clone());
}

fn parse_document(record: &mut ParsedRecord, document: &DocumentReference) {
    let Some(doc_type) = document
        .document_type
        .as_ref()
        .and_then(|t| t.text.as_deref())
        .filter(|t| !t.is_empty())
    else {
        return;
    };

    let number = document
        .content
        .first()
        .and_then(|c| c.attachment.as_ref())
        .and_then(|a| a.title.clone());
    record
        .medical
        .id_proofs
        .insert(doc_type.to_lowercase(), IdProof { number });
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(entries: serde_json::Value) -> Bundle {
        Bundle::from_value(json!({ "resourceType": "Bundle", "entry": entries })).unwrap()
    }

    fn prom(code: &str, value: &str, completed: Option<bool>) -> serde_json::Value {
        let mut component = Vec::new();
        if let Some(done) = completed {
            component.push(json!({ "code": { "text": "Completion Status" }, "valueBoolean": done }));
        }
        json!({ "resource": {
            "resourceType": "Observation",
            "code": { "text": code },
            "valueString": value,
            "component": component,
            "effectivePeriod": { "start": "2025-01-01", "end": "2025-01-14" }
        }})
    }

    #[test]
    fn questionnaire_lands_at_instrument_and_phase() {
        let parsed = parse(
            &bundle(json!([prom("Oxford Knee Score (OKS)", "Scores (6W)", Some(true))])),
            Some(Side::Right),
        );
        let entry = &parsed.medical_right.oks[&Phase::SixWeeks];
        assert_eq!(entry.score, "Scores (6W)");
        assert_eq!(entry.completed, Some(true));
        assert_eq!(entry.deadline, "2025-01-14");
        assert!(parsed.medical_left.is_empty());
        assert_eq!(parsed.unmatched_observations, 0);
    }

    #[test]
    fn questionnaire_without_completion_component_is_null() {
        let parsed = parse(
            &bundle(json!([prom("Knee Society Score (KSS)", "Scores (Pre Op)", None)])),
            None,
        );
        assert_eq!(parsed.medical_left.kss[&Phase::PreOp].completed, None);
    }

    #[test]
    fn ambiguous_phase_resolves_by_priority() {
        let parsed = parse(
            &bundle(json!([prom(
                "Forgotten Joint Score (FJS)",
                "Scores (2Y) vs 3M baseline",
                Some(false)
            )])),
            Some(Side::Left),
        );
        assert!(parsed.medical_left.fjs.contains_key(&Phase::ThreeMonths));
        assert!(!parsed.medical_left.fjs.contains_key(&Phase::TwoYears));
    }

    #[test]
    fn unresolved_questionnaires_and_unknown_codes_are_counted() {
        let parsed = parse(
            &bundle(json!([
                prom("Oxford Knee Score (OKS)", "Scores (9W)", Some(true)),
                prom("Oxford Knee Score", "Scores (6W)", Some(true)),
                prom("Pain Score", "7", None)
            ])),
            None,
        );
        assert!(parsed.medical_left.is_empty());
        assert_eq!(parsed.unmatched_observations, 3);
    }

    #[test]
    fn patient_uhid_falls_back_to_narrative_then_id() {
        let from_identifier = parse(
            &bundle(json!([{ "resource": {
                "resourceType": "Patient",
                "id": "res-1",
                "identifier": [
                    { "system": "http://hospital.smarthealth.org/uhid", "value": "MH001" },
                    { "system": "http://hospital.smarthealth.org/uhid", "value": "MH002" }
                ]
            }}])),
            None,
        );
        assert_eq!(from_identifier.patient.uhid.as_deref(), Some("MH002"));

        let from_narrative = parse(
            &bundle(json!([{ "resource": {
                "resourceType": "Patient",
                "id": "res-1",
                "text": { "div": "<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>Patient ID: mh001</p></div>" }
            }}])),
            None,
        );
        assert_eq!(from_narrative.patient.uhid.as_deref(), Some("mh001"));

        let from_id = parse(
            &bundle(json!([{ "resource": { "resourceType": "Patient", "id": "MH003" } }])),
            None,
        );
        assert_eq!(from_id.patient.uhid.as_deref(), Some("MH003"));
    }

    #[test]
    fn patient_demographics_and_contacts() {
        let parsed = parse(
            &bundle(json!([{ "resource": {
                "resourceType": "Patient",
                "name": [{ "given": ["Asha", "K"], "family": "Rao" }, { "given": ["Other"] }],
                "gender": "female",
                "birthDate": "1961-03-05",
                "telecom": [
                    { "system": "phone", "value": "111" },
                    { "system": "email", "value": "a@example.org" },
                    { "system": "phone", "value": "222" }
                ],
                "photo": [{ "url": "http://img/1" }]
            }}])),
            None,
        );
        let p = &parsed.patient;
        assert_eq!(p.name.as_deref(), Some("Asha K Rao"));
        assert_eq!(p.phone.as_deref(), Some("222"));
        assert_eq!(p.email.as_deref(), Some("a@example.org"));
        assert_eq!(p.photo.as_deref(), Some("http://img/1"));
        assert_eq!(p.birth_date.as_deref(), Some("1961-03-05"));
        assert_eq!(p.gender, Some(Gender::Female));
    }

    #[test]
    fn unrecognised_gender_is_dropped() {
        let patient = |gender: &str| {
            parse(
                &bundle(json!([{ "resource": {
                    "resourceType": "Patient", "id": "MH001", "gender": gender
                }}])),
                None,
            )
        };
        assert_eq!(patient("F").patient.gender, None);
        assert_eq!(patient("").patient.gender, None);
        assert_eq!(patient(" Male ").patient.gender, Some(Gender::Male));

        let value = serde_json::to_value(&patient("other").patient).unwrap();
        assert_eq!(value["gender"], json!("other"));
    }

    #[test]
    fn practitioner_role_requires_narrative() {
        let parsed = parse(
            &bundle(json!([
                { "resource": {
                    "resourceType": "Practitioner",
                    "identifier": [{ "value": "DOC-OLD" }, { "value": "DOC-L" }],
                    "text": { "div": "<div>Left Doctor</div>" }
                }},
                { "resource": {
                    "resourceType": "Practitioner",
                    "identifier": [{ "value": "NURSE" }],
                    "text": { "div": "<div>Nurse</div>" }
                }},
                { "resource": {
                    "resourceType": "Practitioner",
                    "identifier": [{ "value": "ADM1" }],
                    "text": { "div": "<div>Admin Staff</div>" }
                }}
            ])),
            None,
        );
        assert_eq!(parsed.practitioners.left_doctor.as_deref(), Some("DOC-L"));
        assert_eq!(parsed.practitioners.right_doctor, None);
        assert_eq!(parsed.practitioners.admin_staff.as_deref(), Some("ADM1"));
    }

    #[test]
    fn medical_observations_and_measurements() {
        let parsed = parse(
            &bundle(json!([
                { "resource": { "resourceType": "Observation", "code": { "text": "Blood Group" }, "valueString": "B+" } },
                { "resource": { "resourceType": "Observation", "code": { "text": "Height" }, "valueQuantity": { "value": 162.5, "unit": "cm" } } },
                { "resource": { "resourceType": "Observation", "code": { "text": "Weight" }, "valueQuantity": { "value": 0, "unit": "kg" } } },
                { "resource": { "resourceType": "Observation", "code": { "text": "VIP Status" }, "valueBoolean": true } },
                { "resource": { "resourceType": "Observation", "code": { "text": "Activation Status" }, "valueBoolean": true } },
                { "resource": { "resourceType": "Observation", "code": { "text": "Surgery Date Right" }, "valueString": "2025-01-15" } }
            ])),
            None,
        );
        assert_eq!(parsed.medical.blood_group.as_deref(), Some("B+"));
        assert_eq!(parsed.medical.height.as_deref(), Some("162.5 cm"));
        assert_eq!(parsed.medical.weight, None);
        assert_eq!(parsed.vip_status, Some(true));
        assert_eq!(parsed.medical.surgery_date_right.as_deref(), Some("2025-01-15"));
        assert_eq!(parsed.unmatched_observations, 0);
    }

    #[test]
    fn provenance_comments_are_extracted() {
        let parsed = parse(
            &bundle(json!([
                { "resource": {
                    "resourceType": "Provenance",
                    "recorded": "2025-02-01T00:00:00Z",
                    "activity": { "text": "Activation Comment" },
                    "text": { "div": "<div xmlns='http://www.w3.org/1999/xhtml'>Comment: Activation - ready</div>" }
                }},
                { "resource": {
                    "resourceType": "Provenance",
                    "recorded": "2025-02-02T00:00:00Z",
                    "activity": { "text": "Patient Follow-up Comment" },
                    "text": { "div": "<div xmlns='http://www.w3.org/1999/xhtml'>Follow-up Comment: call</div>" }
                }},
                { "resource": {
                    "resourceType": "Provenance",
                    "activity": { "text": "Signature" }
                }}
            ])),
            None,
        );
        assert_eq!(
            parsed.medical.activation_records,
            vec![ActivationRecord {
                activation_status: true,
                activation_comment: "ready".into(),
                recorded: Some("2025-02-01T00:00:00Z".into()),
            }]
        );
        assert_eq!(parsed.medical.follow_up_records[0].follow_up_comment, "call");
    }

    #[test]
    fn coverage_and_identity_documents() {
        let parsed = parse(
            &bundle(json!([
                { "resource": { "resourceType": "Coverage", "type": { "text": "Self Pay" } } },
                { "resource": {
                    "resourceType": "DocumentReference",
                    "type": { "text": "AADHAR" },
                    "content": [{ "attachment": { "title": "1234" } }]
                }},
                { "resource": { "resourceType": "DocumentReference", "content": [] } }
            ])),
            None,
        );
        assert_eq!(parsed.medical.funding_source.as_deref(), Some("Self Pay"));
        assert_eq!(parsed.medical.id_proofs.len(), 1);
        assert_eq!(parsed.medical.id_proofs["aadhar"].number.as_deref(), Some("1234"));
    }

    #[test]
    fn malformed_entries_never_fail_the_parse() {
        let parsed = parse(
            &bundle(json!([
                "not an entry",
                { "resource": "not a resource" },
                { "resource": { "resourceType": "Patient", "name": "Asha", "telecom": {} } },
                { "resource": { "resourceType": "Observation", "code": "Height" } }
            ])),
            None,
        );
        assert_eq!(parsed.patient.name, None);
        assert_eq!(parsed.unmatched_observations, 1);
    }
}
