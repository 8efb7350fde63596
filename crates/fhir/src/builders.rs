//! Producers for the bundles written by registration, questionnaire and surgery-detail
//! workflows.
//!
//! Builders take flat domain-level carriers and return wire [`Bundle`]s / [`Entry`]s whose
//! labels round-trip through [`crate::labels`], so everything produced here is recognised by the
//! record parser.
//!
//! Time is always passed in by the caller; nothing here reads the clock.

use crate::labels::{
    xhtml_div, xhtml_paragraph, Gender, ObservationCode, Phase, PractitionerRole,
    ProvenanceActivity, COMPLETION_STATUS_LABEL, UHID_SYSTEM,
};
use crate::resources::{
    Appointment, Coverage, DocumentReference, Observation, Organization, Patient, Practitioner,
    Provenance,
};
use crate::wire::{
    Address, Annotation, Attachment, CodeableConcept, Coding, ContactPoint, DocumentContent,
    HumanName, Identifier, Meta, Narrative, ObservationComponent, Participant, Period,
    ProvenanceAgent, Quantity, Reference,
};
use crate::{Bundle, Entry, FhirResult};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use prom_types::Uhid;
use prom_uuid::ResourceId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MR_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v2-0203";
const OBSERVATION_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";
const DATA_ABSENT_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/data-absent-reason";
const PATIENT_PROFILE: &str = "http://hl7.org/fhir/StructureDefinition/Patient";
const OPD_APPOINTMENT_MINUTES: i64 = 30;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Core demographics captured at registration.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientBaseData {
    pub uhid: Uhid,
    pub first_name: String,
    pub last_name: String,
    pub vip: bool,
    /// Birth date as supplied: `DD-MM-YYYY` is normalised, anything else is stored verbatim.
    pub birth_date: String,
    pub gender: Gender,
}

/// Contact details and care-team assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientContactData {
    pub uhid: Uhid,
    pub email: String,
    pub phone: String,
    pub alternate_phone: String,
    pub address: String,
    pub left_doctor: Uhid,
    pub right_doctor: Uhid,
    pub admin_staff: Uhid,
    pub profile_picture_url: Option<String>,
}

/// A timestamped free-text comment.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentData {
    /// ISO 8601 date or date-time. Date-only values are stored at midnight UTC.
    pub timestamp: String,
    pub comment: String,
}

/// Clinical details captured at registration.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientMedicalData {
    pub uhid: Uhid,
    pub blood_group: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub activation_status: bool,
    pub activation_comments: Vec<CommentData>,
    pub follow_up_comments: Vec<CommentData>,
    pub operation_funding: String,
    /// Document type (for example `aadhar`) to document number.
    pub id_proofs: BTreeMap<String, String>,
    pub current_status: String,
    pub surgery_date_left: Option<String>,
    pub surgery_date_right: Option<String>,
}

/// One questionnaire assigned to a patient for a phase.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionnaireAssignmentData {
    /// Code label, one of [`crate::labels::PROM_CODE_LABELS`].
    pub name: String,
    pub phase: Phase,
    pub assigned_date: String,
    pub deadline: String,
    pub completed: bool,
}

/// Scores recorded against an assigned questionnaire.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionnaireScoreData {
    pub name: String,
    pub phase: Phase,
    pub scores: Vec<i64>,
    pub timestamp: String,
    pub others: Vec<String>,
}

// ============================================================================
// Registration bundles
// ============================================================================

/// Registration bundle producers.
///
/// This is a zero-sized type used for namespacing. All methods are associated functions.
pub struct Registration;

impl Registration {
    /// Patient resource with UHID, name, gender and birth date, plus a VIP status observation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if a resource cannot be serialised.
    pub fn base_bundle(data: &PatientBaseData, now: DateTime<Utc>) -> FhirResult<Bundle> {
        let patient_id = ResourceId::new();
        let vip_id = ResourceId::new();

        let patient = Patient {
            id: Some(patient_id.to_string()),
            identifier: vec![uhid_identifier(&data.uhid, Some("UHID"))],
            name: vec![HumanName {
                use_type: Some("official".into()),
                family: Some(data.last_name.clone()),
                given: vec![data.first_name.clone()],
            }],
            gender: Some(data.gender.to_wire().into()),
            birth_date: Some(normalise_birth_date(&data.birth_date)),
            meta: Some(Meta {
                profile: vec![PATIENT_PROFILE.into()],
            }),
            text: Some(Narrative::generated(xhtml_div(&format!(
                "Patient: {} {}",
                data.first_name, data.last_name
            )))),
            ..Default::default()
        };

        let vip = Observation {
            id: Some(vip_id.to_string()),
            status: Some("final".into()),
            category: vec![CodeableConcept {
                coding: vec![Coding {
                    system: Some(OBSERVATION_CATEGORY_SYSTEM.into()),
                    code: Some("social-history".into()),
                    display: Some("Social History".into()),
                }],
                text: None,
            }],
            code: Some(CodeableConcept::from_text(ObservationCode::VipStatus.label())),
            subject: Some(Reference::to(patient_id.urn())),
            effective_date_time: Some(timestamp(now)),
            performer: vec![Reference::display("Hospital Staff")],
            value_boolean: Some(data.vip),
            text: Some(Narrative::generated(xhtml_div(&format!(
                "VIP Status: {}",
                if data.vip { "Yes" } else { "No" }
            )))),
            ..Default::default()
        };

        let mut bundle = Bundle::collection();
        bundle.push(Some(patient_id.urn()), &patient)?;
        bundle.push(Some(vip_id.urn()), &vip)?;
        Ok(bundle)
    }

    /// Patient contact details, one practitioner per care-team role and a booked OPD
    /// appointment starting at `booked_at`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if a resource cannot be serialised.
    pub fn contact_bundle(data: &PatientContactData, booked_at: DateTime<Utc>) -> FhirResult<Bundle> {
        let patient_id = ResourceId::new();

        let mut telecom = vec![
            contact_point("phone", &data.phone, "mobile"),
            contact_point("phone", &data.alternate_phone, "home"),
            contact_point("email", &data.email, "home"),
        ];
        telecom.retain(|t| t.value.as_deref().is_some_and(|v| !v.is_empty()));

        let patient = Patient {
            id: Some(patient_id.to_string()),
            identifier: vec![uhid_identifier(&data.uhid, None)],
            telecom,
            address: vec![Address {
                text: Some(data.address.clone()),
            }],
            photo: data
                .profile_picture_url
                .iter()
                .filter(|url| !url.is_empty())
                .map(|url| Attachment {
                    title: None,
                    url: Some(url.clone()),
                })
                .collect(),
            text: Some(Narrative::generated(xhtml_div("Patient resource"))),
            ..Default::default()
        };

        let mut bundle = Bundle::collection();
        bundle.push(Some(patient_id.urn()), &patient)?;

        let mut participants = vec![accepted(patient_id.urn())];
        for (role, uhid) in [
            (PractitionerRole::LeftDoctor, &data.left_doctor),
            (PractitionerRole::RightDoctor, &data.right_doctor),
            (PractitionerRole::AdminStaff, &data.admin_staff),
        ] {
            let practitioner_id = ResourceId::new();
            let practitioner = Practitioner {
                id: Some(practitioner_id.to_string()),
                identifier: vec![Identifier {
                    system: Some(UHID_SYSTEM.into()),
                    value: Some(uhid.to_string()),
                    ..Default::default()
                }],
                text: Some(Narrative::generated(xhtml_div(role.narrative_label()))),
            };
            bundle.push(Some(practitioner_id.urn()), &practitioner)?;
            participants.push(accepted(practitioner_id.urn()));
        }

        let appointment_id = ResourceId::new();
        let appointment = Appointment {
            id: Some(appointment_id.to_string()),
            status: Some("booked".into()),
            start: Some(timestamp(booked_at)),
            end: Some(timestamp(
                booked_at + Duration::minutes(OPD_APPOINTMENT_MINUTES),
            )),
            participant: participants,
            text: Some(Narrative::generated(xhtml_div("OPD Appointment"))),
        };
        bundle.push(Some(appointment_id.urn()), &appointment)?;

        Ok(bundle)
    }

    /// Clinical observations, comment history, funding and identity documents.
    ///
    /// The patient resource's `id` is the UHID itself, which is how follow-up comments find
    /// this bundle later.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if a resource cannot be serialised.
    pub fn medical_bundle(data: &PatientMedicalData, now: DateTime<Utc>) -> FhirResult<Bundle> {
        let subject = ResourceId::new().urn();
        let now_text = timestamp(now);
        let uhid = data.uhid.as_str();

        let mut bundle = Bundle::collection();
        bundle.id = Some(ResourceId::new().to_string());
        bundle.timestamp = Some(now_text.clone());

        let patient = Patient {
            id: Some(uhid.to_owned()),
            text: Some(Narrative::generated(xhtml_div(&format!(
                "Patient UHID: {uhid}"
            )))),
            ..Default::default()
        };
        bundle.push(Some(subject.clone()), &patient)?;

        let clinical = ClinicalObservation {
            subject: &subject,
            effective: &now_text,
        };
        push_observation(
            &mut bundle,
            clinical.string(ObservationCode::BloodGroup, &data.blood_group),
        )?;
        push_observation(
            &mut bundle,
            clinical.quantity(ObservationCode::Height, data.height_cm, "cm"),
        )?;
        push_observation(
            &mut bundle,
            clinical.quantity(ObservationCode::Weight, data.weight_kg, "kg"),
        )?;
        push_observation(
            &mut bundle,
            clinical.boolean(ObservationCode::ActivationStatus, data.activation_status),
        )?;

        for comment in &data.activation_comments {
            let provenance = comment_provenance(
                ProvenanceActivity::ActivationComment,
                &comment.comment,
                normalise_comment_time(&comment.timestamp),
                &subject,
                &subject,
            );
            bundle.push(Some(ResourceId::new().urn()), &provenance)?;
        }
        for comment in &data.follow_up_comments {
            let provenance = comment_provenance(
                ProvenanceActivity::FollowUpComment,
                &comment.comment,
                normalise_comment_time(&comment.timestamp),
                &subject,
                &subject,
            );
            bundle.push(Some(ResourceId::new().urn()), &provenance)?;
        }

        push_observation(
            &mut bundle,
            clinical.string(ObservationCode::CurrentStatus, &data.current_status),
        )?;
        for (side, date) in [
            (crate::Side::Left, &data.surgery_date_left),
            (crate::Side::Right, &data.surgery_date_right),
        ] {
            if let Some(date) = date.as_deref().filter(|d| !d.is_empty()) {
                push_observation(
                    &mut bundle,
                    clinical.string(ObservationCode::SurgeryDate(side), date),
                )?;
            }
        }

        let org_id = ResourceId::new();
        let organization = Organization {
            id: Some(org_id.to_string()),
            name: Some(data.operation_funding.clone()),
            text: Some(Narrative::generated(xhtml_div(&format!(
                "Organization: {}",
                data.operation_funding
            )))),
        };
        bundle.push(Some(org_id.urn()), &organization)?;

        let coverage = Coverage {
            id: Some(ResourceId::new().to_string()),
            status: Some("active".into()),
            kind: Some("insurance".into()),
            coverage_type: Some(CodeableConcept::from_text(data.operation_funding.clone())),
            beneficiary: Some(Reference::to(subject.clone())),
            subscriber: Some(Reference::to(subject.clone())),
            text: Some(Narrative::generated(xhtml_div(&format!(
                "Funding Source: {}",
                data.operation_funding
            )))),
        };
        bundle.push(Some(ResourceId::new().urn()), &coverage)?;

        for (id_type, number) in &data.id_proofs {
            let document = DocumentReference {
                id: Some(ResourceId::new().to_string()),
                status: Some("current".into()),
                document_type: Some(CodeableConcept::from_text(id_type.to_uppercase())),
                subject: Some(Reference::to(subject.clone())),
                content: vec![DocumentContent {
                    attachment: Some(Attachment {
                        title: Some(number.clone()),
                        url: Some(format!("urn:idproof:{id_type}:{number}")),
                    }),
                }],
                text: Some(Narrative::generated(xhtml_div(&format!(
                    "{}: {number}",
                    id_type.to_uppercase()
                )))),
            };
            bundle.push(Some(ResourceId::new().urn()), &document)?;
        }

        Ok(bundle)
    }

    /// A follow-up comment provenance entry for appending to an existing medical bundle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if the resource cannot be serialised.
    pub fn follow_up_entry(comment: &str, recorded: DateTime<Utc>) -> FhirResult<Entry> {
        let provenance = comment_provenance(
            ProvenanceActivity::FollowUpComment,
            comment,
            timestamp(recorded),
            &ResourceId::new().urn(),
            &ResourceId::new().urn(),
        );
        Entry::new(Some(ResourceId::new().urn()), &provenance)
    }
}

// ============================================================================
// Questionnaire bundles
// ============================================================================

/// Questionnaire bundle producers and in-place updates.
///
/// This is a zero-sized type used for namespacing. All methods are associated functions.
pub struct Questionnaires;

impl Questionnaires {
    /// A new side bundle: a patient stub identified by `Patient ID:` narrative plus one
    /// observation per assignment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if a resource cannot be serialised.
    pub fn new_bundle(uhid: &Uhid, assignments: &[QuestionnaireAssignmentData]) -> FhirResult<Bundle> {
        let patient_id = ResourceId::new();
        let patient = Patient {
            id: Some(patient_id.to_string()),
            text: Some(Narrative::generated(xhtml_paragraph(&format!(
                "Patient ID: {}",
                uhid.as_str().to_lowercase()
            )))),
            ..Default::default()
        };

        let mut bundle = Bundle::collection();
        bundle.push(Some(patient_id.urn()), &patient)?;
        for assignment in assignments {
            bundle
                .entry
                .push(Self::observation_entry(&patient_id.urn(), assignment)?);
        }
        Ok(bundle)
    }

    /// A preliminary questionnaire observation referencing `patient_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if the resource cannot be serialised.
    pub fn observation_entry(
        patient_ref: &str,
        assignment: &QuestionnaireAssignmentData,
    ) -> FhirResult<Entry> {
        let id = ResourceId::new();
        let marker = assignment.phase.marker();
        let observation = Observation {
            id: Some(id.to_string()),
            status: Some("preliminary".into()),
            subject: Some(Reference::to(patient_ref)),
            performer: vec![Reference::display("Automated system")],
            code: Some(CodeableConcept {
                coding: vec![Coding {
                    system: Some(DATA_ABSENT_SYSTEM.into()),
                    code: Some("unknown".into()),
                    display: Some("Unknown".into()),
                }],
                text: Some(assignment.name.clone()),
            }),
            effective_period: Some(Period {
                start: Some(assignment.assigned_date.clone()),
                end: Some(assignment.deadline.clone()),
            }),
            component: vec![completion_component(assignment.completed)],
            value_string: Some(format!("Scores ({marker})")),
            text: Some(Narrative::generated(xhtml_paragraph(&format!(
                "{} Scores ({marker}), Completed: {}",
                assignment.name,
                u8::from(assignment.completed)
            )))),
            ..Default::default()
        };
        Entry::new(Some(id.urn()), &observation)
    }

    /// Whether `observation` is the assignment of questionnaire `name` for `phase`.
    pub fn is_assignment(observation: &Observation, name: &str, phase: Phase) -> bool {
        observation.code_text() == Some(name)
            && observation
                .value_string
                .as_deref()
                .is_some_and(|v| v.contains(&period_token(phase)))
    }

    /// Record scores on an assigned observation: value text, final status, completion flag,
    /// numbered score components, notes and narrative are all rewritten.
    pub fn apply_score(observation: &mut Observation, score: &QuestionnaireScoreData) {
        let marker = score.phase.marker();
        let joined = score
            .scores
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        observation.value_string = Some(format!(
            "Scores ({marker}): {joined} (Recorded at {})",
            score.timestamp
        ));
        observation.status = Some("final".into());

        observation
            .component
            .retain(|c| !c.label().is_some_and(|l| l.starts_with("Score ")));
        match observation
            .component
            .iter_mut()
            .find(|c| c.label() == Some(COMPLETION_STATUS_LABEL))
        {
            Some(component) => component.value_boolean = Some(true),
            None => observation.component.push(completion_component(true)),
        }
        for (index, value) in score.scores.iter().enumerate() {
            observation.component.push(ObservationComponent {
                code: Some(CodeableConcept::from_text(format!("Score {}", index + 1))),
                value_integer: Some(*value),
                ..Default::default()
            });
        }

        if !score.others.is_empty() {
            observation.note = score
                .others
                .iter()
                .map(|text| Annotation {
                    text: Some(text.clone()),
                })
                .collect();
        }

        observation.text = Some(Narrative::generated(xhtml_paragraph(&format!(
            "{} Scores ({marker}), Completed: 1 at {}",
            score.name, score.timestamp
        ))));
    }

    /// Return a scored observation to its assigned state: bare value text, completion flag
    /// cleared, scores and notes dropped and the deadline moved to `deadline`.
    pub fn reset(observation: &mut Observation, phase: Phase, deadline: &str) {
        let marker = phase.marker();
        observation.value_string = Some(format!("Scores ({marker})"));
        observation.status = Some("preliminary".into());

        observation
            .component
            .retain(|c| !c.label().is_some_and(|l| l.starts_with("Score ")));
        for component in &mut observation.component {
            if component.label() == Some(COMPLETION_STATUS_LABEL) {
                component.value_boolean = Some(false);
            }
        }
        if let Some(period) = observation.effective_period.as_mut() {
            period.end = Some(deadline.to_owned());
        }
        observation.note.clear();

        let name = observation.code_text().unwrap_or_default().to_owned();
        observation.text = Some(Narrative::generated(xhtml_paragraph(&format!(
            "{name} Scores ({marker}), Completed: 0"
        ))));
    }
}

// ============================================================================
// Surgery detail bundles
// ============================================================================

/// Code label of the root observation of a surgery details bundle.
pub const SURGERY_DETAILS_LABEL: &str = "PostSurgeryDetail";

const SURGERY_ORGANIZATION: &str = "Hospital Organization";

/// Operation notes for one knee.
#[derive(Clone, Debug, PartialEq)]
pub struct SurgeryDetailsData {
    pub uhid: Uhid,
    pub side: crate::Side,
    /// One JSON object per operation record.
    pub records: Vec<Value>,
    /// Effective time written on every observation.
    pub posted_at: Option<String>,
}

/// Surgery details bundle producer and in-place field updates.
///
/// Records are stored as a tree of observations. Each JSON object becomes one observation whose
/// components are its scalar fields; nested objects and lists get observations of their own,
/// labelled with their path (`PostSurgeryDetail - patient_records [1] - rom [2]`).
pub struct SurgeryDetails;

impl SurgeryDetails {
    /// A patient identified by UHID, the recording organization and the record observations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if a resource cannot be serialised.
    pub fn bundle(data: &SurgeryDetailsData) -> FhirResult<Bundle> {
        let patient_id = ResourceId::new();
        let org_id = ResourceId::new();

        let patient = Patient {
            id: Some(patient_id.to_string()),
            identifier: vec![Identifier {
                system: Some(UHID_SYSTEM.into()),
                value: Some(data.uhid.to_string()),
                ..Default::default()
            }],
            text: Some(Narrative::generated(xhtml_div(&format!(
                "Patient ID: {}",
                data.uhid
            )))),
            ..Default::default()
        };
        let organization = Organization {
            id: Some(org_id.to_string()),
            name: Some(SURGERY_ORGANIZATION.into()),
            text: Some(Narrative::generated(xhtml_div(SURGERY_ORGANIZATION))),
        };

        let mut bundle = Bundle::collection();
        bundle.push(Some(patient_id.urn()), &patient)?;
        bundle.push(Some(org_id.urn()), &organization)?;

        let mut root = Map::new();
        root.insert("side".into(), Value::String(data.side.to_wire().into()));
        root.insert("patient_records".into(), Value::Array(data.records.clone()));
        let root = Value::Object(root);
        let mut flattened = Vec::new();
        flatten_details(SURGERY_DETAILS_LABEL, &root, &mut flattened);

        let subject = patient_id.urn();
        let performer = org_id.urn();
        for (label, content) in flattened {
            let id = ResourceId::new();
            let (component, value_string, narrative) = match content {
                DetailContent::Components(component) => (
                    component,
                    None,
                    format!("{label} Observation with components"),
                ),
                DetailContent::Scalar(value) => {
                    (Vec::new(), Some(value), format!("{label} Observation"))
                }
            };
            let observation = Observation {
                id: Some(id.to_string()),
                status: Some("final".into()),
                category: vec![CodeableConcept {
                    coding: vec![Coding {
                        system: Some(OBSERVATION_CATEGORY_SYSTEM.into()),
                        code: Some("exam".into()),
                        display: Some("Exam".into()),
                    }],
                    text: None,
                }],
                code: Some(CodeableConcept::from_text(label)),
                subject: Some(Reference::to(subject.clone())),
                effective_date_time: data.posted_at.clone(),
                performer: vec![Reference {
                    reference: Some(performer.clone()),
                    display: Some(SURGERY_ORGANIZATION.into()),
                }],
                value_string,
                component,
                text: Some(Narrative::generated(xhtml_div(&narrative))),
                ..Default::default()
            };
            bundle.push(Some(id.urn()), &observation)?;
        }
        Ok(bundle)
    }

    /// Apply `update` to one observation. Returns whether any component changed.
    pub fn apply_update(observation: &mut Observation, update: &SurgeryFieldUpdate) -> bool {
        let label = observation.code_text().unwrap_or_default().to_lowercase();
        match update {
            SurgeryFieldUpdate::Field { field, value } => {
                set_component(&mut observation.component, field, value)
            }
            SurgeryFieldUpdate::RangeOfMotion {
                period,
                measure,
                value,
            } => {
                let in_period = observation.component.iter().any(|c| {
                    c.label() == Some("period") && c.value_string.as_deref() == Some(period.as_str())
                });
                label.contains("rom")
                    && in_period
                    && set_component(&mut observation.component, measure, value)
            }
            SurgeryFieldUpdate::Implant { name, values } => {
                if !label.contains("components_details") || !label.contains(&name.to_lowercase()) {
                    return false;
                }
                let mut changed = false;
                for (key, value) in values {
                    changed |= set_component(&mut observation.component, key, value);
                }
                changed
            }
            SurgeryFieldUpdate::BoneResection {
                group,
                field,
                value,
            } => {
                label.contains(&group.to_lowercase())
                    && set_component(&mut observation.component, field, value)
            }
            SurgeryFieldUpdate::ThicknessRow { thickness, values } => {
                let row = observation.component.iter().any(|c| {
                    c.label() == Some("thickness")
                        && c.value_string.as_deref() == Some(thickness.as_str())
                });
                if !label.contains("thickness_table") || !row {
                    return false;
                }
                let mut changed = false;
                for (key, value) in values {
                    changed |= set_component(&mut observation.component, key, value);
                }
                changed
            }
        }
    }
}

/// A change to stored surgery details.
#[derive(Clone, Debug, PartialEq)]
pub enum SurgeryFieldUpdate {
    /// The first component labelled `field` in every observation.
    Field { field: String, value: String },
    /// `flexion` or `extension` of the range-of-motion reading for `period`.
    RangeOfMotion {
        period: String,
        measure: String,
        value: String,
    },
    /// Several fields of one implant (`FEMUR`, `TIBIA`, `INSERT`, `PATELLA`).
    Implant {
        name: String,
        values: BTreeMap<String, String>,
    },
    /// One field of a bone resection group such as `distal_medial`.
    BoneResection {
        group: String,
        field: String,
        value: String,
    },
    /// Several fields of the thickness table row with this thickness.
    ThicknessRow {
        thickness: String,
        values: BTreeMap<String, String>,
    },
}

enum DetailContent {
    Components(Vec<ObservationComponent>),
    Scalar(String),
}

fn flatten_details(label: &str, value: &Value, out: &mut Vec<(String, DetailContent)>) {
    match value {
        Value::Object(map) => {
            let mut components = Vec::new();
            let mut nested = Vec::new();
            for (key, child) in map {
                match child {
                    Value::Object(_) | Value::Array(_) => nested.push((key, child)),
                    scalar => components.push(ObservationComponent {
                        code: Some(CodeableConcept::from_text(key.clone())),
                        value_string: Some(scalar_text(scalar)),
                        ..Default::default()
                    }),
                }
            }
            for (key, child) in nested {
                flatten_details(&format!("{label} - {key}"), child, out);
            }
            if !components.is_empty() {
                out.push((label.to_owned(), DetailContent::Components(components)));
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_details(&format!("{label} [{}]", index + 1), item, out);
            }
        }
        scalar => out.push((label.to_owned(), DetailContent::Scalar(scalar_text(scalar)))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_component(components: &mut [ObservationComponent], label: &str, value: &str) -> bool {
    match components.iter_mut().find(|c| c.label() == Some(label)) {
        Some(component) => {
            component.value_string = Some(value.to_owned());
            true
        }
        None => false,
    }
}

/// `(<marker>)`, the token that identifies a phase inside questionnaire text.
pub fn period_token(phase: Phase) -> String {
    format!("({})", phase.marker())
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

struct ClinicalObservation<'a> {
    subject: &'a str,
    effective: &'a str,
}

impl ClinicalObservation<'_> {
    fn base(&self, code: ObservationCode, narrative_value: &str) -> Observation {
        Observation {
            id: Some(ResourceId::new().to_string()),
            status: Some("final".into()),
            code: Some(CodeableConcept::from_text(code.label())),
            subject: Some(Reference::to(self.subject)),
            effective_date_time: Some(self.effective.to_owned()),
            performer: vec![Reference::to(self.subject)],
            text: Some(Narrative::generated(xhtml_div(&format!(
                "{}: {narrative_value}",
                code.label()
            )))),
            ..Default::default()
        }
    }

    fn string(&self, code: ObservationCode, value: &str) -> Observation {
        Observation {
            value_string: Some(value.to_owned()),
            ..self.base(code, value)
        }
    }

    fn boolean(&self, code: ObservationCode, value: bool) -> Observation {
        Observation {
            value_boolean: Some(value),
            ..self.base(code, if value { "true" } else { "false" })
        }
    }

    fn quantity(&self, code: ObservationCode, value: f64, unit: &str) -> Observation {
        let number = serde_json::Number::from_f64(value);
        let rendered = number
            .as_ref()
            .map(|n| format!("{n} {unit}"))
            .unwrap_or_default();
        Observation {
            value_quantity: Some(Quantity {
                value: number,
                unit: Some(unit.to_owned()),
            }),
            ..self.base(code, &rendered)
        }
    }
}

fn push_observation(bundle: &mut Bundle, observation: Observation) -> FhirResult<()> {
    bundle.push(Some(ResourceId::new().urn()), &observation)
}

fn comment_provenance(
    activity: ProvenanceActivity,
    comment: &str,
    recorded: String,
    target: &str,
    who: &str,
) -> Provenance {
    Provenance {
        id: Some(ResourceId::new().to_string()),
        target: vec![Reference::to(target)],
        recorded: Some(recorded),
        activity: Some(CodeableConcept::from_text(activity.label())),
        agent: vec![ProvenanceAgent {
            agent_type: Some(CodeableConcept::from_text("Practitioner")),
            who: Some(Reference::to(who)),
        }],
        text: Some(Narrative::generated(xhtml_div(&format!(
            "{} {comment}",
            activity.narrative_prefix()
        )))),
    }
}

fn completion_component(completed: bool) -> ObservationComponent {
    ObservationComponent {
        code: Some(CodeableConcept::from_text(COMPLETION_STATUS_LABEL)),
        value_boolean: Some(completed),
        ..Default::default()
    }
}

fn uhid_identifier(uhid: &Uhid, type_text: Option<&str>) -> Identifier {
    Identifier {
        use_type: Some("usual".into()),
        identifier_type: Some(CodeableConcept {
            coding: vec![Coding {
                system: Some(MR_CODE_SYSTEM.into()),
                code: Some("MR".into()),
                display: Some("Medical Record Number".into()),
            }],
            text: type_text.map(str::to_owned),
        }),
        system: Some(UHID_SYSTEM.into()),
        value: Some(uhid.to_string()),
    }
}

fn contact_point(system: &str, value: &str, use_type: &str) -> ContactPoint {
    ContactPoint {
        system: Some(system.into()),
        value: Some(value.trim().to_owned()),
        use_type: Some(use_type.into()),
    }
}

fn accepted(reference: String) -> Participant {
    Participant {
        actor: Some(Reference::to(reference)),
        status: Some("accepted".into()),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `DD-MM-YYYY` becomes `YYYY-MM-DD`; anything else is kept as supplied.
fn normalise_birth_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), "%d-%m-%Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_owned())
}

fn normalise_comment_time(raw: &str) -> String {
    if raw.contains('T') {
        raw.to_owned()
    } else {
        format!("{raw}T00:00:00Z")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{extract_comment, patient_id_from_narrative, Instrument};
    use crate::resources::FhirResource;
    use crate::Resource;

    fn uhid(s: &str) -> Uhid {
        Uhid::parse(s).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        "2025-03-01T09:30:00Z".parse().unwrap()
    }

    #[test]
    fn base_bundle_normalises_birth_date_and_records_vip() {
        let data = PatientBaseData {
            uhid: uhid("MH001"),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            vip: true,
            birth_date: "05-03-1961".into(),
            gender: Gender::Female,
        };
        let bundle = Registration::base_bundle(&data, fixed_now()).unwrap();
        let resources: Vec<_> = bundle.resources().collect();
        assert_eq!(resources.len(), 2);
        match &resources[0] {
            Resource::Patient(p) => {
                assert_eq!(p.birth_date.as_deref(), Some("1961-03-05"));
                assert_eq!(p.uhid_identifier(), Some("MH001"));
                assert_eq!(p.gender.as_deref(), Some("female"));
            }
            other => panic!("expected patient, got {other:?}"),
        }
        match &resources[1] {
            Resource::Observation(o) => {
                assert_eq!(o.code_text(), Some("VIP Status"));
                assert_eq!(o.value_boolean, Some(true));
            }
            other => panic!("expected observation, got {other:?}"),
        }
    }

    #[test]
    fn iso_birth_date_is_kept() {
        assert_eq!(normalise_birth_date("1961-03-05"), "1961-03-05");
        assert_eq!(normalise_birth_date("unknown"), "unknown");
    }

    #[test]
    fn contact_bundle_has_roles_and_half_hour_appointment() {
        let data = PatientContactData {
            uhid: uhid("MH001"),
            email: "asha@example.org".into(),
            phone: "9000000001".into(),
            alternate_phone: "".into(),
            address: "12 Lake Road".into(),
            left_doctor: uhid("DOC-L"),
            right_doctor: uhid("DOC-R"),
            admin_staff: uhid("ADM1"),
            profile_picture_url: None,
        };
        let bundle = Registration::contact_bundle(&data, fixed_now()).unwrap();
        let mut roles = Vec::new();
        for resource in bundle.resources() {
            match resource {
                Resource::Practitioner(p) => {
                    let role = p
                        .narrative_div()
                        .and_then(PractitionerRole::from_narrative)
                        .unwrap();
                    roles.push((role, p.identifier[0].value.clone().unwrap()));
                }
                Resource::Appointment(a) => {
                    assert_eq!(a.start.as_deref(), Some("2025-03-01T09:30:00.000000Z"));
                    assert_eq!(a.end.as_deref(), Some("2025-03-01T10:00:00.000000Z"));
                    assert_eq!(a.participant.len(), 4);
                }
                Resource::Patient(p) => {
                    assert_eq!(p.telecom.len(), 2);
                    assert!(p.photo.is_empty());
                }
                _ => {}
            }
        }
        assert_eq!(
            roles,
            vec![
                (PractitionerRole::LeftDoctor, "DOC-L".to_string()),
                (PractitionerRole::RightDoctor, "DOC-R".to_string()),
                (PractitionerRole::AdminStaff, "ADM1".to_string()),
            ]
        );
    }

    #[test]
    fn medical_bundle_comments_round_trip_through_extraction() {
        let data = PatientMedicalData {
            uhid: uhid("MH001"),
            blood_group: "B+".into(),
            height_cm: 162.5,
            weight_kg: 70.0,
            activation_status: true,
            activation_comments: vec![CommentData {
                timestamp: "2025-02-01".into(),
                comment: "Activation - approved".into(),
            }],
            follow_up_comments: vec![CommentData {
                timestamp: "2025-02-10T08:00:00Z".into(),
                comment: "call back".into(),
            }],
            operation_funding: "Insurance".into(),
            id_proofs: BTreeMap::from([("aadhar".to_string(), "1234".to_string())]),
            current_status: "LEFT".into(),
            surgery_date_left: Some("2025-01-15".into()),
            surgery_date_right: None,
        };
        let bundle = Registration::medical_bundle(&data, fixed_now()).unwrap();
        assert_eq!(bundle.entry[0].resource_id(), Some("MH001"));

        let provenances: Vec<Provenance> = bundle
            .resources()
            .filter_map(|r| match r {
                Resource::Provenance(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(provenances.len(), 2);
        assert_eq!(provenances[0].recorded.as_deref(), Some("2025-02-01T00:00:00Z"));
        let activation = extract_comment(
            provenances[0].narrative_div().unwrap(),
            ProvenanceActivity::ActivationComment,
        );
        assert_eq!(activation.text, "approved");
        assert!(activation.mentions_activation);
        let follow_up = extract_comment(
            provenances[1].narrative_div().unwrap(),
            ProvenanceActivity::FollowUpComment,
        );
        assert_eq!(follow_up.text, "call back");

        let surgery_dates = bundle
            .resources()
            .filter(|r| {
                matches!(r, Resource::Observation(o)
                    if o.code_text().and_then(ObservationCode::classify)
                        == Some(ObservationCode::SurgeryDate(crate::Side::Left)))
            })
            .count();
        assert_eq!(surgery_dates, 1);
    }

    #[test]
    fn questionnaire_bundle_is_recognised() {
        let assignment = QuestionnaireAssignmentData {
            name: "Oxford Knee Score (OKS)".into(),
            phase: Phase::PreOp,
            assigned_date: "2025-01-01".into(),
            deadline: "2025-01-14".into(),
            completed: false,
        };
        let bundle = Questionnaires::new_bundle(&uhid("MH001"), &[assignment]).unwrap();
        assert_eq!(
            bundle.entry[0]
                .narrative_div()
                .and_then(patient_id_from_narrative)
                .as_deref(),
            Some("mh001")
        );
        match bundle.entry[1].decode() {
            Some(Resource::Observation(o)) => {
                assert_eq!(
                    o.code_text().and_then(ObservationCode::classify),
                    Some(ObservationCode::Prom(Instrument::Oks))
                );
                assert_eq!(o.value_string.as_deref(), Some("Scores (Pre Op)"));
                assert_eq!(o.completion_status(), Some(false));
                assert!(Questionnaires::is_assignment(&o, "Oxford Knee Score (OKS)", Phase::PreOp));
                assert!(!Questionnaires::is_assignment(&o, "Oxford Knee Score (OKS)", Phase::SixWeeks));
            }
            other => panic!("expected observation, got {other:?}"),
        }
    }

    #[test]
    fn apply_score_rewrites_observation() {
        let assignment = QuestionnaireAssignmentData {
            name: "Knee Society Score (KSS)".into(),
            phase: Phase::ThreeMonths,
            assigned_date: "2025-01-01".into(),
            deadline: "2025-01-14".into(),
            completed: false,
        };
        let entry = Questionnaires::observation_entry("urn:uuid:p", &assignment).unwrap();
        let mut obs = match entry.decode() {
            Some(Resource::Observation(o)) => o,
            other => panic!("expected observation, got {other:?}"),
        };
        let score = QuestionnaireScoreData {
            name: assignment.name.clone(),
            phase: Phase::ThreeMonths,
            scores: vec![40, 38],
            timestamp: "2025-04-01T10:00:00Z".into(),
            others: vec!["stairs hard".into()],
        };
        Questionnaires::apply_score(&mut obs, &score);
        Questionnaires::apply_score(&mut obs, &score);

        assert_eq!(
            obs.value_string.as_deref(),
            Some("Scores (3M): 40, 38 (Recorded at 2025-04-01T10:00:00Z)")
        );
        assert_eq!(obs.status.as_deref(), Some("final"));
        assert_eq!(obs.completion_status(), Some(true));
        assert_eq!(obs.component.len(), 3);
        assert_eq!(obs.note_texts(), vec!["stairs hard"]);
        assert_eq!(Phase::from_value_text(obs.value_string.as_deref().unwrap()), Some(Phase::ThreeMonths));
    }

    #[test]
    fn reset_undoes_a_score() {
        let assignment = QuestionnaireAssignmentData {
            name: "Oxford Knee Score (OKS)".into(),
            phase: Phase::SixWeeks,
            assigned_date: "2025-01-01".into(),
            deadline: "2025-01-14".into(),
            completed: false,
        };
        let entry = Questionnaires::observation_entry("urn:uuid:p", &assignment).unwrap();
        let mut obs = match entry.decode() {
            Some(Resource::Observation(o)) => o,
            other => panic!("expected observation, got {other:?}"),
        };
        Questionnaires::apply_score(
            &mut obs,
            &QuestionnaireScoreData {
                name: assignment.name.clone(),
                phase: Phase::SixWeeks,
                scores: vec![12],
                timestamp: "2025-02-01T10:00:00Z".into(),
                others: vec!["note".into()],
            },
        );

        Questionnaires::reset(&mut obs, Phase::SixWeeks, "2025-03-01");
        assert_eq!(obs.value_string.as_deref(), Some("Scores (6W)"));
        assert_eq!(obs.completion_status(), Some(false));
        assert_eq!(obs.component.len(), 1);
        assert!(obs.note.is_empty());
        assert_eq!(
            obs.effective_period.as_ref().and_then(|p| p.end.as_deref()),
            Some("2025-03-01")
        );
        assert!(Questionnaires::is_assignment(&obs, "Oxford Knee Score (OKS)", Phase::SixWeeks));
        assert!(obs.narrative_div().is_some_and(|d| d.contains("Completed: 0")));
    }

    fn surgery_record() -> Value {
        serde_json::json!({
            "hospital_name": "City Ortho",
            "operating_surgeon": "DOC1",
            "rom": [
                { "period": "pre-op", "flexion": "90", "extension": "5" },
                { "period": "intra-op", "flexion": "120", "extension": "0" }
            ],
            "components_details": {
                "FEMUR": { "MANUFACTURER": "Acme", "MODEL": "K1", "SIZE": "5" }
            },
            "bone_resection": {
                "acl": "intact",
                "distal_medial": { "initial": "8", "recut": "no" },
                "thickness_table": [{ "thickness": 9, "liftOff": "no" }]
            }
        })
    }

    fn surgery_observations(bundle: &Bundle) -> Vec<Observation> {
        bundle
            .resources()
            .filter_map(|r| match r {
                Resource::Observation(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    fn observation_labelled<'a>(
        observations: &'a mut [Observation],
        label: &str,
    ) -> &'a mut Observation {
        observations
            .iter_mut()
            .find(|o| o.code_text() == Some(label))
            .unwrap_or_else(|| panic!("no observation labelled {label}"))
    }

    #[test]
    fn surgery_bundle_flattens_records_by_path() {
        let data = SurgeryDetailsData {
            uhid: uhid("MH001"),
            side: crate::Side::Left,
            records: vec![surgery_record()],
            posted_at: Some("2025-03-01T09:30:00Z".into()),
        };
        let bundle = SurgeryDetails::bundle(&data).unwrap();
        assert_eq!(bundle.entry[0].identifier_values().collect::<Vec<_>>(), vec!["MH001"]);

        let mut observations = surgery_observations(&bundle);
        let labels: Vec<_> = observations.iter().filter_map(|o| o.code_text()).collect();
        for expected in [
            "PostSurgeryDetail",
            "PostSurgeryDetail - patient_records [1]",
            "PostSurgeryDetail - patient_records [1] - rom [2]",
            "PostSurgeryDetail - patient_records [1] - components_details - FEMUR",
            "PostSurgeryDetail - patient_records [1] - bone_resection - distal_medial",
            "PostSurgeryDetail - patient_records [1] - bone_resection - thickness_table [1]",
        ] {
            assert!(labels.contains(&expected), "missing {expected}");
        }
        assert!(!labels.contains(&"PostSurgeryDetail - patient_records [1] - components_details"));

        let root = observation_labelled(&mut observations, SURGERY_DETAILS_LABEL);
        assert_eq!(root.component[0].label(), Some("side"));
        assert_eq!(root.component[0].value_string.as_deref(), Some("left"));
        assert_eq!(root.effective_date_time.as_deref(), Some("2025-03-01T09:30:00Z"));

        let row = observation_labelled(
            &mut observations,
            "PostSurgeryDetail - patient_records [1] - bone_resection - thickness_table [1]",
        );
        let thickness = row
            .component
            .iter()
            .find(|c| c.label() == Some("thickness"))
            .unwrap();
        assert_eq!(thickness.value_string.as_deref(), Some("9"));
    }

    #[test]
    fn surgery_updates_target_their_observations() {
        let data = SurgeryDetailsData {
            uhid: uhid("MH001"),
            side: crate::Side::Right,
            records: vec![surgery_record()],
            posted_at: None,
        };
        let mut observations = surgery_observations(&SurgeryDetails::bundle(&data).unwrap());

        let rom = SurgeryFieldUpdate::RangeOfMotion {
            period: "intra-op".into(),
            measure: "flexion".into(),
            value: "125".into(),
        };
        let first = observation_labelled(
            &mut observations,
            "PostSurgeryDetail - patient_records [1] - rom [1]",
        );
        assert!(!SurgeryDetails::apply_update(first, &rom));
        let second = observation_labelled(
            &mut observations,
            "PostSurgeryDetail - patient_records [1] - rom [2]",
        );
        assert!(SurgeryDetails::apply_update(second, &rom));
        let flexion = second
            .component
            .iter()
            .find(|c| c.label() == Some("flexion"))
            .and_then(|c| c.value_string.as_deref());
        assert_eq!(flexion, Some("125"));

        let implant = SurgeryFieldUpdate::Implant {
            name: "femur".into(),
            values: BTreeMap::from([("SIZE".to_string(), "6".to_string())]),
        };
        let femur = observation_labelled(
            &mut observations,
            "PostSurgeryDetail - patient_records [1] - components_details - FEMUR",
        );
        assert!(SurgeryDetails::apply_update(femur, &implant));

        let resection = SurgeryFieldUpdate::BoneResection {
            group: "distal_medial".into(),
            field: "recut".into(),
            value: "yes".into(),
        };
        let record =
            observation_labelled(&mut observations, "PostSurgeryDetail - patient_records [1]");
        assert!(!SurgeryDetails::apply_update(record, &resection));
        assert!(SurgeryDetails::apply_update(
            record,
            &SurgeryFieldUpdate::Field {
                field: "hospital_name".into(),
                value: "Lake Ortho".into(),
            }
        ));
        assert!(!SurgeryDetails::apply_update(
            record,
            &SurgeryFieldUpdate::Field {
                field: "anaesthetic_type".into(),
                value: "GA".into(),
            }
        ));
    }
}
