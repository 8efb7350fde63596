//! Request bodies.
//!
//! Field names follow the JSON the clinic front end already sends, aliases included. Each body
//! converts into the matching `fhir` builder input (or `prom_core::PatientUpdate`) with
//! `TryFrom`, which is where identifiers, sides, phases and enumerated values are checked.

use crate::ValidationError;
use chrono::NaiveDate;
use fhir::{
    CommentData, Gender, PatientBaseData, PatientContactData, PatientMedicalData, Phase,
    QuestionnaireAssignmentData, QuestionnaireScoreData, Side, SurgeryDetailsData,
    SurgeryFieldUpdate,
};
use prom_core::PatientUpdate;
use prom_types::{NonEmptyText, Uhid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

// ============================================================================
// Registration
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct PatientBaseReq {
    pub uhid: String,
    pub first_name: String,
    pub last_name: String,
    /// `1` for a VIP patient, `0` otherwise.
    pub vip: u8,
    /// `DD-MM-YYYY`.
    pub dob: String,
    pub gender: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct PatientContactReq {
    pub uhid: String,
    pub email: String,
    pub phone_number: String,
    #[serde(alias = "alternatenumber", default)]
    pub alternate_phone: String,
    pub address: String,
    pub doctor_uhid_left: String,
    pub doctor_uhid_right: String,
    pub admin_uhid: String,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct CommentReq {
    pub timestamp: String,
    pub comment: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct PatientMedicalReq {
    pub uhid: String,
    pub blood_grp: String,
    pub height: f64,
    pub weight: f64,
    pub activation_status: bool,
    #[serde(default)]
    pub activation_comment: Vec<CommentReq>,
    #[serde(default)]
    pub patient_followup_comment: Vec<CommentReq>,
    pub operation_funding: String,
    #[serde(alias = "idproof", default)]
    pub id_proof: BTreeMap<String, String>,
    /// `LEFT`, `RIGHT` or `LEFT, RIGHT`.
    pub patient_current_status: String,
    #[serde(default)]
    pub surgery_date_left: Option<String>,
    #[serde(default)]
    pub surgery_date_right: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct PatientFullReq {
    pub base: PatientBaseReq,
    pub contact: PatientContactReq,
    pub medical: PatientMedicalReq,
}

impl TryFrom<PatientBaseReq> for PatientBaseData {
    type Error = ValidationError;

    fn try_from(req: PatientBaseReq) -> Result<Self, Self::Error> {
        let vip = match req.vip {
            0 => false,
            1 => true,
            other => {
                return Err(ValidationError::Unrecognised {
                    field: "vip",
                    value: other.to_string(),
                })
            }
        };
        let gender = Gender::from_wire(&req.gender).ok_or(ValidationError::Unrecognised {
            field: "gender",
            value: req.gender.clone(),
        })?;

        Ok(PatientBaseData {
            uhid: uhid("uhid", &req.uhid)?,
            first_name: text("first_name", &req.first_name)?,
            last_name: text("last_name", &req.last_name)?,
            vip,
            birth_date: req.dob,
            gender,
        })
    }
}

impl TryFrom<PatientContactReq> for PatientContactData {
    type Error = ValidationError;

    fn try_from(req: PatientContactReq) -> Result<Self, Self::Error> {
        Ok(PatientContactData {
            uhid: uhid("uhid", &req.uhid)?,
            email: req.email,
            phone: req.phone_number,
            alternate_phone: req.alternate_phone,
            address: req.address,
            left_doctor: uhid("doctor_uhid_left", &req.doctor_uhid_left)?,
            right_doctor: uhid("doctor_uhid_right", &req.doctor_uhid_right)?,
            admin_staff: uhid("admin_uhid", &req.admin_uhid)?,
            profile_picture_url: req.profile_picture_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

impl TryFrom<PatientMedicalReq> for PatientMedicalData {
    type Error = ValidationError;

    fn try_from(req: PatientMedicalReq) -> Result<Self, Self::Error> {
        const CURRENT_STATUSES: [&str; 3] = ["LEFT", "RIGHT", "LEFT, RIGHT"];
        if !CURRENT_STATUSES.contains(&req.patient_current_status.as_str()) {
            return Err(ValidationError::Unrecognised {
                field: "patient_current_status",
                value: req.patient_current_status,
            });
        }

        Ok(PatientMedicalData {
            uhid: uhid("uhid", &req.uhid)?,
            blood_group: req.blood_grp,
            height_cm: req.height,
            weight_kg: req.weight,
            activation_status: req.activation_status,
            activation_comments: req.activation_comment.into_iter().map(Into::into).collect(),
            follow_up_comments: req
                .patient_followup_comment
                .into_iter()
                .map(Into::into)
                .collect(),
            operation_funding: req.operation_funding,
            id_proofs: req.id_proof,
            current_status: req.patient_current_status,
            surgery_date_left: req.surgery_date_left.filter(|d| !d.trim().is_empty()),
            surgery_date_right: req.surgery_date_right.filter(|d| !d.trim().is_empty()),
        })
    }
}

impl From<CommentReq> for CommentData {
    fn from(req: CommentReq) -> Self {
        CommentData {
            timestamp: req.timestamp,
            comment: req.comment,
        }
    }
}

// ============================================================================
// Questionnaires
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct QuestionnaireAssignmentReq {
    pub uhid: String,
    /// `left` or `right`.
    pub side: String,
    pub name: String,
    /// Phase such as `Pre Op`, `6W` or `1Y`.
    pub period: String,
    pub assigned_date: String,
    pub deadline: String,
    #[serde(default)]
    pub completed: u8,
}

/// A questionnaire assignment after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidAssignment {
    pub uhid: Uhid,
    pub side: Side,
    pub data: QuestionnaireAssignmentData,
}

impl TryFrom<QuestionnaireAssignmentReq> for ValidAssignment {
    type Error = ValidationError;

    fn try_from(req: QuestionnaireAssignmentReq) -> Result<Self, Self::Error> {
        Ok(ValidAssignment {
            uhid: uhid("uhid", &req.uhid)?,
            side: side(&req.side)?,
            data: QuestionnaireAssignmentData {
                name: req.name,
                phase: phase(&req.period)?,
                assigned_date: req.assigned_date,
                deadline: req.deadline,
                completed: req.completed != 0,
            },
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct QuestionnaireScoreReq {
    pub uhid: String,
    pub side: String,
    pub name: String,
    pub score: Vec<i64>,
    pub period: String,
    pub timestamp: String,
    #[serde(default)]
    pub others: Vec<String>,
}

/// A score submission after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidScore {
    pub uhid: Uhid,
    pub side: Side,
    pub data: QuestionnaireScoreData,
}

impl TryFrom<QuestionnaireScoreReq> for ValidScore {
    type Error = ValidationError;

    fn try_from(req: QuestionnaireScoreReq) -> Result<Self, Self::Error> {
        Ok(ValidScore {
            uhid: uhid("uhid", &req.uhid)?,
            side: side(&req.side)?,
            data: QuestionnaireScoreData {
                name: req.name,
                phase: phase(&req.period)?,
                scores: req.score,
                timestamp: req.timestamp,
                others: req.others,
            },
        })
    }
}

/// Identifies every questionnaire of one phase on one side. Used for both delete and reset.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct QuestionnairePeriodReq {
    pub patient_id: String,
    pub side: String,
    pub period: String,
}

impl QuestionnairePeriodReq {
    pub fn validate(&self) -> Result<(Uhid, Side, Phase), ValidationError> {
        Ok((
            uhid("patient_id", &self.patient_id)?,
            side(&self.side)?,
            phase(&self.period)?,
        ))
    }
}

// ============================================================================
// Follow-up
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct FollowUpCommentReq {
    pub uhid: String,
    pub comment: String,
}

impl FollowUpCommentReq {
    pub fn validate(&self) -> Result<(Uhid, NonEmptyText), ValidationError> {
        let comment = NonEmptyText::new(&self.comment).map_err(|source| ValidationError::Text {
            field: "comment",
            source,
        })?;
        Ok((uhid("uhid", &self.uhid)?, comment))
    }
}

// ============================================================================
// Patient update
// ============================================================================

/// A partial edit of a registered patient. Absent or blank fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct PatientUpdateReq {
    pub uhid: Option<String>,
    /// Full name; the last word becomes the family name.
    pub name: Option<String>,
    #[serde(alias = "given")]
    pub first_name: Option<String>,
    #[serde(alias = "family")]
    pub last_name: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(alias = "birthDate", alias = "birthdate")]
    pub dob: Option<String>,
    pub gender: Option<String>,
    /// `true`, `false`, `1` or `0`.
    #[serde(alias = "vip")]
    pub vip_status: Option<String>,
    #[serde(alias = "blood_grp")]
    pub blood_group: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    #[serde(alias = "patient_current_status")]
    pub current_status: Option<String>,
    pub surgery_date_left: Option<String>,
    pub surgery_date_right: Option<String>,
    #[serde(alias = "operation_funding")]
    pub funding_source: Option<String>,
    pub aadhar: Option<String>,
    pub pan: Option<String>,
    pub passport: Option<String>,
}

impl TryFrom<PatientUpdateReq> for PatientUpdate {
    type Error = ValidationError;

    fn try_from(req: PatientUpdateReq) -> Result<Self, Self::Error> {
        let mut update = PatientUpdate::default();

        if let Some(value) = present(req.uhid) {
            update.uhid = Some(uhid("uhid", &value)?);
        }
        if let Some(full) = present(req.name) {
            let mut words: Vec<&str> = full.split_whitespace().collect();
            if words.len() > 1 {
                update.last_name = words.pop().map(str::to_owned);
            }
            update.first_name = Some(words.join(" "));
        }
        if let Some(first) = present(req.first_name) {
            update.first_name = Some(first);
        }
        if let Some(last) = present(req.last_name) {
            update.last_name = Some(last);
        }
        if let Some(dob) = present(req.dob) {
            let date = NaiveDate::parse_from_str(&dob, "%Y-%m-%d")
                .map_err(|_| ValidationError::Unrecognised { field: "dob", value: dob })?;
            update.birth_date = Some(date);
        }
        if let Some(gender) = present(req.gender) {
            update.gender = Some(
                Gender::from_wire(&gender)
                    .ok_or(ValidationError::Unrecognised { field: "gender", value: gender })?,
            );
        }
        if let Some(vip) = present(req.vip_status) {
            update.vip = Some(match vip.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ValidationError::Unrecognised {
                        field: "vip_status",
                        value: vip,
                    })
                }
            });
        }
        if let Some(height) = present(req.height) {
            update.height_cm = Some(number("height", height)?);
        }
        if let Some(weight) = present(req.weight) {
            update.weight_kg = Some(number("weight", weight)?);
        }

        update.blood_group = present(req.blood_group);
        update.current_status = present(req.current_status);
        update.surgery_date_left = present(req.surgery_date_left);
        update.surgery_date_right = present(req.surgery_date_right);
        update.funding_source = present(req.funding_source);
        for (doc_type, number) in [("aadhar", req.aadhar), ("pan", req.pan), ("passport", req.passport)]
        {
            if let Some(number) = present(number) {
                update.id_proofs.insert(doc_type.to_owned(), number);
            }
        }

        Ok(update)
    }
}

// ============================================================================
// Surgery details
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct RangeOfMotionReq {
    /// `pre-op` or `post-op`, as the theatre form labels them.
    pub period: String,
    pub flexion: String,
    pub extension: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ImplantReq {
    #[serde(rename = "MANUFACTURER")]
    pub manufacturer: String,
    #[serde(rename = "MODEL")]
    pub model: String,
    #[serde(rename = "SIZE")]
    pub size: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ImplantComponentsReq {
    #[serde(rename = "FEMUR")]
    pub femur: ImplantReq,
    #[serde(rename = "TIBIA")]
    pub tibia: ImplantReq,
    #[serde(rename = "INSERT")]
    pub insert: ImplantReq,
    #[serde(rename = "PATELLA")]
    pub patella: ImplantReq,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ThicknessRowReq {
    pub thickness: i64,
    pub num_of_ticks: String,
    pub extension_ext_orient: String,
    pub flexion_int_orient: String,
    pub lift_off: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct BoneResectionReq {
    pub acl: String,
    pub distal_medial: BTreeMap<String, String>,
    pub distal_lateral: BTreeMap<String, String>,
    pub posterial_medial: BTreeMap<String, String>,
    pub posterial_lateral: BTreeMap<String, String>,
    pub tibial_resection_left: BTreeMap<String, String>,
    pub tibial_resection_right: BTreeMap<String, String>,
    pub pcl: String,
    pub tibialvvrecut: BTreeMap<String, String>,
    pub tibialsloperecut: BTreeMap<String, String>,
    pub final_check: String,
    pub thickness_table: Vec<ThicknessRowReq>,
    pub pfj_resurfacing: String,
    pub trachela_resection: String,
    pub patella: String,
    pub preresurfacing: String,
    pub postresurfacing: String,
}

/// One operation as recorded in theatre.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct SurgeryRecordReq {
    pub patuhid: String,
    pub hospital_name: String,
    pub anaesthetic_type: String,
    pub asa_grade: String,
    pub rom: Vec<RangeOfMotionReq>,
    pub consultant_incharge: String,
    pub operating_surgeon: String,
    pub first_assistant: String,
    pub second_assistant: String,
    pub mag_proc: String,
    pub side: String,
    pub surgery_indication: String,
    pub tech_assist: String,
    pub align_phil: String,
    pub torq_used: String,
    pub op_date: String,
    pub op_time: String,
    pub components_details: ImplantComponentsReq,
    pub bone_resection: BoneResectionReq,
    pub posting_timestamp: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct SurgeryDetailsReq {
    pub uhid: String,
    pub side: String,
    pub patient_records: Vec<SurgeryRecordReq>,
}

impl TryFrom<SurgeryDetailsReq> for SurgeryDetailsData {
    type Error = ValidationError;

    fn try_from(req: SurgeryDetailsReq) -> Result<Self, Self::Error> {
        let posted_at = req
            .patient_records
            .first()
            .map(|record| record.posting_timestamp.clone())
            .filter(|ts| !ts.trim().is_empty());
        let records = req
            .patient_records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ValidationError::Encoding {
                field: "patient_records",
                source,
            })?;

        Ok(SurgeryDetailsData {
            uhid: uhid("uhid", &req.uhid)?,
            side: side(&req.side)?,
            records,
            posted_at,
        })
    }
}

/// A correction to stored surgery details.
///
/// Which fields are present decides the kind of correction: `thickness` with `update_values`
/// edits a thickness table row, `component_values` edits the implant named by `field`,
/// `period` edits a range-of-motion reading, a `field` of the form `group,key` edits a bone
/// resection value, and a plain `field` with `value` edits any other record field.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct SurgeryFieldUpdateReq {
    pub uhid: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub component_values: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub thickness: Option<String>,
    #[serde(default)]
    pub update_values: Option<BTreeMap<String, String>>,
}

impl SurgeryFieldUpdateReq {
    pub fn validate(&self) -> Result<(Uhid, SurgeryFieldUpdate), ValidationError> {
        let uhid = uhid("uhid", &self.uhid)?;
        let field = self.field.clone().filter(|f| !f.trim().is_empty());

        let update = match (
            &self.thickness,
            &self.update_values,
            &self.component_values,
            &self.period,
            field,
            &self.value,
        ) {
            (Some(thickness), Some(values), ..) => SurgeryFieldUpdate::ThicknessRow {
                thickness: thickness.clone(),
                values: values.clone(),
            },
            (_, _, Some(values), _, Some(name), _) => SurgeryFieldUpdate::Implant {
                name,
                values: values.clone(),
            },
            (_, _, _, Some(period), Some(measure), Some(value)) => {
                SurgeryFieldUpdate::RangeOfMotion {
                    period: period.clone(),
                    measure,
                    value: value.clone(),
                }
            }
            (.., Some(field), Some(value)) => match field.split_once(',') {
                Some((group, key)) => SurgeryFieldUpdate::BoneResection {
                    group: group.trim().to_owned(),
                    field: key.trim().to_owned(),
                    value: value.clone(),
                },
                None => SurgeryFieldUpdate::Field {
                    field,
                    value: value.clone(),
                },
            },
            (.., field, _) => {
                return Err(ValidationError::Unrecognised {
                    field: "field",
                    value: field.unwrap_or_default(),
                })
            }
        };
        Ok((uhid, update))
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn number(field: &'static str, value: String) -> Result<f64, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::Unrecognised { field, value })
}

fn uhid(field: &'static str, value: &str) -> Result<Uhid, ValidationError> {
    Uhid::parse(value).map_err(|source| ValidationError::Text { field, source })
}

fn text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    NonEmptyText::new(value)
        .map(NonEmptyText::into_string)
        .map_err(|source| ValidationError::Text { field, source })
}

fn side(value: &str) -> Result<Side, ValidationError> {
    Side::from_wire(value).ok_or_else(|| ValidationError::Unrecognised {
        field: "side",
        value: value.to_owned(),
    })
}

fn phase(value: &str) -> Result<Phase, ValidationError> {
    Phase::from_period(value).ok_or_else(|| ValidationError::Unrecognised {
        field: "period",
        value: value.to_owned(),
    })
}
