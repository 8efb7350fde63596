//! Response shapes built on top of a [`MergedPatient`].

use crate::metrics::{completion, post_op_phase, CompletionPercentage, PostOpStatus};
use crate::record::{FollowUpRecord, MergedPatient, PromEntry, SideScores};
use chrono::NaiveDate;
use fhir::{Instrument, Phase, Side};
use serde::Serialize;
use std::collections::BTreeMap;

/// Full patient record annotated with completion counts and phase status per side.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: MergedPatient,
    #[serde(rename = "Medical_Left_Completion")]
    pub left_completion: CompletionPercentage,
    #[serde(rename = "Medical_Left_Completed_Count")]
    pub left_completed: usize,
    #[serde(rename = "Medical_Left_Pending_Count")]
    pub left_pending: usize,
    #[serde(rename = "Medical_Right_Completion")]
    pub right_completion: CompletionPercentage,
    #[serde(rename = "Medical_Right_Completed_Count")]
    pub right_completed: usize,
    #[serde(rename = "Medical_Right_Pending_Count")]
    pub right_pending: usize,
    #[serde(rename = "Patient_Status_Left")]
    pub status_left: PostOpStatus,
    #[serde(rename = "Patient_Status_Right")]
    pub status_right: PostOpStatus,
}

impl PatientView {
    pub fn new(patient: MergedPatient, today: NaiveDate) -> Self {
        let empty = SideScores::default();
        let left = completion(patient.side(Side::Left).unwrap_or(&empty));
        let right = completion(patient.side(Side::Right).unwrap_or(&empty));
        let status_left = side_status(&patient, Side::Left, today);
        let status_right = side_status(&patient, Side::Right, today);

        Self {
            left_completion: left.percentage,
            left_completed: left.completed,
            left_pending: left.pending,
            right_completion: right.percentage,
            right_completed: right.completed,
            right_pending: right.pending,
            status_left,
            status_right,
            patient,
        }
    }
}

/// One row of a staff member's patient list. Per-side questionnaires and surgery dates are
/// left out; only their derived values remain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StaffPatientSummary {
    #[serde(flatten)]
    pub patient: MergedPatient,
    #[serde(rename = "Medical_Left_Completion")]
    pub left_completion: CompletionPercentage,
    #[serde(rename = "Medical_Right_Completion")]
    pub right_completion: CompletionPercentage,
    #[serde(rename = "Patient_Status_Left")]
    pub status_left: PostOpStatus,
    #[serde(rename = "Patient_Status_Right")]
    pub status_right: PostOpStatus,
}

impl From<PatientView> for StaffPatientSummary {
    fn from(view: PatientView) -> Self {
        let mut patient = view.patient;
        patient.medical_left = None;
        patient.medical_right = None;
        if let Some(medical) = patient.medical.as_mut() {
            medical.surgery_date_left = None;
            medical.surgery_date_right = None;
        }
        patient.medical = patient.medical.filter(|m| !m.is_empty());

        Self {
            patient,
            left_completion: view.left_completion,
            right_completion: view.right_completion,
            status_left: view.status_left,
            status_right: view.status_right,
        }
    }
}

/// A patient seen from one doctor: the knees the doctor is assigned to and the questionnaires
/// recorded on each of them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DoctorPatientSides {
    pub patient_uhid: String,
    pub assigned_sides: Vec<Side>,
    /// Questionnaires per assigned side. A side with no questionnaire bundle is empty.
    pub scores: BTreeMap<Side, SideScores>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReminderContact {
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Questionnaires still outstanding for one side. Instruments with nothing pending are omitted.
pub type PendingQuestionnaires = BTreeMap<Instrument, BTreeMap<Phase, PromEntry>>;

/// What a reminder call needs: how to reach the patient and what is outstanding.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReminderView {
    pub uhid: String,
    #[serde(rename = "Patient")]
    pub patient: ReminderContact,
    #[serde(rename = "Medical_Left")]
    pub medical_left: PendingQuestionnaires,
    #[serde(rename = "Medical_Right")]
    pub medical_right: PendingQuestionnaires,
    pub follow_up_records: Vec<FollowUpRecord>,
}

impl From<MergedPatient> for ReminderView {
    fn from(merged: MergedPatient) -> Self {
        let contact = merged
            .patient
            .as_ref()
            .map(|p| ReminderContact {
                phone: p.phone.clone(),
                email: p.email.clone(),
            })
            .unwrap_or_default();

        Self {
            medical_left: pending(merged.side(Side::Left)),
            medical_right: pending(merged.side(Side::Right)),
            follow_up_records: merged
                .medical
                .map(|m| m.follow_up_records)
                .unwrap_or_default(),
            patient: contact,
            uhid: merged.uhid,
        }
    }
}

fn pending(scores: Option<&SideScores>) -> PendingQuestionnaires {
    let mut pending = PendingQuestionnaires::new();
    let Some(scores) = scores else {
        return pending;
    };
    for (instrument, phase, entry) in scores.leaves() {
        if !entry.is_completed() {
            pending
                .entry(instrument)
                .or_default()
                .insert(phase, entry.clone());
        }
    }
    pending
}

fn side_status(patient: &MergedPatient, side: Side, today: NaiveDate) -> PostOpStatus {
    post_op_phase(
        patient.medical.as_ref().and_then(|m| m.surgery_date(side)),
        today,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MedicalSection, PatientSection};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn prom(completed: bool) -> PromEntry {
        PromEntry {
            score: "Scores (6W)".into(),
            completed: Some(completed),
            ..Default::default()
        }
    }

    fn sample() -> MergedPatient {
        let mut left = SideScores::default();
        left.oks.insert(Phase::SixWeeks, prom(true));
        left.kss.insert(Phase::SixWeeks, prom(false));
        MergedPatient {
            uhid: "MH001".into(),
            patient: Some(PatientSection {
                phone: Some("900".into()),
                ..Default::default()
            }),
            medical: Some(MedicalSection {
                surgery_date_left: Some("2023-06-01".into()),
                follow_up_records: vec![FollowUpRecord {
                    follow_up_comment: "call".into(),
                    recorded: None,
                }],
                ..Default::default()
            }),
            medical_left: Some(left),
            ..Default::default()
        }
    }

    #[test]
    fn patient_view_annotations() {
        let value = serde_json::to_value(PatientView::new(sample(), today())).unwrap();
        assert_eq!(value["uhid"], json!("MH001"));
        assert_eq!(value["Medical_Left_Completion"], json!(50.0));
        assert_eq!(value["Medical_Left_Completed_Count"], json!(1));
        assert_eq!(value["Medical_Left_Pending_Count"], json!(1));
        assert_eq!(value["Medical_Right_Completion"], json!("NA"));
        assert_eq!(value["Patient_Status_Left"], json!(["6W", "3M", "6M"]));
        assert_eq!(value["Patient_Status_Right"], json!("NA"));
        assert_eq!(value["Medical"]["surgery_date_left"], json!("2023-06-01"));
    }

    #[test]
    fn staff_summary_drops_scores_and_surgery_dates() {
        let summary = StaffPatientSummary::from(PatientView::new(sample(), today()));
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("Medical_Left").is_none());
        assert!(value["Medical"].get("surgery_date_left").is_none());
        assert_eq!(value["Medical_Left_Completion"], json!(50.0));
        assert_eq!(value["Patient_Status_Left"], json!(["6W", "3M", "6M"]));
        assert!(value.get("Medical_Left_Completed_Count").is_none());
    }

    #[test]
    fn doctor_sides_serialise_with_wire_side_keys() {
        let mut scores = BTreeMap::new();
        scores.insert(Side::Right, SideScores::default());
        let row = DoctorPatientSides {
            patient_uhid: "MH001".into(),
            assigned_sides: vec![Side::Right],
            scores,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["assigned_sides"], json!(["right"]));
        assert_eq!(value["scores"]["right"]["OKS"], json!({}));
    }

    #[test]
    fn reminder_keeps_only_pending() {
        let value = serde_json::to_value(ReminderView::from(sample())).unwrap();
        assert_eq!(
            value,
            json!({
                "uhid": "MH001",
                "Patient": { "phone": "900", "email": null },
                "Medical_Left": {
                    "KSS": { "6W": { "score": "Scores (6W)", "completed": false, "other_notes": [], "deadline": "" } }
                },
                "Medical_Right": {},
                "follow_up_records": [{ "follow_up_comment": "call", "recorded": null }]
            })
        );
    }
}
