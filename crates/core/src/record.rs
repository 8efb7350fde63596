//! Typed patient records produced by the parser and the merger.
//!
//! JSON keys match the established response shape (`Patient`, `Practitioners`, `VIP_Status`,
//! `Medical_Left`, ...). Absent scalars and empty lists are omitted.

use fhir::{Gender, Instrument, Phase, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Sections
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(rename = "birthDate", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl PatientSection {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite each field that `other` carries.
    pub fn absorb(&mut self, other: &PatientSection) {
        for (mine, theirs) in [
            (&mut self.uhid, &other.uhid),
            (&mut self.name, &other.name),
            (&mut self.birth_date, &other.birth_date),
            (&mut self.phone, &other.phone),
            (&mut self.email, &other.email),
            (&mut self.photo, &other.photo),
        ] {
            overwrite_if_present(mine, theirs);
        }
        if other.gender.is_some() {
            self.gender = other.gender;
        }
    }
}

/// Care-team identifiers by role.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Practitioners {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_doctor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_doctor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_staff: Option<String>,
}

impl Practitioners {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn absorb(&mut self, other: &Practitioners) {
        overwrite_if_present(&mut self.left_doctor, &other.left_doctor);
        overwrite_if_present(&mut self.right_doctor, &other.right_doctor);
        overwrite_if_present(&mut self.admin_staff, &other.admin_staff);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Inferred from the comment text, see [`fhir::labels::extract_comment`].
    pub activation_status: bool,
    pub activation_comment: String,
    pub recorded: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpRecord {
    pub follow_up_comment: String,
    pub recorded: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdProof {
    pub number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activation_records: Vec<ActivationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_records: Vec<FollowUpRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_current_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surgery_date_left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surgery_date_right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub id_proofs: BTreeMap<String, IdProof>,
}

impl MedicalSection {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn surgery_date(&self, side: Side) -> Option<&str> {
        match side {
            Side::Left => self.surgery_date_left.as_deref(),
            Side::Right => self.surgery_date_right.as_deref(),
        }
    }
}

/// One questionnaire instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PromEntry {
    /// Raw observation value, for example `Scores (6W): 40, 38 (Recorded at ...)`.
    pub score: String,
    pub completed: Option<bool>,
    #[serde(default)]
    pub other_notes: Vec<String>,
    /// End of the observation's effective period, empty when absent.
    #[serde(default)]
    pub deadline: String,
}

impl PromEntry {
    pub fn is_completed(&self) -> bool {
        self.completed == Some(true)
    }
}

/// Questionnaires for one knee, keyed by instrument then phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SideScores {
    #[serde(rename = "OKS", default)]
    pub oks: BTreeMap<Phase, PromEntry>,
    #[serde(rename = "SF12", default)]
    pub sf12: BTreeMap<Phase, PromEntry>,
    #[serde(rename = "FJS", default)]
    pub fjs: BTreeMap<Phase, PromEntry>,
    #[serde(rename = "KOOS_JR", default)]
    pub koos_jr: BTreeMap<Phase, PromEntry>,
    #[serde(rename = "KSS", default)]
    pub kss: BTreeMap<Phase, PromEntry>,
}

impl SideScores {
    pub fn instrument(&self, instrument: Instrument) -> &BTreeMap<Phase, PromEntry> {
        match instrument {
            Instrument::Oks => &self.oks,
            Instrument::Sf12 => &self.sf12,
            Instrument::Fjs => &self.fjs,
            Instrument::KoosJr => &self.koos_jr,
            Instrument::Kss => &self.kss,
        }
    }

    pub fn instrument_mut(&mut self, instrument: Instrument) -> &mut BTreeMap<Phase, PromEntry> {
        match instrument {
            Instrument::Oks => &mut self.oks,
            Instrument::Sf12 => &mut self.sf12,
            Instrument::Fjs => &mut self.fjs,
            Instrument::KoosJr => &mut self.koos_jr,
            Instrument::Kss => &mut self.kss,
        }
    }

    /// Every (instrument, phase) leaf, instruments in fixed order and phases chronologically.
    pub fn leaves(&self) -> impl Iterator<Item = (Instrument, Phase, &PromEntry)> + '_ {
        Instrument::ALL.into_iter().flat_map(move |instrument| {
            self.instrument(instrument)
                .iter()
                .map(move |(phase, entry)| (instrument, *phase, entry))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.leaves().next().is_none()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Everything recognised in one bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    #[serde(rename = "Patient", default)]
    pub patient: PatientSection,
    #[serde(rename = "Practitioners", default)]
    pub practitioners: Practitioners,
    #[serde(rename = "Appointments", default)]
    pub appointments: Vec<AppointmentSlot>,
    #[serde(rename = "VIP_Status", default)]
    pub vip_status: Option<bool>,
    #[serde(rename = "Medical", default)]
    pub medical: MedicalSection,
    #[serde(rename = "Medical_Left", default)]
    pub medical_left: SideScores,
    #[serde(rename = "Medical_Right", default)]
    pub medical_right: SideScores,

    /// Observations with an unknown code, or a questionnaire whose instrument or phase did not
    /// resolve.
    #[serde(skip)]
    pub unmatched_observations: usize,
}

impl ParsedRecord {
    pub fn side(&self, side: Side) -> &SideScores {
        match side {
            Side::Left => &self.medical_left,
            Side::Right => &self.medical_right,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideScores {
        match side {
            Side::Left => &mut self.medical_left,
            Side::Right => &mut self.medical_right,
        }
    }
}

/// A patient assembled from several collections. Empty sections are `None` and omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedPatient {
    pub uhid: String,
    #[serde(rename = "Patient", default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientSection>,
    #[serde(rename = "Practitioners", default, skip_serializing_if = "Option::is_none")]
    pub practitioners: Option<Practitioners>,
    #[serde(rename = "Appointments", default, skip_serializing_if = "Option::is_none")]
    pub appointments: Option<Vec<AppointmentSlot>>,
    #[serde(rename = "VIP_Status", default, skip_serializing_if = "Option::is_none")]
    pub vip_status: Option<bool>,
    #[serde(rename = "Medical", default, skip_serializing_if = "Option::is_none")]
    pub medical: Option<MedicalSection>,
    #[serde(rename = "Medical_Left", default, skip_serializing_if = "Option::is_none")]
    pub medical_left: Option<SideScores>,
    #[serde(rename = "Medical_Right", default, skip_serializing_if = "Option::is_none")]
    pub medical_right: Option<SideScores>,

    /// Sum of unmatched observations over every merged record.
    #[serde(skip)]
    pub unmatched_observations: usize,
}

impl MergedPatient {
    /// A single record with its empty sections removed.
    pub fn pruned(uhid: impl Into<String>, record: ParsedRecord) -> Self {
        Self {
            uhid: uhid.into(),
            patient: non_empty(record.patient, PatientSection::is_empty),
            practitioners: non_empty(record.practitioners, Practitioners::is_empty),
            appointments: non_empty(record.appointments, Vec::is_empty),
            vip_status: record.vip_status,
            medical: non_empty(record.medical, MedicalSection::is_empty),
            medical_left: non_empty(record.medical_left, SideScores::is_empty),
            medical_right: non_empty(record.medical_right, SideScores::is_empty),
            unmatched_observations: record.unmatched_observations,
        }
    }

    pub fn side(&self, side: Side) -> Option<&SideScores> {
        match side {
            Side::Left => self.medical_left.as_ref(),
            Side::Right => self.medical_right.as_ref(),
        }
    }
}

fn non_empty<T>(value: T, is_empty: impl Fn(&T) -> bool) -> Option<T> {
    (!is_empty(&value)).then_some(value)
}

/// `Some` and non-empty replaces; anything else leaves the target alone.
pub(crate) fn overwrite_if_present(target: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming.as_deref().filter(|v| !v.is_empty()) {
        *target = Some(value.to_owned());
    }
}
