//! Free-text label translation.
//!
//! Stored documents encode most of their meaning in free text: observation code labels,
//! practitioner narratives, phase markers inside value strings, and comments wrapped in XHTML.
//! This module is the single place where that text is inspected. Each concept has one
//! translation function that yields a closed enum, so parsing and merging never branch on raw
//! strings.
//!
//! The substring rules are a compatibility layer for existing documents. They are ambiguous by
//! construction (a value containing two phase markers resolves to whichever comes first in the
//! priority list) and that ambiguity is preserved rather than reported.

use serde::{Deserialize, Serialize};

/// Identifier system for hospital UHIDs.
pub const UHID_SYSTEM: &str = "http://hospital.smarthealth.org/uhid";

/// Component label carrying a questionnaire's completion flag.
pub const COMPLETION_STATUS_LABEL: &str = "Completion Status";

/// Narrative marker preceding a patient identifier in questionnaire bundles.
pub const PATIENT_ID_MARKER: &str = "Patient ID:";

const XHTML_OPEN_SINGLE: &str = "<div xmlns='http://www.w3.org/1999/xhtml'>";
const XHTML_OPEN_DOUBLE: &str = "<div xmlns=\"http://www.w3.org/1999/xhtml\">";
const XHTML_CLOSE: &str = "</div>";
const COMMENT_MARKER: &str = "Comment:";
const FOLLOW_UP_PREFIX: &str = "Follow-up Comment:";
const ACTIVATION_PREFIX: &str = "Activation -";

// ============================================================================
// Side
// ============================================================================

/// Which knee a record or questionnaire belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// Parse `left` / `right`, ignoring case and surrounding whitespace.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }

    pub fn to_wire(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Capitalised form used in section names (`Medical_Left`).
    pub fn title(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_wire())
    }
}

// ============================================================================
// Gender
// ============================================================================

/// Administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn to_wire(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }

    /// Parse a stored gender. Unrecognised text yields `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            "unknown" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

// ============================================================================
// Questionnaire instruments and phases
// ============================================================================

/// Code labels recognised as questionnaire instruments. Includes both the labels older
/// documents were written with and the labels the assignment workflow writes.
pub const PROM_CODE_LABELS: [&str; 7] = [
    "Oxford Knee Score (OKS)",
    "12-Item Short Form Survey (SF-12)",
    "Short Form - 12 (SF-12)",
    "Forgotten Joint Score (FJS)",
    "Knee injury and Osteoarthritis Outcome Score, JR (KOOS JR)",
    "Knee Injury and Osteoarthritis Outcome Score, Joint Replacement (KOOS, JR)",
    "Knee Society Score (KSS)",
];

/// Patient-reported outcome questionnaire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "OKS")]
    Oks,
    #[serde(rename = "SF12")]
    Sf12,
    #[serde(rename = "FJS")]
    Fjs,
    #[serde(rename = "KOOS_JR")]
    KoosJr,
    #[serde(rename = "KSS")]
    Kss,
}

impl Instrument {
    pub const ALL: [Instrument; 5] = [
        Instrument::Oks,
        Instrument::Sf12,
        Instrument::Fjs,
        Instrument::KoosJr,
        Instrument::Kss,
    ];

    /// Section key (`OKS`, `SF12`, `FJS`, `KOOS_JR`, `KSS`).
    pub fn key(self) -> &'static str {
        match self {
            Instrument::Oks => "OKS",
            Instrument::Sf12 => "SF12",
            Instrument::Fjs => "FJS",
            Instrument::KoosJr => "KOOS_JR",
            Instrument::Kss => "KSS",
        }
    }

    fn label_fragment(self) -> &'static str {
        match self {
            Instrument::Oks => "Oxford",
            Instrument::Sf12 => "SF-12",
            Instrument::Fjs => "Forgotten Joint",
            Instrument::KoosJr => "KOOS",
            Instrument::Kss => "Knee Society",
        }
    }

    /// Resolve the instrument named by a questionnaire code label. First fragment match wins.
    pub fn from_code_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|i| label.contains(i.label_fragment()))
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Questionnaire time window relative to surgery. Ordered chronologically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "Pre_Op")]
    PreOp,
    #[serde(rename = "6W")]
    SixWeeks,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "2Y")]
    TwoYears,
}

impl Phase {
    /// Priority order used when matching value text.
    pub const ALL: [Phase; 6] = [
        Phase::PreOp,
        Phase::SixWeeks,
        Phase::ThreeMonths,
        Phase::SixMonths,
        Phase::OneYear,
        Phase::TwoYears,
    ];

    /// Section key (`Pre_Op`, `6W`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Phase::PreOp => "Pre_Op",
            Phase::SixWeeks => "6W",
            Phase::ThreeMonths => "3M",
            Phase::SixMonths => "6M",
            Phase::OneYear => "1Y",
            Phase::TwoYears => "2Y",
        }
    }

    /// Text written into observation values (`Scores (Pre Op)`).
    pub fn marker(self) -> &'static str {
        match self {
            Phase::PreOp => "Pre Op",
            other => other.key(),
        }
    }

    /// Phase named inside an observation value. First marker in priority order wins.
    pub fn from_value_text(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| text.contains(p.marker()))
    }

    /// Phase named by an assignment period (`Pre Op`, `Pre_Op`, `6W`, ...), ignoring case.
    pub fn from_period(period: &str) -> Option<Self> {
        let period = period.trim();
        Self::ALL.into_iter().find(|p| {
            p.marker().eq_ignore_ascii_case(period) || p.key().eq_ignore_ascii_case(period)
        })
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Observation codes
// ============================================================================

/// Meaning of an observation, decided by its exact code label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationCode {
    VipStatus,
    BloodGroup,
    Height,
    Weight,
    ActivationStatus,
    CurrentStatus,
    SurgeryDate(Side),
    Prom(Instrument),
}

impl ObservationCode {
    /// Classify a code label. Unknown labels yield `None`.
    pub fn classify(label: &str) -> Option<Self> {
        let code = match label {
            "VIP Status" => ObservationCode::VipStatus,
            "Blood Group" => ObservationCode::BloodGroup,
            "Height" => ObservationCode::Height,
            "Weight" => ObservationCode::Weight,
            "Activation Status" => ObservationCode::ActivationStatus,
            "Patient Current Status" => ObservationCode::CurrentStatus,
            "Surgery Date Left" => ObservationCode::SurgeryDate(Side::Left),
            "Surgery Date Right" => ObservationCode::SurgeryDate(Side::Right),
            prom if PROM_CODE_LABELS.contains(&prom) => {
                ObservationCode::Prom(Instrument::from_code_label(prom)?)
            }
            _ => return None,
        };
        Some(code)
    }

    /// Label written by producers for this code.
    pub fn label(self) -> &'static str {
        match self {
            ObservationCode::VipStatus => "VIP Status",
            ObservationCode::BloodGroup => "Blood Group",
            ObservationCode::Height => "Height",
            ObservationCode::Weight => "Weight",
            ObservationCode::ActivationStatus => "Activation Status",
            ObservationCode::CurrentStatus => "Patient Current Status",
            ObservationCode::SurgeryDate(Side::Left) => "Surgery Date Left",
            ObservationCode::SurgeryDate(Side::Right) => "Surgery Date Right",
            ObservationCode::Prom(Instrument::Oks) => "Oxford Knee Score (OKS)",
            ObservationCode::Prom(Instrument::Sf12) => "Short Form - 12 (SF-12)",
            ObservationCode::Prom(Instrument::Fjs) => "Forgotten Joint Score (FJS)",
            ObservationCode::Prom(Instrument::KoosJr) => {
                "Knee Injury and Osteoarthritis Outcome Score, Joint Replacement (KOOS, JR)"
            }
            ObservationCode::Prom(Instrument::Kss) => "Knee Society Score (KSS)",
        }
    }
}

// ============================================================================
// Practitioner roles and provenance activities
// ============================================================================

/// Role a practitioner plays for a patient, encoded in the practitioner narrative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PractitionerRole {
    LeftDoctor,
    RightDoctor,
    AdminStaff,
}

impl PractitionerRole {
    pub const ALL: [PractitionerRole; 3] = [
        PractitionerRole::LeftDoctor,
        PractitionerRole::RightDoctor,
        PractitionerRole::AdminStaff,
    ];

    pub fn narrative_label(self) -> &'static str {
        match self {
            PractitionerRole::LeftDoctor => "Left Doctor",
            PractitionerRole::RightDoctor => "Right Doctor",
            PractitionerRole::AdminStaff => "Admin Staff",
        }
    }

    /// Role named in a narrative. Checked in declaration order; first match wins.
    pub fn from_narrative(div: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| div.contains(r.narrative_label()))
    }
}

/// Kind of comment a provenance entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvenanceActivity {
    ActivationComment,
    FollowUpComment,
}

impl ProvenanceActivity {
    pub fn label(self) -> &'static str {
        match self {
            ProvenanceActivity::ActivationComment => "Activation Comment",
            ProvenanceActivity::FollowUpComment => "Patient Follow-up Comment",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Activation Comment" => Some(ProvenanceActivity::ActivationComment),
            "Patient Follow-up Comment" => Some(ProvenanceActivity::FollowUpComment),
            _ => None,
        }
    }

    /// Prefix producers put in front of the comment inside the narrative.
    pub fn narrative_prefix(self) -> &'static str {
        match self {
            ProvenanceActivity::ActivationComment => COMMENT_MARKER,
            ProvenanceActivity::FollowUpComment => FOLLOW_UP_PREFIX,
        }
    }
}

// ============================================================================
// Narrative helpers
// ============================================================================

/// Comment text recovered from a provenance narrative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedComment {
    pub text: String,
    /// Whether the comment mentions "activation" (any case). Heuristic: a comment such as
    /// "deactivation requested" also sets it.
    pub mentions_activation: bool,
}

/// Recover a comment from a provenance narrative.
///
/// Only narratives containing `Comment:` yield text; others give an empty comment. The XHTML
/// wrapper and the activity's prefix are removed, then `Activation -` is removed after the
/// activation check.
pub fn extract_comment(div: &str, activity: ProvenanceActivity) -> ExtractedComment {
    let mut text = String::new();
    if div.contains(COMMENT_MARKER) {
        text = div
            .replace(XHTML_OPEN_SINGLE, "")
            .replace(XHTML_OPEN_DOUBLE, "")
            .replace(XHTML_CLOSE, "")
            .replace(activity.narrative_prefix(), "")
            .trim()
            .to_owned();
    }
    let mentions_activation = text.to_lowercase().contains("activation");
    let text = text.replace(ACTIVATION_PREFIX, "").trim().to_owned();
    ExtractedComment {
        text,
        mentions_activation,
    }
}

/// Patient identifier written after `Patient ID:` in a narrative, up to the next tag.
pub fn patient_id_from_narrative(div: &str) -> Option<String> {
    if !div.contains(PATIENT_ID_MARKER) {
        return None;
    }
    let tail = div.rsplit(PATIENT_ID_MARKER).next()?;
    let id = tail.split('<').next().unwrap_or_default().trim();
    (!id.is_empty()).then(|| id.to_owned())
}

/// Case-insensitive substring test used for narrative matching.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Wrap text in the single-quoted XHTML div used by registration bundles.
pub fn xhtml_div(inner: &str) -> String {
    format!("{XHTML_OPEN_SINGLE}{inner}{XHTML_CLOSE}")
}

/// Wrap text in a paragraph inside the double-quoted XHTML div used by questionnaire bundles.
pub fn xhtml_paragraph(inner: &str) -> String {
    format!("{XHTML_OPEN_DOUBLE}<p>{inner}</p>{XHTML_CLOSE}")
}
