//! Derived metrics: questionnaire completion and post-operative phase.

use crate::record::SideScores;
use chrono::NaiveDate;
use serde::{Serialize, Serializer};

/// Literal used wherever a metric cannot be computed.
pub const NOT_APPLICABLE: &str = "NA";

/// Day thresholds and the milestone each one unlocks.
const MILESTONES: [(i64, &str); 5] = [
    (42, "6W"),
    (90, "3M"),
    (180, "6M"),
    (365, "1Y"),
    (730, "2Y"),
];

/// Reported when surgery has happened but no milestone has been reached yet.
const BEFORE_FIRST_MILESTONE: &str = "+6W";
const PRE_OP: &str = "Pre Op";

// ============================================================================
// Completion
// ============================================================================

/// Completion percentage, or `"NA"` when there are no questionnaires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompletionPercentage {
    Percent(f64),
    NotApplicable,
}

impl Serialize for CompletionPercentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompletionPercentage::Percent(value) => serializer.serialize_f64(*value),
            CompletionPercentage::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Completion {
    pub percentage: CompletionPercentage,
    pub completed: usize,
    pub pending: usize,
}

/// Completion over every (instrument, phase) leaf of one side.
pub fn completion(scores: &SideScores) -> Completion {
    let (total, completed) = scores
        .leaves()
        .fold((0usize, 0usize), |(total, done), (_, _, entry)| {
            (total + 1, done + usize::from(entry.is_completed()))
        });

    let percentage = if total == 0 {
        CompletionPercentage::NotApplicable
    } else {
        let raw = completed as f64 * 100.0 / total as f64;
        CompletionPercentage::Percent((raw * 100.0).round() / 100.0)
    };

    Completion {
        percentage,
        completed,
        pending: total - completed,
    }
}

// ============================================================================
// Post-operative phase
// ============================================================================

/// Where a patient is relative to surgery on one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostOpStatus {
    /// No surgery date, or one that does not parse.
    NotApplicable,
    /// Surgery is scheduled after today.
    PreOp,
    /// Milestones reached, or `["+6W"]` before the first one.
    Milestones(Vec<&'static str>),
}

impl Serialize for PostOpStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PostOpStatus::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
            PostOpStatus::PreOp => serializer.serialize_str(PRE_OP),
            PostOpStatus::Milestones(tags) => tags.serialize(serializer),
        }
    }
}

/// Phase status for a `YYYY-MM-DD` surgery date as of `today`.
pub fn post_op_phase(surgery_date: Option<&str>, today: NaiveDate) -> PostOpStatus {
    let Some(surgery) =
        surgery_date.and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    else {
        return PostOpStatus::NotApplicable;
    };

    if surgery > today {
        return PostOpStatus::PreOp;
    }

    let days = (today - surgery).num_days();
    let reached: Vec<&'static str> = MILESTONES
        .iter()
        .filter(|(threshold, _)| days >= *threshold)
        .map(|(_, tag)| *tag)
        .collect();

    if reached.is_empty() {
        PostOpStatus::Milestones(vec![BEFORE_FIRST_MILESTONE])
    } else {
        PostOpStatus::Milestones(reached)
    }
}
