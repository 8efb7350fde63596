//! Named collections of the document store.
//!
//! Each patient may have one bundle in each collection. The collection a bundle came from
//! decides which questionnaire side its observations populate. Surgery details live in a
//! collection of their own and never take part in a merged patient view.

use crate::{PatientError, PatientResult};
use fhir::Side;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    PatientBase,
    PatientContact,
    PatientMedical,
    MedicalLeft,
    MedicalRight,
    SurgeryDetails,
}

/// Collections a full patient view is assembled from, in default merge precedence.
pub const PATIENT_VIEW_ORDER: [Collection; 5] = [
    Collection::PatientContact,
    Collection::PatientBase,
    Collection::PatientMedical,
    Collection::MedicalLeft,
    Collection::MedicalRight,
];

/// Collections a reminder view is assembled from.
pub const REMINDER_ORDER: [Collection; 4] = [
    Collection::PatientContact,
    Collection::PatientMedical,
    Collection::MedicalLeft,
    Collection::MedicalRight,
];

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::PatientBase,
        Collection::PatientContact,
        Collection::PatientMedical,
        Collection::MedicalLeft,
        Collection::MedicalRight,
        Collection::SurgeryDetails,
    ];

    /// Directory (and wire) name of the collection.
    pub fn dir_name(self) -> &'static str {
        match self {
            Collection::PatientBase => "patient_base",
            Collection::PatientContact => "patient_contact",
            Collection::PatientMedical => "patient_medical",
            Collection::MedicalLeft => "medical_left",
            Collection::MedicalRight => "medical_right",
            Collection::SurgeryDetails => "patient_surgery_details",
        }
    }

    /// Questionnaire side the collection holds, if it is a side collection.
    pub fn side(self) -> Option<Side> {
        match self {
            Collection::MedicalLeft => Some(Side::Left),
            Collection::MedicalRight => Some(Side::Right),
            _ => None,
        }
    }

    /// Side collection for a knee.
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Left => Collection::MedicalLeft,
            Side::Right => Collection::MedicalRight,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Collection {
    type Err = PatientError;

    fn from_str(s: &str) -> PatientResult<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.dir_name() == name)
            .ok_or_else(|| PatientError::InvalidInput(format!("unknown collection: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(collection.dir_name().parse::<Collection>().unwrap(), collection);
        }
    }

    #[test]
    fn unknown_name_is_invalid_input() {
        let err = "patients".parse::<Collection>().unwrap_err();
        assert!(matches!(err, PatientError::InvalidInput(_)));
    }

    #[test]
    fn only_side_collections_have_a_side() {
        assert_eq!(Collection::MedicalRight.side(), Some(Side::Right));
        assert_eq!(Collection::PatientMedical.side(), None);
        assert_eq!(Collection::for_side(Side::Left), Collection::MedicalLeft);
        assert_eq!(Collection::SurgeryDetails.side(), None);
    }

    #[test]
    fn surgery_details_stay_out_of_views() {
        assert!(!PATIENT_VIEW_ORDER.contains(&Collection::SurgeryDetails));
        assert!(!REMINDER_ORDER.contains(&Collection::SurgeryDetails));
        assert_eq!(
            "patient_surgery_details".parse::<Collection>().unwrap(),
            Collection::SurgeryDetails
        );
    }
}
