//! Combine per-collection records into one [`MergedPatient`].
//!
//! The slice order passed to [`merge`] is the precedence. Policies per section:
//!
//! - `Patient`, `Practitioners` and scalar `Medical` fields: last non-empty value wins
//! - `Appointments`: union without structural duplicates
//! - `VIP_Status`: first non-null value wins
//! - `activation_records`: union keyed by `recorded`, first occurrence kept
//! - `follow_up_records`, `id_proofs`: last non-empty collection wins
//! - `Medical_Left` / `Medical_Right`: per (instrument, phase), an entry with a score or a
//!   completed flag replaces what is there
//!
//! Sections that end up empty are `None`.

use crate::collection::Collection;
use crate::record::{
    overwrite_if_present, MedicalSection, MergedPatient, ParsedRecord, SideScores,
};
use fhir::Instrument;
use std::collections::HashSet;

/// Merge records in precedence order (earliest first).
pub fn merge(uhid: &str, records: &[(Collection, ParsedRecord)]) -> MergedPatient {
    let mut acc = ParsedRecord::default();
    let mut seen_recorded: HashSet<Option<String>> = HashSet::new();

    for (_, record) in records {
        acc.patient.absorb(&record.patient);
        acc.practitioners.absorb(&record.practitioners);

        for slot in &record.appointments {
            if !acc.appointments.contains(slot) {
                acc.appointments.push(slot.clone());
            }
        }

        if acc.vip_status.is_none() {
            acc.vip_status = record.vip_status;
        }

        merge_medical(&mut acc.medical, &record.medical, &mut seen_recorded);
        merge_scores(&mut acc.medical_left, &record.medical_left);
        merge_scores(&mut acc.medical_right, &record.medical_right);

        acc.unmatched_observations += record.unmatched_observations;
    }

    MergedPatient::pruned(uhid, acc)
}

fn merge_medical(
    acc: &mut MedicalSection,
    incoming: &MedicalSection,
    seen_recorded: &mut HashSet<Option<String>>,
) {
    for (mine, theirs) in [
        (&mut acc.blood_group, &incoming.blood_group),
        (&mut acc.height, &incoming.height),
        (&mut acc.weight, &incoming.weight),
        (&mut acc.patient_current_status, &incoming.patient_current_status),
        (&mut acc.surgery_date_left, &incoming.surgery_date_left),
        (&mut acc.surgery_date_right, &incoming.surgery_date_right),
        (&mut acc.funding_source, &incoming.funding_source),
    ] {
        overwrite_if_present(mine, theirs);
    }

    for record in &incoming.activation_records {
        if seen_recorded.insert(record.recorded.clone()) {
            acc.activation_records.push(record.clone());
        }
    }

    if !incoming.follow_up_records.is_empty() {
        acc.follow_up_records = incoming.follow_up_records.clone();
    }
    if !incoming.id_proofs.is_empty() {
        acc.id_proofs = incoming.id_proofs.clone();
    }
}

fn merge_scores(acc: &mut SideScores, incoming: &SideScores) {
    for instrument in Instrument::ALL {
        let target = acc.instrument_mut(instrument);
        for (phase, entry) in incoming.instrument(instrument) {
            if !entry.score.is_empty() || entry.is_completed() {
                target.insert(*phase, entry.clone());
            }
        }
    }
}
