//! Find the bundles that belong to a patient or staff member.
//!
//! Matching mirrors how identifiers are laid out in stored bundles: a UHID may sit in an
//! identifier value, be the resource id itself, or only appear inside narrative XHTML. All
//! three places are tried.

use crate::collection::Collection;
use crate::store::{DocumentStore, StoredBundle};
use crate::PatientResult;
use fhir::labels::{contains_ignore_case, patient_id_from_narrative};
use fhir::{Bundle, Entry, FhirResource, Patient, Practitioner};

/// Predicate over a stored bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleQuery<'a> {
    /// Any entry with an identifier value or resource id equal to the UHID, or a narrative
    /// containing it (case-insensitive).
    Patient(&'a str),
    /// Any entry whose resource id equals the value.
    ResourceId(&'a str),
    /// Any entry carrying an identifier with exactly this value.
    Identifier(&'a str),
    /// A Patient entry identified by exactly this UHID: an identifier value, the resource id,
    /// or a `Patient ID:` narrative (ignoring case). Writes use this so that `MH1` never
    /// selects the bundle of `MH10`.
    PatientId(&'a str),
    /// A Practitioner entry identified by the staff UHID.
    StaffMember(&'a str),
}

impl BundleQuery<'_> {
    pub fn matches(&self, bundle: &Bundle) -> bool {
        bundle.is_bundle() && bundle.entry.iter().any(|entry| self.matches_entry(entry))
    }

    fn matches_entry(&self, entry: &Entry) -> bool {
        match *self {
            BundleQuery::Patient(uhid) => {
                entry.identifier_values().any(|v| v == uhid)
                    || entry.resource_id() == Some(uhid)
                    || entry
                        .narrative_div()
                        .is_some_and(|div| contains_ignore_case(div, uhid))
            }
            BundleQuery::ResourceId(id) => entry.resource_id() == Some(id),
            BundleQuery::Identifier(value) => entry.identifier_values().any(|v| v == value),
            BundleQuery::PatientId(uhid) => {
                entry.resource_type() == Some(Patient::RESOURCE_TYPE)
                    && (entry.identifier_values().any(|v| v == uhid)
                        || entry.resource_id() == Some(uhid)
                        || entry
                            .narrative_div()
                            .and_then(patient_id_from_narrative)
                            .is_some_and(|id| id.eq_ignore_ascii_case(uhid)))
            }
            BundleQuery::StaffMember(uhid) => {
                entry.resource_type() == Some(Practitioner::RESOURCE_TYPE)
                    && entry.identifier_values().any(|v| v == uhid)
            }
        }
    }
}

/// First bundle in `collection` (insertion order) matching `query`.
pub fn find_one(
    store: &dyn DocumentStore,
    collection: Collection,
    query: BundleQuery<'_>,
) -> PatientResult<Option<StoredBundle>> {
    Ok(store
        .scan(collection)?
        .into_iter()
        .find(|stored| query.matches(&stored.bundle)))
}

/// Every bundle in `collection` matching `query`, in insertion order.
pub fn find_all(
    store: &dyn DocumentStore,
    collection: Collection,
    query: BundleQuery<'_>,
) -> PatientResult<Vec<StoredBundle>> {
    Ok(store
        .scan(collection)?
        .into_iter()
        .filter(|stored| query.matches(&stored.bundle))
        .collect())
}

/// The first bundle per collection that mentions `uhid`, in `order`. Collections without a
/// match are left out.
pub fn locate(
    store: &dyn DocumentStore,
    uhid: &str,
    order: &[Collection],
) -> PatientResult<Vec<(Collection, StoredBundle)>> {
    let mut found = Vec::with_capacity(order.len());
    for &collection in order {
        if let Some(stored) = find_one(store, collection, BundleQuery::Patient(uhid))? {
            found.push((collection, stored));
        }
    }
    Ok(found)
}

/// UHID of the patient a contact bundle describes: the value of the first Patient identifier
/// whose system mentions `uhid`.
pub fn contact_patient_uhid(bundle: &Bundle) -> Option<String> {
    bundle
        .entry
        .iter()
        .filter(|entry| entry.resource_type() == Some(Patient::RESOURCE_TYPE))
        .filter_map(|entry| entry.decode())
        .find_map(|resource| match resource {
            fhir::Resource::Patient(patient) => patient
                .identifier
                .into_iter()
                .find(|i| {
                    i.system
                        .as_deref()
                        .is_some_and(|s| contains_ignore_case(s, "uhid"))
                })
                .and_then(|i| i.value),
            _ => None,
        })
}
