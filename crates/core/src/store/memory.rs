use super::{DocumentStore, StoredBundle};
use crate::collection::Collection;
use crate::{PatientError, PatientResult};
use fhir::Bundle;
use prom_uuid::{BundleId, BundleIdGenerator};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process bundle store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<StoredBundle>>>,
    ids: BundleIdGenerator,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn scan(&self, collection: Collection) -> PatientResult<Vec<StoredBundle>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| PatientError::LockPoisoned)?;
        Ok(collections.get(&collection).cloned().unwrap_or_default())
    }

    fn insert(&self, collection: Collection, bundle: &Bundle) -> PatientResult<BundleId> {
        let id = self.ids.next_id();
        let mut collections = self
            .collections
            .write()
            .map_err(|_| PatientError::LockPoisoned)?;
        collections.entry(collection).or_default().push(StoredBundle {
            id: id.clone(),
            bundle: bundle.clone(),
        });
        Ok(id)
    }

    fn replace(
        &self,
        collection: Collection,
        id: &BundleId,
        bundle: &Bundle,
    ) -> PatientResult<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| PatientError::LockPoisoned)?;
        let stored = collections
            .get_mut(&collection)
            .and_then(|bundles| bundles.iter_mut().find(|b| &b.id == id))
            .ok_or_else(|| PatientError::NotFound(format!("bundle {id} in {collection}")))?;
        stored.bundle = bundle.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_returns_insertion_order() {
        let store = MemoryStore::new();
        let mut first = Bundle::collection();
        first.id = Some("first".into());
        let mut second = Bundle::collection();
        second.id = Some("second".into());

        store.insert(Collection::PatientBase, &first).unwrap();
        store.insert(Collection::PatientBase, &second).unwrap();

        let ids: Vec<_> = store
            .scan(Collection::PatientBase)
            .unwrap()
            .into_iter()
            .filter_map(|s| s.bundle.id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(store.scan(Collection::MedicalLeft).unwrap().is_empty());
    }

    #[test]
    fn replace_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let id = BundleIdGenerator::new().next_id();
        let err = store
            .replace(Collection::PatientBase, &id, &Bundle::collection())
            .unwrap_err();
        assert!(matches!(err, PatientError::NotFound(_)));
    }
}
