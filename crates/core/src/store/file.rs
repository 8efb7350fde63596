use super::{DocumentStore, StoredBundle};
use crate::collection::Collection;
use crate::constants::BUNDLE_FILE_EXTENSION;
use crate::{PatientError, PatientResult};
use fhir::Bundle;
use prom_uuid::{BundleId, BundleIdGenerator};
use std::fs;
use std::path::{Path, PathBuf};

/// Bundle store backed by one JSON file per bundle.
///
/// ```text
/// <data_dir>/
///   patient_base/
///     20250301T093000.123Z-<32hex>.json
///   patient_contact/
///   ...
/// ```
///
/// File names start with the insertion time, so sorting by [`BundleId`] yields insertion order.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    ids: BundleIdGenerator,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ids: BundleIdGenerator::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.dir_name())
    }

    fn bundle_path(&self, collection: Collection, id: &BundleId) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{id}.{BUNDLE_FILE_EXTENSION}"))
    }

    fn write_bundle(path: &Path, bundle: &Bundle) -> PatientResult<()> {
        let json = serde_json::to_string_pretty(bundle).map_err(PatientError::Serialization)?;
        fs::write(path, json).map_err(PatientError::FileWrite)
    }
}

impl DocumentStore for JsonFileStore {
    fn scan(&self, collection: Collection) -> PatientResult<Vec<StoredBundle>> {
        let dir = self.collection_dir(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(it) => it,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PatientError::FileRead(err)),
        };

        let mut files: Vec<(BundleId, PathBuf)> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(BUNDLE_FILE_EXTENSION)
            })
            .filter_map(|path| {
                let id = path.file_stem()?.to_str()?.parse::<BundleId>().ok()?;
                Some((id, path))
            })
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut bundles = Vec::with_capacity(files.len());
        for (id, path) in files {
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    tracing::warn!("failed to read bundle {}: {err}", path.display());
                    continue;
                }
            };
            match Bundle::from_json_str(&contents) {
                Ok(bundle) => bundles.push(StoredBundle { id, bundle }),
                Err(err) => tracing::warn!("skipping malformed bundle {}: {err}", path.display()),
            }
        }

        Ok(bundles)
    }

    fn insert(&self, collection: Collection, bundle: &Bundle) -> PatientResult<BundleId> {
        fs::create_dir_all(self.collection_dir(collection))
            .map_err(PatientError::StorageDirCreation)?;

        let id = self.ids.next_id();
        Self::write_bundle(&self.bundle_path(collection, &id), bundle)?;
        tracing::debug!(%collection, bundle_id = %id, "stored bundle");
        Ok(id)
    }

    fn replace(
        &self,
        collection: Collection,
        id: &BundleId,
        bundle: &Bundle,
    ) -> PatientResult<()> {
        let path = self.bundle_path(collection, id);
        if !path.is_file() {
            return Err(PatientError::NotFound(format!(
                "bundle {id} in {collection}"
            )));
        }
        Self::write_bundle(&path, bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn named(id: &str) -> Bundle {
        let mut bundle = Bundle::collection();
        bundle.id = Some(id.into());
        bundle
    }

    #[test]
    fn test_scan_of_missing_collection_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path());
        assert!(store.scan(Collection::PatientBase).unwrap().is_empty());
    }

    #[test]
    fn test_insert_then_scan_preserves_order() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path());

        for name in ["a", "b", "c"] {
            store.insert(Collection::PatientContact, &named(name)).unwrap();
        }

        let ids: Vec<_> = store
            .scan(Collection::PatientContact)
            .unwrap()
            .into_iter()
            .filter_map(|s| s.bundle.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_skips_malformed_and_foreign_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path());
        store.insert(Collection::MedicalLeft, &named("good")).unwrap();

        let dir = temp_dir.path().join("medical_left");
        fs::write(
            dir.join("20250101T000000.000Z-0123456789abcdef0123456789abcdef.json"),
            "{ not json",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        fs::write(dir.join("not-an-id.json"), "{}").unwrap();

        let bundles = store.scan(Collection::MedicalLeft).unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].bundle.id.as_deref(), Some("good"));
    }

    #[test]
    fn test_replace_overwrites_in_place() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path());
        let id = store.insert(Collection::PatientMedical, &named("v1")).unwrap();

        store
            .replace(Collection::PatientMedical, &id, &named("v2"))
            .unwrap();

        let bundles = store.scan(Collection::PatientMedical).unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id, id);
        assert_eq!(bundles[0].bundle.id.as_deref(), Some("v2"));
    }

    #[test]
    fn test_replace_missing_bundle_is_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path());
        let id = BundleIdGenerator::new().next_id();
        let err = store
            .replace(Collection::PatientMedical, &id, &named("x"))
            .unwrap_err();
        assert!(matches!(err, PatientError::NotFound(_)));
    }
}
