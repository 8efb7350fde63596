//! Bundle persistence.
//!
//! The core reads and writes bundles only through [`DocumentStore`]. Two implementations are
//! provided:
//!
//! - [`JsonFileStore`]: one pretty-printed JSON file per bundle under
//!   `<data_dir>/<collection>/<bundle_id>.json`
//! - [`MemoryStore`]: an in-process store for tests and ephemeral runs
//!
//! Stores give no concurrency control across a read-modify-write. Two writers replacing the
//! same bundle concurrently can lose one of the updates.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::collection::Collection;
use crate::PatientResult;
use fhir::Bundle;
use prom_uuid::BundleId;

/// A bundle together with the id it is stored under.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredBundle {
    pub id: BundleId,
    pub bundle: Bundle,
}

/// Access to the named bundle collections.
pub trait DocumentStore: Send + Sync {
    /// Every readable bundle in `collection`, in insertion order.
    ///
    /// A collection that has never been written to is empty, not an error.
    fn scan(&self, collection: Collection) -> PatientResult<Vec<StoredBundle>>;

    /// Store a new bundle and return its id.
    fn insert(&self, collection: Collection, bundle: &Bundle) -> PatientResult<BundleId>;

    /// Overwrite an existing bundle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PatientError::NotFound`] if no bundle has this id.
    fn replace(&self, collection: Collection, id: &BundleId, bundle: &Bundle)
        -> PatientResult<()>;
}
