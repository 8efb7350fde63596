//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables.

use crate::collection::{Collection, PATIENT_VIEW_ORDER};
use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_MERGE_ORDER};
use crate::{PatientError, PatientResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    merge_order: Vec<Collection>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if `merge_order` is empty, names a collection
    /// twice or names one that holds no patient records.
    pub fn new(data_dir: PathBuf, merge_order: Vec<Collection>) -> PatientResult<Self> {
        if merge_order.is_empty() {
            return Err(PatientError::InvalidInput(
                "merge order cannot be empty".into(),
            ));
        }

        if let Some(other) = merge_order.iter().find(|c| !PATIENT_VIEW_ORDER.contains(c)) {
            return Err(PatientError::InvalidInput(format!(
                "{other} does not hold patient records"
            )));
        }

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = merge_order.iter().find(|c| !seen.insert(**c)) {
            return Err(PatientError::InvalidInput(format!(
                "merge order lists {duplicate} more than once"
            )));
        }

        Ok(Self {
            data_dir,
            merge_order,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Collections in merge precedence, earliest first.
    pub fn merge_order(&self) -> &[Collection] {
        &self.merge_order
    }
}

/// Resolve the data directory from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parse a comma-separated merge order from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default order.
///
/// # Errors
///
/// Returns [`PatientError::InvalidInput`] if a name is not a known collection.
pub fn merge_order_from_env_value(value: Option<String>) -> PatientResult<Vec<Collection>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MERGE_ORDER.to_string());

    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse::<Collection>)
        .collect()
}
