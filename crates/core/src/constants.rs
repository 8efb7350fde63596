//! Constants used throughout the PROM core crate.

/// Default directory for bundle storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "prom_data";

/// Default merge precedence, earliest first. Later collections win scalar conflicts.
pub const DEFAULT_MERGE_ORDER: &str =
    "patient_contact,patient_base,patient_medical,medical_left,medical_right";

/// File extension for stored bundle documents.
pub const BUNDLE_FILE_EXTENSION: &str = "json";
