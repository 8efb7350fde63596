//! # API Shared
//!
//! Shared utilities and definitions for PROM APIs.
//!
//! Contains:
//! - Request bodies ([`requests`]) and their validated conversion into core data
//! - Response bodies ([`responses`])
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` for common functionality.

pub mod health;
pub mod requests;
pub mod responses;

pub use health::HealthService;
pub use requests::*;
pub use responses::*;

/// A request body that passed JSON decoding but not validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {source}")]
    Text {
        field: &'static str,
        #[source]
        source: prom_types::TextError,
    },

    #[error("{field}: unrecognised value {value:?}")]
    Unrecognised { field: &'static str, value: String },

    #[error("{field}: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
