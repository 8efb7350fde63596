//! Response bodies for the write endpoints and health check.
//!
//! Read endpoints return the core view types directly, wrapped by the API surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// A plain confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct MessageRes {
    pub message: String,
}

impl MessageRes {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct CreatePatientRes {
    pub message: String,
    pub patient_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct StatusRes {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uhid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct FullRegistrationRes {
    pub message: String,
    pub uhid: String,
}

/// Outcome of one entry in a bulk assignment.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct BulkAssignmentResult {
    pub uhid: String,
    pub name: String,
    pub period: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct BulkAssignmentRes {
    pub results: Vec<BulkAssignmentResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ResetQuestionnairesRes {
    pub status: String,
    pub modified_count: usize,
    pub reset_period: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct UpdatePatientRes {
    pub message: String,
    pub updated_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct SurgeryStoredRes {
    pub inserted_id: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct SurgeryFieldUpdatedRes {
    pub detail: String,
    pub uhid: String,
    pub updated_field: Option<String>,
}
