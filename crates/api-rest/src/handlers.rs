//! HTTP handlers.
//!
//! Every handler validates its body with the `api-shared` conversions, calls one core service
//! and shapes the result. Services are synchronous and called directly.

use crate::{reject, AppState};
use api_shared::{
    BulkAssignmentRes, BulkAssignmentResult, CreatePatientRes, FollowUpCommentReq,
    FullRegistrationRes, HealthRes, HealthService, MessageRes, PatientBaseReq, PatientContactReq,
    PatientFullReq, PatientMedicalReq, QuestionnaireAssignmentReq, QuestionnairePeriodReq,
    PatientUpdateReq, QuestionnaireScoreReq, ResetQuestionnairesRes, StatusRes,
    SurgeryDetailsReq, SurgeryFieldUpdateReq, SurgeryFieldUpdatedRes, SurgeryStoredRes,
    UpdatePatientRes, ValidAssignment, ValidScore, ValidationError,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use fhir::{Bundle, PatientBaseData, PatientContactData, PatientMedicalData, SurgeryDetailsData};
use prom_core::{
    AssignmentOutcome, AssignmentRequest, DoctorPatientSides, PatientUpdate, PatientView,
    ReminderView, StaffPatientSummary,
};
use prom_types::Uhid;
use serde::Serialize;

type HandlerResult<T> = Result<Json<T>, (StatusCode, &'static str)>;

fn invalid(err: ValidationError) -> (StatusCode, &'static str) {
    tracing::warn!("request rejected: {err}");
    (StatusCode::BAD_REQUEST, "Invalid request body")
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ============================================================================
// Reads
// ============================================================================

#[derive(Serialize)]
pub struct PatientRes {
    pub patient: PatientView,
}

#[derive(Serialize)]
pub struct StaffPatientsRes {
    pub admin_uhid: String,
    pub patients: Vec<StaffPatientSummary>,
}

#[derive(Serialize)]
pub struct ReminderRes {
    pub patient: ReminderView,
}

#[derive(Serialize)]
pub struct DoctorPatientsRes {
    pub patients: Vec<DoctorPatientSides>,
}

#[derive(Serialize)]
pub struct StoredSurgeryDetails {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub bundle: Bundle,
}

#[derive(Serialize)]
pub struct SurgeryDetailsRes {
    pub patients: Vec<StoredSurgeryDetails>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthRes)
    )
)]
#[axum::debug_handler]
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/patients-by-uhid/{uhid}",
    params(("uhid" = String, Path, description = "Patient UHID")),
    responses(
        (status = 200, description = "Merged patient record with completion and phase status"),
        (status = 400, description = "Invalid UHID"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn patient_by_uhid(
    State(state): State<AppState>,
    Path(uhid): Path<String>,
) -> HandlerResult<PatientRes> {
    let patient = state
        .patients
        .patient_view(&uhid, today())
        .map_err(|e| reject("Patient view", "Patient not found", e))?;
    Ok(Json(PatientRes { patient }))
}

#[utoipa::path(
    get,
    path = "/patients-all-by-admin-uhid/{uhid}",
    params(("uhid" = String, Path, description = "Staff member UHID")),
    responses(
        (status = 200, description = "Every patient the staff member looks after"),
        (status = 404, description = "No patients found for this staff member"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn patients_by_admin(
    State(state): State<AppState>,
    Path(uhid): Path<String>,
) -> HandlerResult<StaffPatientsRes> {
    let patients = state
        .patients
        .staff_patients(&uhid, today())
        .map_err(|e| reject("Staff patients", "No patients found for this staff member", e))?;
    Ok(Json(StaffPatientsRes {
        admin_uhid: uhid,
        patients,
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{uhid}/reminders",
    params(("uhid" = String, Path, description = "Patient UHID")),
    responses(
        (status = 200, description = "Contact details and outstanding questionnaires"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn patient_reminders(
    State(state): State<AppState>,
    Path(uhid): Path<String>,
) -> HandlerResult<ReminderRes> {
    let patient = state
        .patients
        .reminder_view(&uhid)
        .map_err(|e| reject("Reminder view", "Patient not found", e))?;
    Ok(Json(ReminderRes { patient }))
}

#[utoipa::path(
    get,
    path = "/patients/uhid-side/{doctor_uhid}",
    params(("doctor_uhid" = String, Path, description = "Doctor UHID")),
    responses(
        (status = 200, description = "Patients with the sides this doctor operates on and their scores"),
        (status = 400, description = "Invalid UHID"),
        (status = 404, description = "No patients found for this doctor"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn patients_by_doctor_side(
    State(state): State<AppState>,
    Path(doctor_uhid): Path<String>,
) -> HandlerResult<DoctorPatientsRes> {
    let patients = state
        .patients
        .doctor_patient_sides(&doctor_uhid)
        .map_err(|e| reject("Doctor patient sides", "No patients found for this doctor", e))?;
    Ok(Json(DoctorPatientsRes { patients }))
}

// ============================================================================
// Registration
// ============================================================================

#[utoipa::path(
    post,
    path = "/patients-base",
    request_body = PatientBaseReq,
    responses(
        (status = 200, description = "Patient created", body = CreatePatientRes),
        (status = 400, description = "Invalid body or patient already exists"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn create_patient_base(
    State(state): State<AppState>,
    Json(req): Json<PatientBaseReq>,
) -> HandlerResult<CreatePatientRes> {
    let data = PatientBaseData::try_from(req).map_err(invalid)?;
    state
        .registration
        .store_patient_base(&data)
        .map_err(|e| reject("Store patient base", "Patient not found", e))?;
    Ok(Json(CreatePatientRes {
        message: "Patient created successfully".into(),
        patient_id: data.uhid.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/fhir/store-patient-contact",
    request_body = PatientContactReq,
    responses(
        (status = 200, description = "Contact stored", body = MessageRes),
        (status = 400, description = "Invalid body"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn store_patient_contact(
    State(state): State<AppState>,
    Json(req): Json<PatientContactReq>,
) -> HandlerResult<MessageRes> {
    let data = PatientContactData::try_from(req).map_err(invalid)?;
    state
        .registration
        .store_patient_contact(&data)
        .map_err(|e| reject("Store patient contact", "Patient not found", e))?;
    Ok(Json(MessageRes::new("Patient contact stored successfully")))
}

#[utoipa::path(
    post,
    path = "/fhir/store-patient-medical",
    request_body = PatientMedicalReq,
    responses(
        (status = 200, description = "Medical details stored", body = StatusRes),
        (status = 400, description = "Invalid body"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn store_patient_medical(
    State(state): State<AppState>,
    Json(req): Json<PatientMedicalReq>,
) -> HandlerResult<StatusRes> {
    let data = PatientMedicalData::try_from(req).map_err(invalid)?;
    state
        .registration
        .store_patient_medical(&data)
        .map_err(|e| reject("Store patient medical", "Patient not found", e))?;
    Ok(Json(StatusRes {
        status: "success".into(),
        uhid: Some(data.uhid.to_string()),
        message: None,
    }))
}

#[utoipa::path(
    post,
    path = "/patients/full",
    request_body = PatientFullReq,
    responses(
        (status = 200, description = "Patient registered in all three collections", body = FullRegistrationRes),
        (status = 400, description = "Invalid body, mismatched UHIDs or patient already exists"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn create_full_patient(
    State(state): State<AppState>,
    Json(req): Json<PatientFullReq>,
) -> HandlerResult<FullRegistrationRes> {
    let base = PatientBaseData::try_from(req.base).map_err(invalid)?;
    let contact = PatientContactData::try_from(req.contact).map_err(invalid)?;
    let medical = PatientMedicalData::try_from(req.medical).map_err(invalid)?;

    state
        .registration
        .register_full(&base, &contact, &medical)
        .map_err(|e| reject("Full registration", "Patient not found", e))?;
    Ok(Json(FullRegistrationRes {
        message: "Patient fully created with base, contact, and medical details".into(),
        uhid: base.uhid.to_string(),
    }))
}

#[utoipa::path(
    put,
    path = "/patients/update/{uhid}",
    params(("uhid" = String, Path, description = "Patient UHID")),
    request_body = PatientUpdateReq,
    responses(
        (status = 200, description = "Patient updated", body = UpdatePatientRes),
        (status = 400, description = "Invalid body, no applicable fields or UHID already taken"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    Path(uhid): Path<String>,
    Json(req): Json<PatientUpdateReq>,
) -> HandlerResult<UpdatePatientRes> {
    let uhid = Uhid::parse(&uhid).map_err(|source| {
        invalid(ValidationError::Text {
            field: "uhid",
            source,
        })
    })?;
    let update = PatientUpdate::try_from(req).map_err(invalid)?;
    let updated = state
        .registration
        .update_patient(&uhid, &update)
        .map_err(|e| reject("Update patient", "Patient not found", e))?;
    Ok(Json(UpdatePatientRes {
        message: "Patient updated successfully".into(),
        updated_fields: updated.into_iter().collect(),
    }))
}

// ============================================================================
// Surgery details
// ============================================================================

#[utoipa::path(
    post,
    path = "/surgery_details",
    request_body = SurgeryDetailsReq,
    responses(
        (status = 200, description = "Surgery details stored", body = SurgeryStoredRes),
        (status = 400, description = "Invalid body or no records"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn store_surgery_details(
    State(state): State<AppState>,
    Json(req): Json<SurgeryDetailsReq>,
) -> HandlerResult<SurgeryStoredRes> {
    let data = SurgeryDetailsData::try_from(req).map_err(invalid)?;
    let id = state
        .surgery
        .store_details(&data)
        .map_err(|e| reject("Store surgery details", "Patient not found", e))?;
    Ok(Json(SurgeryStoredRes {
        inserted_id: id.to_string(),
        message: "Surgery details stored successfully.".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/getsurgerybypatient/{uhid}",
    params(("uhid" = String, Path, description = "Patient UHID")),
    responses(
        (status = 200, description = "Every surgery details bundle of the patient"),
        (status = 400, description = "Invalid UHID"),
        (status = 404, description = "No surgery details found for this patient"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn surgery_by_patient(
    State(state): State<AppState>,
    Path(uhid): Path<String>,
) -> HandlerResult<SurgeryDetailsRes> {
    let uhid = Uhid::parse(&uhid).map_err(|source| {
        invalid(ValidationError::Text {
            field: "uhid",
            source,
        })
    })?;
    let found = state.surgery.details_for_patient(&uhid).map_err(|e| {
        reject(
            "Surgery details",
            "No surgery details found for this patient",
            e,
        )
    })?;
    let patients = found
        .into_iter()
        .map(|stored| StoredSurgeryDetails {
            id: stored.id.to_string(),
            bundle: stored.bundle,
        })
        .collect();
    Ok(Json(SurgeryDetailsRes { patients }))
}

#[utoipa::path(
    patch,
    path = "/patient_surgery_details/update_field",
    request_body = SurgeryFieldUpdateReq,
    responses(
        (status = 200, description = "Field updated", body = SurgeryFieldUpdatedRes),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "No matching surgery details or field"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn update_surgery_field(
    State(state): State<AppState>,
    Json(req): Json<SurgeryFieldUpdateReq>,
) -> HandlerResult<SurgeryFieldUpdatedRes> {
    let (uhid, update) = req.validate().map_err(invalid)?;
    state
        .surgery
        .update_field(&uhid, &update)
        .map_err(|e| reject("Update surgery field", "No matching surgery details or field", e))?;
    Ok(Json(SurgeryFieldUpdatedRes {
        detail: "Surgery details updated".into(),
        uhid: uhid.to_string(),
        updated_field: req.field,
    }))
}

// ============================================================================
// Questionnaires
// ============================================================================

#[utoipa::path(
    post,
    path = "/assign-questionnaire",
    request_body = QuestionnaireAssignmentReq,
    responses(
        (status = 200, description = "Assigned, or already assigned for this period", body = MessageRes),
        (status = 400, description = "Invalid body or unknown questionnaire"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn assign_questionnaire(
    State(state): State<AppState>,
    Json(req): Json<QuestionnaireAssignmentReq>,
) -> HandlerResult<MessageRes> {
    let valid = ValidAssignment::try_from(req).map_err(invalid)?;
    let outcome = state
        .questionnaires
        .assign(&valid.uhid, valid.side, &valid.data)
        .map_err(|e| reject("Assign questionnaire", "Patient not found", e))?;

    let message = match outcome {
        AssignmentOutcome::AlreadyAssigned => "Questionnaire already assigned for this period",
        AssignmentOutcome::Created | AssignmentOutcome::Appended => {
            "Questionnaire assigned successfully"
        }
    };
    Ok(Json(MessageRes::new(message)))
}

#[utoipa::path(
    post,
    path = "/assign-questionnaire-bulk",
    request_body = Vec<QuestionnaireAssignmentReq>,
    responses(
        (status = 200, description = "Per-entry outcome", body = BulkAssignmentRes),
        (status = 400, description = "An entry failed validation"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn assign_questionnaire_bulk(
    State(state): State<AppState>,
    Json(reqs): Json<Vec<QuestionnaireAssignmentReq>>,
) -> HandlerResult<BulkAssignmentRes> {
    let requests = reqs
        .into_iter()
        .map(|req| {
            ValidAssignment::try_from(req).map(|valid| AssignmentRequest {
                uhid: valid.uhid,
                side: valid.side,
                assignment: valid.data,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid)?;

    let outcomes = state
        .questionnaires
        .assign_many(&requests)
        .map_err(|e| reject("Bulk assign questionnaires", "Patient not found", e))?;

    let results = requests
        .iter()
        .zip(outcomes)
        .map(|(request, outcome)| BulkAssignmentResult {
            uhid: request.uhid.to_string(),
            name: request.assignment.name.clone(),
            period: request.assignment.phase.marker().to_string(),
            message: match outcome {
                AssignmentOutcome::Created => "Assigned (new bundle)",
                AssignmentOutcome::Appended => "Assigned",
                AssignmentOutcome::AlreadyAssigned => "Already exists",
            }
            .into(),
        })
        .collect();
    Ok(Json(BulkAssignmentRes { results }))
}

#[utoipa::path(
    put,
    path = "/add-score",
    request_body = QuestionnaireScoreReq,
    responses(
        (status = 200, description = "Score recorded", body = MessageRes),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "Questionnaire not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn add_score(
    State(state): State<AppState>,
    Json(req): Json<QuestionnaireScoreReq>,
) -> HandlerResult<MessageRes> {
    let valid = ValidScore::try_from(req).map_err(invalid)?;
    state
        .questionnaires
        .record_score(&valid.uhid, valid.side, &valid.data)
        .map_err(|e| reject("Add score", "Questionnaire not found", e))?;
    Ok(Json(MessageRes::new(
        "Score, timestamp, and additional notes updated successfully",
    )))
}

#[utoipa::path(
    put,
    path = "/reset_questionnaires",
    request_body = QuestionnairePeriodReq,
    responses(
        (status = 200, description = "Questionnaires reset", body = ResetQuestionnairesRes),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn reset_questionnaires(
    State(state): State<AppState>,
    Json(req): Json<QuestionnairePeriodReq>,
) -> HandlerResult<ResetQuestionnairesRes> {
    let (uhid, side, phase) = req.validate().map_err(invalid)?;
    let modified_count = state
        .questionnaires
        .reset_for_phase(&uhid, side, phase, today())
        .map_err(|e| reject("Reset questionnaires", "Patient not found", e))?;
    Ok(Json(ResetQuestionnairesRes {
        status: "success".into(),
        modified_count,
        reset_period: req.period,
    }))
}

#[utoipa::path(
    delete,
    path = "/delete-questionnaires",
    request_body = QuestionnairePeriodReq,
    responses(
        (status = 200, description = "Questionnaires deleted", body = MessageRes),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "No questionnaires found for this period"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn delete_questionnaires(
    State(state): State<AppState>,
    Json(req): Json<QuestionnairePeriodReq>,
) -> HandlerResult<MessageRes> {
    let (uhid, side, phase) = req.validate().map_err(invalid)?;
    let deleted = state
        .questionnaires
        .delete_for_phase(&uhid, side, phase)
        .map_err(|e| {
            reject(
                "Delete questionnaires",
                "No questionnaires found for this period",
                e,
            )
        })?;
    Ok(Json(MessageRes::new(format!(
        "Deleted {deleted} questionnaires for period '{}'",
        req.period
    ))))
}

// ============================================================================
// Follow-up
// ============================================================================

#[utoipa::path(
    patch,
    path = "/patients/add-followup",
    request_body = FollowUpCommentReq,
    responses(
        (status = 200, description = "Comment appended", body = StatusRes),
        (status = 400, description = "Invalid body"),
        (status = 404, description = "Medical record not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn add_follow_up(
    State(state): State<AppState>,
    Json(req): Json<FollowUpCommentReq>,
) -> HandlerResult<StatusRes> {
    let (uhid, comment) = req.validate().map_err(invalid)?;
    state
        .follow_up
        .add_follow_up(&uhid, &comment)
        .map_err(|e| reject("Add follow-up", "Medical record not found", e))?;
    Ok(Json(StatusRes {
        status: "success".into(),
        uhid: None,
        message: Some("Follow-up comment added".into()),
    }))
}
