//! # API REST
//!
//! REST API implementation for the PROM backend.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for request/response types and `prom-core` for all data operations.

mod handlers;

use api_shared::{
    BulkAssignmentRes, BulkAssignmentResult, CommentReq, CreatePatientRes, FollowUpCommentReq,
    FullRegistrationRes, HealthRes, ImplantComponentsReq, ImplantReq, MessageRes,
    PatientBaseReq, PatientContactReq, PatientFullReq, PatientMedicalReq, PatientUpdateReq,
    QuestionnaireAssignmentReq, QuestionnairePeriodReq, QuestionnaireScoreReq,
    RangeOfMotionReq, ResetQuestionnairesRes, StatusRes, SurgeryDetailsReq,
    SurgeryFieldUpdateReq, SurgeryFieldUpdatedRes, SurgeryRecordReq, SurgeryStoredRes,
    ThicknessRowReq, UpdatePatientRes, BoneResectionReq,
};
use axum::{
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Router,
};
use prom_core::{
    CoreConfig, DocumentStore, FollowUpService, PatientError, PatientService,
    QuestionnaireService, RegistrationService, SurgeryService,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state for the REST API server.
///
/// Holds one instance of each core service, all sharing the same store.
#[derive(Clone)]
pub struct AppState {
    patients: PatientService,
    registration: RegistrationService,
    questionnaires: QuestionnaireService,
    follow_up: FollowUpService,
    surgery: SurgeryService,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            patients: PatientService::new(cfg, store.clone()),
            registration: RegistrationService::new(store.clone()),
            questionnaires: QuestionnaireService::new(store.clone()),
            follow_up: FollowUpService::new(store.clone()),
            surgery: SurgeryService::new(store),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::patient_by_uhid,
        handlers::patients_by_admin,
        handlers::patient_reminders,
        handlers::patients_by_doctor_side,
        handlers::create_patient_base,
        handlers::store_patient_contact,
        handlers::store_patient_medical,
        handlers::create_full_patient,
        handlers::update_patient,
        handlers::store_surgery_details,
        handlers::surgery_by_patient,
        handlers::update_surgery_field,
        handlers::assign_questionnaire,
        handlers::assign_questionnaire_bulk,
        handlers::add_score,
        handlers::reset_questionnaires,
        handlers::delete_questionnaires,
        handlers::add_follow_up,
    ),
    components(schemas(
        HealthRes,
        MessageRes,
        CreatePatientRes,
        StatusRes,
        FullRegistrationRes,
        BulkAssignmentRes,
        BulkAssignmentResult,
        ResetQuestionnairesRes,
        UpdatePatientRes,
        SurgeryStoredRes,
        SurgeryFieldUpdatedRes,
        PatientBaseReq,
        PatientContactReq,
        PatientMedicalReq,
        PatientFullReq,
        CommentReq,
        QuestionnaireAssignmentReq,
        QuestionnaireScoreReq,
        QuestionnairePeriodReq,
        FollowUpCommentReq,
        PatientUpdateReq,
        SurgeryDetailsReq,
        SurgeryRecordReq,
        RangeOfMotionReq,
        ImplantComponentsReq,
        ImplantReq,
        BoneResectionReq,
        ThicknessRowReq,
        SurgeryFieldUpdateReq,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/patients-by-uhid/:uhid", get(handlers::patient_by_uhid))
        .route(
            "/patients-all-by-admin-uhid/:uhid",
            get(handlers::patients_by_admin),
        )
        .route("/patients/:uhid/reminders", get(handlers::patient_reminders))
        .route(
            "/patients/uhid-side/:doctor_uhid",
            get(handlers::patients_by_doctor_side),
        )
        .route("/patients-base", post(handlers::create_patient_base))
        .route(
            "/fhir/store-patient-contact",
            post(handlers::store_patient_contact),
        )
        .route(
            "/fhir/store-patient-medical",
            post(handlers::store_patient_medical),
        )
        .route("/patients/full", post(handlers::create_full_patient))
        .route("/patients/update/:uhid", put(handlers::update_patient))
        .route("/surgery_details", post(handlers::store_surgery_details))
        .route(
            "/getsurgerybypatient/:uhid",
            get(handlers::surgery_by_patient),
        )
        .route(
            "/patient_surgery_details/update_field",
            patch(handlers::update_surgery_field),
        )
        .route("/assign-questionnaire", post(handlers::assign_questionnaire))
        .route(
            "/assign-questionnaire-bulk",
            post(handlers::assign_questionnaire_bulk),
        )
        .route("/add-score", put(handlers::add_score))
        .route("/reset_questionnaires", put(handlers::reset_questionnaires))
        .route("/delete-questionnaires", delete(handlers::delete_questionnaires))
        .route("/patients/add-followup", patch(handlers::add_follow_up))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a core error to a status code, logging anything that is not the caller's fault.
pub(crate) fn reject(
    context: &'static str,
    not_found: &'static str,
    err: PatientError,
) -> (StatusCode, &'static str) {
    match err {
        PatientError::InvalidInput(_) | PatientError::Text(_) => {
            tracing::warn!("{context} rejected: {err}");
            (StatusCode::BAD_REQUEST, "Invalid input")
        }
        PatientError::AlreadyExists(_) => {
            tracing::warn!("{context} rejected: {err}");
            (StatusCode::BAD_REQUEST, "Patient already exists")
        }
        PatientError::NotFound(_) => (StatusCode::NOT_FOUND, not_found),
        other => {
            tracing::error!("{context} error: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
