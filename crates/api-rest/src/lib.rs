//! # API REST
//!
//! REST API for the care portal.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for request/response bodies and `portal-core` for everything else.

#![warn(rust_2018_idioms)]

pub mod settings;

pub use settings::ServerSettings;

use api_shared::{
    validate_api_key, AppointmentsRes, AuthError, CancelAppointmentReq, ClassifyReq, ClassifyRes,
    ErrorRes, HealthRes, HealthService, ListFacilitiesRes, ListPatientsRes, MigrationRunRes,
    NotificationsRes, SignInReq, TabQuery, UpdateAppointmentReq, UploadQuery, API_KEY_HEADER,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use portal_core::filter::{filter_by_tab_name, today};
use portal_core::migration::{MigrationService, MigrationStatistics};
use portal_core::model::{Appointment, ClassifiedAppointment};
use portal_core::modifications::{announce, detect_modifications_within};
use portal_core::notify::{FanoutNotifier, MemoryNotifier, Notifier, TracingNotifier};
use portal_core::repositories::{
    AppointmentService, AppointmentStore, DocumentRef, FacilityData, FacilityProfileUpdate,
    FacilityService, NewAppointment, NewFacility, NewPatient, PatientData, PatientProfileUpdate,
    PatientService,
};
use portal_core::{CoreConfig, PortalError, TriageService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state for the REST API server
///
/// Services are cheap to clone; they share the configuration and the appointment store.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<CoreConfig>,
    patients: PatientService,
    facilities: FacilityService,
    appointments: AppointmentService,
    triage: TriageService,
    migration: Arc<MigrationService>,
    notifications: MemoryNotifier,
    notifier: Arc<dyn Notifier>,
    api_key: Option<String>,
}

impl AppState {
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn AppointmentStore>,
        triage: TriageService,
        api_key: Option<String>,
    ) -> Self {
        let notifications = MemoryNotifier::new();
        let targets: Vec<Arc<dyn Notifier>> =
            vec![Arc::new(TracingNotifier), Arc::new(notifications.clone())];
        let notifier: Arc<dyn Notifier> = Arc::new(FanoutNotifier::new(targets));

        let appointments = AppointmentService::new(store);

        Self {
            patients: PatientService::new(cfg.clone()),
            facilities: FacilityService::new(cfg.clone()),
            migration: Arc::new(MigrationService::new(appointments.clone(), notifier.clone())),
            appointments,
            cfg,
            triage,
            notifications,
            notifier,
            api_key,
        }
    }

    /// Triages one tab's worth of appointments.
    async fn dashboard(&self, appointments: Vec<Appointment>, tab: Option<&str>) -> Vec<ClassifiedAppointment> {
        let selected = match tab {
            Some(tab) => filter_by_tab_name(appointments, tab, today()),
            None => appointments,
        };
        self.triage.annotate(selected).await
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        classify,
        list_patients,
        create_patient,
        get_patient,
        update_patient,
        sign_in_patient,
        upload_document,
        download_document,
        list_patient_appointments,
        create_appointment,
        update_appointment,
        cancel_appointment,
        list_facilities,
        create_facility,
        get_facility,
        update_facility,
        list_facility_appointments,
        migration_stats,
        run_migration,
        list_notifications,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        ClassifyReq,
        ClassifyRes,
        AppointmentsRes,
        SignInReq,
        UpdateAppointmentReq,
        CancelAppointmentReq,
        ListPatientsRes,
        ListFacilitiesRes,
        MigrationRunRes,
        NotificationsRes,
        MigrationStatistics,
        PatientData,
        NewPatient,
        PatientProfileUpdate,
        DocumentRef,
        FacilityData,
        NewFacility,
        FacilityProfileUpdate,
        Appointment,
        NewAppointment,
        ClassifiedAppointment,
    ))
)]
pub struct ApiDoc;

/// Builds the application router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/triage/classify", post(classify))
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:id", get(get_patient).put(update_patient))
        .route("/patients/:id/sign-in", post(sign_in_patient))
        .route("/patients/:id/documents", post(upload_document))
        .route("/patients/:id/documents/:hash", get(download_document))
        .route(
            "/patients/:id/appointments",
            get(list_patient_appointments).post(create_appointment),
        )
        .route(
            "/patients/:id/appointments/:appointment_id",
            put(update_appointment),
        )
        .route(
            "/patients/:id/appointments/:appointment_id/cancel",
            post(cancel_appointment),
        )
        .route("/facilities", get(list_facilities).post(create_facility))
        .route("/facilities/:id", get(get_facility).put(update_facility))
        .route("/facilities/:id/appointments", get(list_facility_appointments))
        .route("/migration/stats", get(migration_stats))
        .route("/migration/run", post(run_migration))
        .route("/notifications", get(list_notifications))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler error, rendered as an [`ErrorRes`] body.
#[derive(Debug)]
pub enum ApiError {
    Portal(PortalError),
    Auth(AuthError),
}

impl From<PortalError> for ApiError {
    fn from(e: PortalError) -> Self {
        ApiError::Portal(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, field) = match self {
            ApiError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string(), None),
            ApiError::Portal(PortalError::Validation { field, message }) => {
                (StatusCode::BAD_REQUEST, message, Some(field.to_owned()))
            }
            ApiError::Portal(
                e @ (PortalError::InvalidInput(_) | PortalError::Uuid(_) | PortalError::Text(_)),
            ) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            ApiError::Portal(e @ PortalError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, e.to_string(), None)
            }
            ApiError::Portal(e @ PortalError::Conflict(_)) => {
                (StatusCode::CONFLICT, e.to_string(), None)
            }
            ApiError::Portal(e) => {
                tracing::error!("request failed: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_owned(), None)
            }
        };
        (status, Json(ErrorRes { error, field })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/triage/classify",
    request_body = ClassifyReq,
    responses(
        (status = 200, description = "Every appointment with its urgency", body = ClassifyRes)
    )
)]
/// Classify appointment urgency
///
/// Never fails: evaluator problems fall back to keyword triage and anything unexpected
/// yields GREEN/ROUTINE for the affected appointment.
#[axum::debug_handler]
async fn classify(State(state): State<AppState>, Json(req): Json<ClassifyReq>) -> Json<ClassifyRes> {
    // Client-supplied ids stay out of the dashboards' memo cache.
    let results = state.triage.with_own_cache().annotate(req.appointments).await;
    Json(ClassifyRes { results })
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "List of patients", body = ListPatientsRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_patients(State(state): State<AppState>) -> ApiResult<Json<ListPatientsRes>> {
    let patients = state.patients.list()?;
    Ok(Json(ListPatientsRes { patients }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = NewPatient,
    responses(
        (status = 201, description = "Patient created", body = PatientData),
        (status = 400, description = "Invalid registration details", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn create_patient(
    State(state): State<AppState>,
    Json(req): Json<NewPatient>,
) -> ApiResult<(StatusCode, Json<PatientData>)> {
    let patient = state.patients.create(req)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient profile", body = PatientData),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_patient(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<PatientData>> {
    Ok(Json(state.patients.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    request_body = PatientProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = PatientData),
        (status = 400, description = "Invalid update", body = ErrorRes),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PatientProfileUpdate>,
) -> ApiResult<Json<PatientData>> {
    Ok(Json(state.patients.update_profile(&id, req)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/sign-in",
    params(("id" = String, Path, description = "Patient id issued by the identity provider")),
    request_body = SignInReq,
    responses(
        (status = 200, description = "Existing or newly initialised profile", body = PatientData),
        (status = 400, description = "Malformed id or email", body = ErrorRes)
    )
)]
/// Return the patient's profile, creating an empty one on first sign-in
#[axum::debug_handler]
async fn sign_in_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SignInReq>,
) -> ApiResult<Json<PatientData>> {
    Ok(Json(state.patients.ensure(&id, &req.email)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/documents",
    params(("id" = String, Path, description = "Patient id"), UploadQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Document stored", body = DocumentRef),
        (status = 409, description = "Identical document already uploaded", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn upload_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<DocumentRef>)> {
    let document = state.patients.upload_document(&id, &query.filename, &body)?;
    state
        .notifier
        .notify("Document uploaded successfully", portal_core::NotificationKind::Success);
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/documents/{hash}",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("hash" = String, Path, description = "SHA-256 of the document")
    ),
    responses(
        (status = 200, description = "Document bytes", content_type = "application/octet-stream"),
        (status = 404, description = "No such document", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn download_document(
    State(state): State<AppState>,
    Path((id, hash)): Path<(String, String)>,
) -> ApiResult<Response> {
    let bytes = state.patients.read_document(&id, &hash)?;
    let media_type = state
        .patients
        .get(&id)?
        .documents
        .into_iter()
        .find(|doc| doc.hash == hash)
        .and_then(|doc| doc.media_type)
        .unwrap_or_else(|| "application/octet-stream".to_owned());

    Ok(([(header::CONTENT_TYPE, media_type)], bytes).into_response())
}

#[utoipa::path(
    get,
    path = "/patients/{id}/appointments",
    params(("id" = String, Path, description = "Patient id"), TabQuery),
    responses(
        (status = 200, description = "Triaged appointments and edit notifications", body = AppointmentsRes),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
/// Patient dashboard
///
/// Facility edits made in the last few minutes are reported in `notifications` and sent to
/// the notification surface.
#[axum::debug_handler]
async fn list_patient_appointments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TabQuery>,
) -> ApiResult<Json<AppointmentsRes>> {
    let all = state.appointments.list_for_patient(&id)?;

    let notifications = detect_modifications_within(&all, Utc::now(), state.cfg.notify_window());
    announce(&notifications, state.notifier.as_ref());

    let appointments = state.dashboard(all, query.tab.as_deref()).await;
    Ok(Json(AppointmentsRes {
        appointments,
        notifications,
    }))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/appointments",
    params(("id" = String, Path, description = "Patient id")),
    request_body = NewAppointment,
    responses(
        (status = 201, description = "Appointment booked", body = Appointment),
        (status = 400, description = "Missing field or invalid patient id", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn create_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut req): Json<NewAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    req.patient_id = id;
    let appointment = state.appointments.create(req)?;
    state
        .notifier
        .notify("Appointment booked successfully", portal_core::NotificationKind::Success);
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    put,
    path = "/patients/{id}/appointments/{appointment_id}",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("appointment_id" = String, Path, description = "Appointment id")
    ),
    request_body = UpdateAppointmentReq,
    responses(
        (status = 200, description = "Updated appointment", body = Appointment),
        (status = 404, description = "No such appointment", body = ErrorRes),
        (status = 409, description = "Appointment is cancelled", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn update_appointment(
    State(state): State<AppState>,
    Path((id, appointment_id)): Path<(String, String)>,
    Json(req): Json<UpdateAppointmentReq>,
) -> ApiResult<Json<Appointment>> {
    let appointment = state
        .appointments
        .update_fields(&id, &appointment_id, req.changes, req.updated_by)?;
    Ok(Json(appointment))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/appointments/{appointment_id}/cancel",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("appointment_id" = String, Path, description = "Appointment id")
    ),
    request_body = CancelAppointmentReq,
    responses(
        (status = 200, description = "Cancelled appointment", body = Appointment),
        (status = 409, description = "Already cancelled", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn cancel_appointment(
    State(state): State<AppState>,
    Path((id, appointment_id)): Path<(String, String)>,
    Json(req): Json<CancelAppointmentReq>,
) -> ApiResult<Json<Appointment>> {
    let appointment = state.appointments.cancel(&id, &appointment_id, req.cancelled_by)?;
    Ok(Json(appointment))
}

#[utoipa::path(
    get,
    path = "/facilities",
    responses(
        (status = 200, description = "List of facilities", body = ListFacilitiesRes)
    )
)]
#[axum::debug_handler]
async fn list_facilities(State(state): State<AppState>) -> ApiResult<Json<ListFacilitiesRes>> {
    let facilities = state.facilities.list()?;
    Ok(Json(ListFacilitiesRes { facilities }))
}

#[utoipa::path(
    post,
    path = "/facilities",
    request_body = NewFacility,
    responses(
        (status = 201, description = "Facility created", body = FacilityData),
        (status = 400, description = "Invalid details", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn create_facility(
    State(state): State<AppState>,
    Json(req): Json<NewFacility>,
) -> ApiResult<(StatusCode, Json<FacilityData>)> {
    let facility = state.facilities.create(req)?;
    Ok((StatusCode::CREATED, Json(facility)))
}

#[utoipa::path(
    get,
    path = "/facilities/{id}",
    params(("id" = String, Path, description = "Facility id")),
    responses(
        (status = 200, description = "Facility profile", body = FacilityData),
        (status = 404, description = "No such facility", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_facility(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<FacilityData>> {
    Ok(Json(state.facilities.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/facilities/{id}",
    params(("id" = String, Path, description = "Facility id")),
    request_body = FacilityProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = FacilityData),
        (status = 404, description = "No such facility", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn update_facility(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FacilityProfileUpdate>,
) -> ApiResult<Json<FacilityData>> {
    Ok(Json(state.facilities.update_profile(&id, req)?))
}

#[utoipa::path(
    get,
    path = "/facilities/{id}/appointments",
    params(("id" = String, Path, description = "Facility id"), TabQuery),
    responses(
        (status = 200, description = "Triaged appointments booked with the facility", body = AppointmentsRes)
    )
)]
#[axum::debug_handler]
async fn list_facility_appointments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TabQuery>,
) -> ApiResult<Json<AppointmentsRes>> {
    let all = state.appointments.list_for_facility(&id)?;
    let appointments = state.dashboard(all, query.tab.as_deref()).await;
    Ok(Json(AppointmentsRes {
        appointments,
        notifications: Vec::new(),
    }))
}

#[utoipa::path(
    get,
    path = "/migration/stats",
    responses(
        (status = 200, description = "Urgency backfill progress", body = MigrationStatistics)
    )
)]
#[axum::debug_handler]
async fn migration_stats(State(state): State<AppState>) -> ApiResult<Json<MigrationStatistics>> {
    Ok(Json(state.migration.get_migration_statistics()?))
}

#[utoipa::path(
    post,
    path = "/migration/run",
    params(("x-api-key" = String, Header, description = "Server API key")),
    responses(
        (status = 200, description = "Backfill finished", body = MigrationRunRes),
        (status = 401, description = "Missing or wrong API key", body = ErrorRes)
    )
)]
/// Backfill urgencies for appointments that have none
#[axum::debug_handler]
async fn run_migration(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<MigrationRunRes>> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    validate_api_key(provided, state.api_key.as_deref())?;

    let migrated = state.migration.migrate_existing_appointments()?;
    let statistics = state.migration.get_migration_statistics()?;
    Ok(Json(MigrationRunRes {
        migrated,
        statistics,
    }))
}

#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Notifications still on display", body = NotificationsRes)
    )
)]
#[axum::debug_handler]
async fn list_notifications(State(state): State<AppState>) -> Json<NotificationsRes> {
    Json(NotificationsRes {
        notifications: state.notifications.active(Utc::now()),
    })
}
