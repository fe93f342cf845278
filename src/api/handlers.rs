// REST handlers for the admissions workflow API
// Thin translation between HTTP and WorkflowEngine calls

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::types::{
    create_error_response, ApiResponse, AutomaticCheckResponse, CreateApplicationRequest,
    StatusView, TransitionRequest, WorkflowView,
};
use crate::engine::{CurrentStatus, RequirementCheck, WorkflowEngine, WorkflowEvaluationResult};
use crate::models::{Actor, Application, ApplicationStatus, WorkflowTransition};
use crate::WorkflowError;

/// Header carrying the acting user's id
pub const ACTOR_HEADER: &str = "x-user-id";

/// Shared state for every handler
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<WorkflowEngine>,
}

impl ApiState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

/// Errors a handler can return
#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    BadRequest(String),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Read the actor from the `x-user-id` header
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let raw = headers
        .get(ACTOR_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", ACTOR_HEADER)))?;

    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Actor::new)
        .ok_or_else(|| ApiError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER)))
}

/// Actor when the header is present; malformed values are still rejected
fn optional_actor(headers: &HeaderMap) -> Result<Option<Actor>, ApiError> {
    if headers.contains_key(ACTOR_HEADER) {
        actor_from_headers(headers).map(Some)
    } else {
        Ok(None)
    }
}

/// Health check endpoint - GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({
        "status": "ok",
        "service": "admissions-workflow",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    })))
}

/// Active workflow for an application type - GET /api/workflows/:application_type
pub async fn get_active_workflow(
    State(state): State<ApiState>,
    Path(application_type): Path<String>,
) -> ApiResult<WorkflowView> {
    let workflow = state.engine.registry().get_active_workflow(&application_type).await?;
    Ok(Json(ApiResponse::ok(WorkflowView::from(workflow.as_ref()))))
}

/// Create an application owned by the caller - POST /api/applications
pub async fn create_application(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Application>>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    if request.application_type.trim().is_empty() {
        return Err(ApiError::BadRequest("application_type must not be empty".to_string()));
    }

    let mut application = Application::new(&request.application_type, actor.user_id);
    application.attributes = request.attributes;

    let created = state.engine.create_application(application).await?;
    let initialized = state
        .engine
        .initialize_application_workflow(created.id, Some(&actor))
        .await?;
    let created = state.engine.get_application(created.id).await?;

    let message = if initialized {
        "Application created"
    } else {
        "Application created; no workflow is configured for this application type"
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created).with_message(message))))
}

/// Current status and history - GET /api/applications/:id/status
pub async fn get_status(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult<StatusView> {
    let current: Option<CurrentStatus> = state.engine.current_status(id).await?;
    let history = state.engine.status_history(id).await?;
    Ok(Json(ApiResponse::ok(StatusView { current, history })))
}

/// Manual transitions the caller may fire - GET /api/applications/:id/transitions
pub async fn get_transitions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<WorkflowTransition>> {
    let actor = actor_from_headers(&headers)?;
    let transitions = state.engine.available_transitions(id, &actor).await?;
    Ok(Json(ApiResponse::ok(transitions)))
}

/// Why each outgoing transition can or cannot fire - GET /api/applications/:id/evaluation
pub async fn get_evaluation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<WorkflowEvaluationResult>> {
    let actor = optional_actor(&headers)?;
    let report = state.engine.evaluate_transitions(id, actor.as_ref()).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// Requirement check for the current stage - GET /api/applications/:id/requirements
pub async fn get_requirements(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<RequirementCheck>> {
    let check = state.engine.evaluate_requirements(id).await?;
    Ok(Json(ApiResponse::ok(check)))
}

/// Execute a manual transition - POST /api/applications/:id/status
pub async fn execute_transition(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<ApplicationStatus> {
    let actor = actor_from_headers(&headers)?;
    let status = state
        .engine
        .execute_transition(id, &request.target_stage_id, &actor, request.notes)
        .await?;

    info!(application_id = %id, stage = %status.workflow_stage_id, "status updated via API");
    let message = format!("Application moved to {}", status.status);
    Ok(Json(ApiResponse::ok(status).with_message(message)))
}

/// Run the automatic transition check - POST /api/applications/:id/automatic
pub async fn check_automatic(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AutomaticCheckResponse> {
    let transitioned = state.engine.check_automatic_transitions(id).await?;
    let current_stage_id = state.engine.get_application(id).await?.current_stage_id;
    Ok(Json(ApiResponse::ok(AutomaticCheckResponse {
        transitioned,
        current_stage_id,
    })))
}

/// Submit an application - POST /api/applications/:id/submit
pub async fn submit_application(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Application> {
    let actor = actor_from_headers(&headers)?;
    let application = state.engine.submit_application(id, &actor).await?;
    Ok(Json(ApiResponse::ok(application).with_message("Application submitted")))
}

/// Error handler for invalid routes
pub async fn not_found() -> impl IntoResponse {
    let error = create_error_response("Not found".to_string(), "not_found", None);
    (StatusCode::NOT_FOUND, Json(error))
}

fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::WorkflowNotFound(_)
        | WorkflowError::StageNotFound(_)
        | WorkflowError::ApplicationNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. } | WorkflowError::RequirementsNotMet { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::Authorization { .. } => StatusCode::FORBIDDEN,
        WorkflowError::InvalidWorkflow(_) => StatusCode::BAD_REQUEST,
        WorkflowError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        WorkflowError::MalformedCondition(_)
        | WorkflowError::Storage(_)
        | WorkflowError::Serialization(_)
        | WorkflowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details_for(err: &WorkflowError) -> Option<serde_json::Value> {
    match err {
        WorkflowError::InvalidTransition { from, to, reason } => {
            Some(json!({ "from": from, "to": to, "reason": reason }))
        }
        WorkflowError::Authorization { transition, missing } => {
            Some(json!({ "transition": transition, "missing_permissions": missing }))
        }
        WorkflowError::RequirementsNotMet { missing } => Some(json!({ "missing": missing })),
        _ if err.is_retryable() => Some(json!({ "retryable": true })),
        _ => None,
    }
}

/// Error response implementation
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                debug!(%message, "bad request");
                let body = create_error_response(message, "invalid_request", None);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::Workflow(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(error = %err, code = err.error_code(), "request failed");
                } else {
                    debug!(error = %err, code = err.error_code(), "request rejected");
                }

                // Operators get the detail in the log; clients get a generic message
                let message = if status.is_server_error() {
                    "Internal server error".to_string()
                } else {
                    err.to_string()
                };
                let body = create_error_response(message, err.error_code(), details_for(&err));
                (status, Json(body)).into_response()
            }
        }
    }
}
