// Request/response types for the admissions workflow REST API
// Every response uses the { success, data, message } envelope

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::CurrentStatus;
use crate::models::{ApplicationStatus, StageId, Workflow, WorkflowId, WorkflowStage, WorkflowTransition};

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error: ErrorDetail,
}

/// Machine-readable part of an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable code, e.g. `invalid_transition`
    pub code: String,

    /// Structured detail (missing permissions, missing items)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub fn create_error_response(message: String, code: &str, details: Option<serde_json::Value>) -> ErrorResponse {
    ErrorResponse {
        success: false,
        message,
        error: ErrorDetail {
            code: code.to_string(),
            details,
        },
    }
}

/// Body of `POST /api/applications`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    pub application_type: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Body of `POST /api/applications/:id/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_stage_id: StageId,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Active workflow with its stages in display order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowView {
    pub id: WorkflowId,
    pub name: String,
    pub application_type: String,
    pub version: u32,
    pub initial_stage: Option<StageId>,
    pub stages: Vec<WorkflowStage>,
    pub transitions: Vec<WorkflowTransition>,
}

impl From<&Workflow> for WorkflowView {
    fn from(workflow: &Workflow) -> Self {
        WorkflowView {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            application_type: workflow.application_type.clone(),
            version: workflow.version,
            initial_stage: workflow.start_stage().map(|s| s.id.clone()),
            stages: workflow.stages_in_order().into_iter().cloned().collect(),
            transitions: workflow.transitions.clone(),
        }
    }
}

/// Current status plus full history
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub current: Option<CurrentStatus>,
    pub history: Vec<ApplicationStatus>,
}

/// Result of `POST /api/applications/:id/automatic`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomaticCheckResponse {
    pub transitioned: bool,
    pub current_stage_id: Option<StageId>,
}
