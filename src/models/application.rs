// Applications and their status history

//! # Application Models
//!
//! - `Application`: the external entity moving through a workflow. The engine
//!   reads it and updates only its denormalized current-stage pointer.
//! - `ApplicationStatus`: an append-only history record, one per stage reached.
//!   The most recent record (highest `created_at`, ties broken by highest `id`)
//!   defines the current stage; it doubles as the audit trail.
//! - `Actor`: the user performing an operation, passed explicitly to every
//!   engine call instead of being read from ambient request state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{StageId, WorkflowRef};

/// An admissions application as seen by the workflow engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,

    /// Selects the active workflow, e.g. "undergrad-fall"
    pub application_type: String,

    pub applicant_id: Uuid,

    /// Draft applications have `false`; flipped once on submission
    #[serde(default)]
    pub is_submitted: bool,

    /// Pointer to the latest `ApplicationStatus` row
    #[serde(default)]
    pub current_status_id: Option<i64>,

    /// Denormalized copy of the latest status' stage
    #[serde(default)]
    pub current_stage_id: Option<StageId>,

    /// Workflow snapshot pinned at initialization
    #[serde(default)]
    pub workflow: Option<WorkflowRef>,

    /// Free-form fields visible to transition conditions (e.g. "decision")
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Application {
    pub fn new(application_type: &str, applicant_id: Uuid) -> Self {
        Application {
            id: Uuid::new_v4(),
            application_type: application_type.to_string(),
            applicant_id,
            is_submitted: false,
            current_status_id: None,
            current_stage_id: None,
            workflow: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn is_draft(&self) -> bool {
        !self.is_submitted
    }
}

/// Immutable history record: the application reached `workflow_stage_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    /// Store-assigned, strictly increasing
    pub id: i64,
    pub application_id: Uuid,

    /// Weak reference; the stage may no longer exist in later workflow versions
    pub workflow_stage_id: StageId,

    /// Status label, normally the stage's display name
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,

    /// `None` for system (automatic) transitions
    pub created_by: Option<Uuid>,
}

impl ApplicationStatus {
    /// Ordering key used to pick the current status
    pub fn recency_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

/// Pick the current status out of an application's history
pub fn latest_status(history: &[ApplicationStatus]) -> Option<&ApplicationStatus> {
    history.iter().max_by_key(|s| s.recency_key())
}

/// The user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Actor { user_id }
    }
}
