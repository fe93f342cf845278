// Storage abstraction for applications and their status history

//! # Application Storage
//!
//! The engine owns exactly one write: "record a new status and move the
//! application's current-stage pointer to it". [`ApplicationStore::commit_transition`]
//! performs both as one atomic unit so a reader never sees a status row whose
//! pointer is stale, or a pointer to a row that does not exist.
//!
//! ## Concurrency
//!
//! Commits carry the `current_status_id` the caller based its decision on
//! (`expected_status_id`). If another writer moved the application in the
//! meantime the commit fails with `ConcurrentModification` and nothing is
//! written; the caller re-reads and re-evaluates. In a SQL store this is a
//! `SELECT ... FOR UPDATE` on the application row inside one transaction.
//!
//! ## Rust Learning Notes:
//!
//! ### One Lock, Two Tables
//! `InMemoryApplicationStore` keeps applications and statuses inside the same
//! `RwLock`ed struct. Holding a single write guard across both updates is what
//! makes the commit atomic: no other task can observe the state between them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::lock_poisoned;
use crate::models::{Application, ApplicationStatus, StageId, WorkflowRef};
use crate::{Result, WorkflowError};

/// Everything needed to record one transition
#[derive(Debug, Clone)]
pub struct StatusCommit {
    pub application_id: Uuid,

    /// Pointer value the caller observed; `None` for the initial status
    pub expected_status_id: Option<i64>,

    pub stage_id: StageId,
    pub status: String,
    pub notes: Option<String>,

    /// `None` for system transitions
    pub created_by: Option<Uuid>,

    /// Pins the workflow snapshot; only set when initializing
    pub pin_workflow: Option<WorkflowRef>,
}

/// Persistence for applications and their append-only status history
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create_application(&self, application: Application) -> Result<Application>;

    /// `Ok(None)` when the application does not exist
    async fn get_application(&self, id: Uuid) -> Result<Option<Application>>;

    /// Set a condition-visible attribute such as `decision`
    async fn set_attribute(&self, id: Uuid, key: &str, value: serde_json::Value) -> Result<Application>;

    /// Flip draft → submitted
    ///
    /// The flag is `false` when the application was already submitted and
    /// nothing changed.
    async fn mark_submitted(&self, id: Uuid) -> Result<(Application, bool)>;

    /// Status history, oldest first
    async fn list_statuses(&self, application_id: Uuid) -> Result<Vec<ApplicationStatus>>;

    /// Insert the status and move the pointer atomically
    async fn commit_transition(&self, commit: StatusCommit) -> Result<(Application, ApplicationStatus)>;
}

/// Where a simulated storage failure strikes inside a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the status row is inserted, before the pointer moves
    AfterStatusInsert,
}

#[derive(Default)]
struct StoreState {
    applications: HashMap<Uuid, Application>,
    statuses: HashMap<Uuid, Vec<ApplicationStatus>>,
    last_status_id: i64,
}

/// In-memory application store for development and testing
///
/// ## Limitations
///
/// - **Not persistent**: data is lost when the process restarts
/// - **Single process**: the optimistic check only protects writers sharing
///   this instance
#[derive(Default)]
pub struct InMemoryApplicationStore {
    state: RwLock<StoreState>,
    fault: RwLock<Option<FaultPoint>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next commit at `point`; the fault is consumed by that commit
    pub fn inject_fault(&self, point: FaultPoint) -> Result<()> {
        *self.fault.write().map_err(lock_poisoned)? = Some(point);
        Ok(())
    }

    fn take_fault(&self, point: FaultPoint) -> Result<bool> {
        let mut fault = self.fault.write().map_err(lock_poisoned)?;
        if *fault == Some(point) {
            *fault = None;
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn create_application(&self, application: Application) -> Result<Application> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        if state.applications.contains_key(&application.id) {
            return Err(WorkflowError::Internal(format!(
                "application {} already exists",
                application.id
            )));
        }
        state.applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state.applications.get(&id).cloned())
    }

    async fn set_attribute(&self, id: Uuid, key: &str, value: serde_json::Value) -> Result<Application> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let application = state
            .applications
            .get_mut(&id)
            .ok_or(WorkflowError::ApplicationNotFound(id))?;
        application.attributes.insert(key.to_string(), value);
        Ok(application.clone())
    }

    async fn mark_submitted(&self, id: Uuid) -> Result<(Application, bool)> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let application = state
            .applications
            .get_mut(&id)
            .ok_or(WorkflowError::ApplicationNotFound(id))?;
        let changed = !application.is_submitted;
        application.is_submitted = true;
        Ok((application.clone(), changed))
    }

    async fn list_statuses(&self, application_id: Uuid) -> Result<Vec<ApplicationStatus>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state
            .statuses
            .get(&application_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_transition(&self, commit: StatusCommit) -> Result<(Application, ApplicationStatus)> {
        let mut guard = self.state.write().map_err(lock_poisoned)?;
        let state = &mut *guard;

        let current = state
            .applications
            .get(&commit.application_id)
            .ok_or(WorkflowError::ApplicationNotFound(commit.application_id))?
            .current_status_id;
        if current != commit.expected_status_id {
            return Err(WorkflowError::ConcurrentModification {
                application_id: commit.application_id,
            });
        }

        let history = state.statuses.entry(commit.application_id).or_default();

        // created_at never goes backwards within one history
        let now = Utc::now();
        let created_at = history
            .last()
            .map_or(now, |last| last.created_at.max(now));

        let status = ApplicationStatus {
            id: state.last_status_id + 1,
            application_id: commit.application_id,
            workflow_stage_id: commit.stage_id.clone(),
            status: commit.status,
            notes: commit.notes,
            created_at,
            created_by: commit.created_by,
        };
        history.push(status.clone());

        if self.take_fault(FaultPoint::AfterStatusInsert)? {
            history.pop();
            return Err(WorkflowError::Storage(anyhow::anyhow!(
                "simulated failure after status insert for application {}",
                commit.application_id
            )));
        }

        state.last_status_id = status.id;
        let application = state
            .applications
            .get_mut(&commit.application_id)
            .ok_or(WorkflowError::ApplicationNotFound(commit.application_id))?;
        application.current_status_id = Some(status.id);
        application.current_stage_id = Some(commit.stage_id);
        if let Some(pinned) = commit.pin_workflow {
            application.workflow = Some(pinned);
        }

        Ok((application.clone(), status))
    }
}
