// Stage registry - versioned workflow templates and the active one per application type

//! # Stage Registry
//!
//! The registry answers "which workflow applies to this application type" and
//! "what does stage X look like". It is a read-through cache over a
//! [`WorkflowRepository`]:
//!
//! - Every registration stores a new immutable **version** of a workflow
//! - Exactly one workflow id is **active** per application type; activating a
//!   workflow deactivates the previous one in the same repository operation
//! - Applications pin `(workflow_id, version)` and read that snapshot for the
//!   rest of their life, so edits never reshape in-flight applications
//!
//! ## Cache Invalidation
//!
//! Active-workflow lookups are cached per application type. Registering or
//! activating a workflow drops the affected entry; [`StageRegistry::invalidate`]
//! drops everything (used after out-of-band edits to the backing store).
//! Pinned snapshots never change, so they are cached without invalidation.
//!
//! Every activation change also bumps an epoch counter. A lookup that read the
//! repository under an older epoch withdraws what it cached, so a reader that
//! races an activation can never leave the deactivated workflow behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use super::lock_poisoned;
use super::transitions::TransitionRuleSet;
use crate::models::{StageId, TransitionFilter, Workflow, WorkflowId, WorkflowRef, WorkflowStage, WorkflowTransition};
use crate::{Result, WorkflowError};

/// Durable storage for workflow versions and activation state
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Store a new version; `workflow.version` is already assigned
    async fn save_version(&self, workflow: Workflow) -> Result<()>;

    async fn get_version(&self, workflow_id: &WorkflowId, version: u32) -> Result<Option<Workflow>>;

    async fn latest_version(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>>;

    /// Latest version of every workflow
    async fn list_latest(&self) -> Result<Vec<Workflow>>;

    /// Make `workflow_id` the only active workflow for `application_type`,
    /// or clear activation when `None`. Must be atomic.
    async fn set_active(&self, application_type: &str, workflow_id: Option<&WorkflowId>) -> Result<()>;

    async fn active_for(&self, application_type: &str) -> Result<Option<WorkflowId>>;
}

#[derive(Default)]
struct RepositoryState {
    versions: HashMap<WorkflowId, Vec<Workflow>>,
    active: HashMap<String, WorkflowId>,
}

impl RepositoryState {
    /// Returned copies carry the current activation flag
    fn with_activation(&self, mut workflow: Workflow) -> Workflow {
        workflow.is_active = self.active.get(&workflow.application_type) == Some(&workflow.id);
        workflow
    }
}

/// In-memory workflow repository
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_version(&self, workflow: Workflow) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let versions = state.versions.entry(workflow.id.clone()).or_default();
        if versions.iter().any(|w| w.version == workflow.version) {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "version {} of workflow '{}' already exists",
                workflow.version, workflow.id
            )));
        }
        versions.push(workflow);
        Ok(())
    }

    async fn get_version(&self, workflow_id: &WorkflowId, version: u32) -> Result<Option<Workflow>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state
            .versions
            .get(workflow_id)
            .and_then(|vs| vs.iter().find(|w| w.version == version))
            .map(|w| state.with_activation(w.clone())))
    }

    async fn latest_version(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state
            .versions
            .get(workflow_id)
            .and_then(|vs| vs.iter().max_by_key(|w| w.version))
            .map(|w| state.with_activation(w.clone())))
    }

    async fn list_latest(&self) -> Result<Vec<Workflow>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        let mut latest: Vec<Workflow> = state
            .versions
            .values()
            .filter_map(|vs| vs.iter().max_by_key(|w| w.version))
            .map(|w| state.with_activation(w.clone()))
            .collect();
        latest.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(latest)
    }

    async fn set_active(&self, application_type: &str, workflow_id: Option<&WorkflowId>) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        match workflow_id {
            Some(id) => {
                state.active.insert(application_type.to_string(), id.clone());
            }
            None => {
                state.active.remove(application_type);
            }
        }
        Ok(())
    }

    async fn active_for(&self, application_type: &str) -> Result<Option<WorkflowId>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state.active.get(application_type).cloned())
    }
}

/// Read-through registry of workflow snapshots
pub struct StageRegistry {
    repository: Arc<dyn WorkflowRepository>,
    cache_enabled: bool,
    active_cache: DashMap<String, Arc<Workflow>>,
    snapshot_cache: DashMap<WorkflowRef, Arc<Workflow>>,
    /// Bumped after every change to activation state, before cache removal
    epoch: AtomicU64,
}

impl StageRegistry {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self {
            repository,
            cache_enabled: true,
            active_cache: DashMap::new(),
            snapshot_cache: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Registry over a fresh in-memory repository
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWorkflowRepository::new()))
    }

    /// Disable caching so every call reads through to the repository
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Validate and store a new version of a workflow
    ///
    /// The first registration of an id gets version 1; each later one gets the
    /// next version. A workflow registered with `is_active = true` is activated.
    pub async fn register_workflow(&self, mut workflow: Workflow) -> Result<Arc<Workflow>> {
        workflow.validate().map_err(WorkflowError::InvalidWorkflow)?;

        let previous = self.repository.latest_version(&workflow.id).await?;
        if let Some(prev) = &previous {
            if prev.application_type != workflow.application_type {
                return Err(WorkflowError::InvalidWorkflow(format!(
                    "workflow '{}' serves '{}' and cannot be moved to '{}'",
                    workflow.id, prev.application_type, workflow.application_type
                )));
            }
        }

        workflow.version = previous.map_or(1, |p| p.version + 1);
        let activate = workflow.is_active;
        let reference = WorkflowRef::new(workflow.id.clone(), workflow.version);

        self.repository.save_version(workflow).await?;
        self.bump_epoch();
        self.active_cache.retain(|_, w| w.id != reference.workflow_id);
        info!(workflow = %reference, "registered workflow version");

        if activate {
            self.activate_workflow(&reference.workflow_id).await?;
        }

        self.get_workflow_version(&reference).await
    }

    /// Make a workflow the single active one for its application type
    pub async fn activate_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let workflow = self
            .repository
            .latest_version(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))?;

        let previous = self.repository.active_for(&workflow.application_type).await?;
        self.repository
            .set_active(&workflow.application_type, Some(workflow_id))
            .await?;
        self.bump_epoch();
        self.active_cache.remove(&workflow.application_type);

        info!(
            workflow_id = %workflow_id,
            application_type = %workflow.application_type,
            replaced = ?previous,
            "activated workflow"
        );
        Ok(())
    }

    /// Deactivate a workflow; its application type is left without one
    pub async fn deactivate_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let workflow = self
            .repository
            .latest_version(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))?;

        if self.repository.active_for(&workflow.application_type).await?.as_ref() == Some(workflow_id) {
            self.repository.set_active(&workflow.application_type, None).await?;
            self.bump_epoch();
            self.active_cache.remove(&workflow.application_type);
            info!(workflow_id = %workflow_id, "deactivated workflow");
        }
        Ok(())
    }

    /// Drop every cached active-workflow lookup and pinned snapshot
    pub fn invalidate(&self) {
        self.bump_epoch();
        self.active_cache.clear();
        self.snapshot_cache.clear();
    }

    /// The active workflow for an application type
    ///
    /// Fails with `WorkflowNotFound` when none is configured; callers treat
    /// that as "workflow feature unavailable" rather than a failure.
    pub async fn get_active_workflow(&self, application_type: &str) -> Result<Arc<Workflow>> {
        if self.cache_enabled {
            if let Some(hit) = self.active_cache.get(application_type) {
                return Ok(hit.value().clone());
            }
        }

        let observed = self.epoch.load(Ordering::SeqCst);
        let workflow_id = self
            .repository
            .active_for(application_type)
            .await?
            .ok_or_else(|| {
                WorkflowError::WorkflowNotFound(format!(
                    "no active workflow for application type '{}'",
                    application_type
                ))
            })?;

        let workflow = Arc::new(
            self.repository
                .latest_version(&workflow_id)
                .await?
                .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))?,
        );

        if self.cache_enabled {
            self.active_cache
                .insert(application_type.to_string(), workflow.clone());
            // Activation changed while we were reading; our entry may be stale
            if self.epoch.load(Ordering::SeqCst) != observed {
                self.active_cache
                    .remove_if(application_type, |_, cached| Arc::ptr_eq(cached, &workflow));
            }
        }
        debug!(application_type, workflow = %workflow.id, version = workflow.version, "resolved active workflow");
        Ok(workflow)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Latest version of a workflow
    pub async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Arc<Workflow>> {
        self.repository
            .latest_version(workflow_id)
            .await?
            .map(Arc::new)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// A pinned snapshot
    pub async fn get_workflow_version(&self, reference: &WorkflowRef) -> Result<Arc<Workflow>> {
        if self.cache_enabled {
            if let Some(hit) = self.snapshot_cache.get(reference) {
                return Ok(hit.value().clone());
            }
        }

        let workflow = Arc::new(
            self.repository
                .get_version(&reference.workflow_id, reference.version)
                .await?
                .ok_or_else(|| WorkflowError::WorkflowNotFound(reference.to_string()))?,
        );

        if self.cache_enabled {
            self.snapshot_cache.insert(reference.clone(), workflow.clone());
        }
        Ok(workflow)
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.repository.list_latest().await
    }

    /// Stages of the latest version, ordered by `sequence`
    pub async fn get_stages(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowStage>> {
        let workflow = self.get_workflow(workflow_id).await?;
        Ok(workflow.stages_in_order().into_iter().cloned().collect())
    }

    /// Find a stage in the latest version of any workflow, active ones first
    pub async fn get_stage(&self, stage_id: &StageId) -> Result<WorkflowStage> {
        let mut workflows = self.repository.list_latest().await?;
        workflows.sort_by_key(|w| !w.is_active);

        workflows
            .iter()
            .find_map(|w| w.stage(stage_id).cloned())
            .ok_or_else(|| WorkflowError::StageNotFound(stage_id.to_string()))
    }

    /// Edge queries over the latest version of a workflow
    pub async fn rule_set(&self, workflow_id: &WorkflowId) -> Result<TransitionRuleSet> {
        Ok(TransitionRuleSet::new(self.get_workflow(workflow_id).await?))
    }

    /// Transitions of the latest version matching `filter`
    pub async fn get_transitions(
        &self,
        workflow_id: &WorkflowId,
        filter: &TransitionFilter,
    ) -> Result<Vec<WorkflowTransition>> {
        Ok(self
            .rule_set(workflow_id)
            .await?
            .get_transitions(filter)
            .into_iter()
            .cloned()
            .collect())
    }
}
