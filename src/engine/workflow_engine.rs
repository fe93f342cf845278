// Workflow engine - the orchestrator over registry, resolver and storage

//! # Workflow Engine
//!
//! Every state change an application goes through passes through here:
//!
//! 1. **Initialize**: find the active workflow for the application type, pin
//!    its version and record the start stage
//! 2. **Execute**: validate a manual move against the edge set and the actor's
//!    permissions, then apply it
//! 3. **Check automatic**: apply at most one automatic transition whose
//!    conditions hold (first match wins)
//! 4. **Submit**: run the strict completeness check and leave draft state
//!
//! ## Write Path
//!
//! Applying a transition is one atomic store commit (new status row plus
//! pointer move, guarded by the pointer value the decision was based on).
//! Only after it commits do side effects run, in order:
//!
//! - audit entry (`application`, before, after), exactly once
//! - `ApplicationStatusChanged` on the event bus
//! - the new stage's notification triggers, fire-and-forget
//!
//! Side-effect failures are logged and never undo or fail the transition.
//!
//! ## Rust Learning Notes:
//!
//! ### Builder with In-Memory Defaults
//! `WorkflowEngineBuilder` stores `Option<Arc<dyn Trait>>` for every
//! collaborator and fills the gaps with in-memory implementations in
//! `build()`. Tests override just the pieces they want to observe.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::EventBus;
use super::ports::{
    ActionChecker, AuditLogger, DocumentStore, InMemoryActionChecker, InMemoryAuditLogger,
    InMemoryDocumentStore, InMemoryNotificationDispatcher, InMemoryPermissionStore,
    NotificationDispatcher, PermissionStore,
};
use super::registry::StageRegistry;
use super::requirements::{RequirementCheck, RequirementEvaluator};
use super::resolver::{TransitionResolver, WorkflowEvaluationResult};
use super::storage::{ApplicationStore, InMemoryApplicationStore, StatusCommit};
use super::transitions::TransitionRuleSet;
use crate::models::{
    latest_status, Actor, Application, ApplicationStatus, ApplicationStatusChangedEvent,
    ApplicationSubmittedEvent, NotificationRecipient, StageId, TransitionId, Workflow,
    WorkflowRef, WorkflowStage, WorkflowTransition, STAGE_ENTERED,
};
use crate::{Result, WorkflowError};

/// Permission letting staff submit on an applicant's behalf
pub const SUBMIT_ON_BEHALF_PERMISSION: &str = "applications.submit";

/// The latest status of an application with its stage resolved
///
/// `stage` is `None` when the recorded stage id no longer resolves; history
/// keeps stage ids as weak references.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentStatus {
    pub status: ApplicationStatus,
    pub stage: Option<WorkflowStage>,
    pub workflow: Option<WorkflowRef>,
    pub is_terminal: bool,
}

/// Where an initialized application sits
struct Position {
    workflow: Arc<Workflow>,
    stage: WorkflowStage,
}

/// Transition being applied, with its provenance
struct Move<'a> {
    from: Option<&'a StageId>,
    to: &'a WorkflowStage,
    transition_id: Option<&'a TransitionId>,
    actor: Option<&'a Actor>,
    notes: Option<String>,
    pin: Option<WorkflowRef>,
}

/// Orchestrates initialization, transitions and submission
pub struct WorkflowEngine {
    registry: Arc<StageRegistry>,
    store: Arc<dyn ApplicationStore>,
    resolver: TransitionResolver,
    permissions: Arc<dyn PermissionStore>,
    notifications: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditLogger>,
    events: EventBus,
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn resolver(&self) -> &TransitionResolver {
        &self.resolver
    }

    /// Store a new draft application
    pub async fn create_application(&self, application: Application) -> Result<Application> {
        let created = self.store.create_application(application).await?;
        info!(application_id = %created.id, application_type = %created.application_type, "application created");
        Ok(created)
    }

    pub async fn get_application(&self, application_id: Uuid) -> Result<Application> {
        self.store
            .get_application(application_id)
            .await?
            .ok_or(WorkflowError::ApplicationNotFound(application_id))
    }

    /// Record the initial status for an application
    ///
    /// Returns `false` when no workflow is active for the application type
    /// (workflows are optional per type). Calling it again after success is a
    /// no-op that returns `true`.
    pub async fn initialize_application_workflow(
        &self,
        application_id: Uuid,
        actor: Option<&Actor>,
    ) -> Result<bool> {
        let application = self.get_application(application_id).await?;
        if application.current_status_id.is_some() {
            debug!(%application_id, "workflow already initialized");
            return Ok(true);
        }

        let workflow = match self.registry.get_active_workflow(&application.application_type).await {
            Ok(workflow) => workflow,
            Err(WorkflowError::WorkflowNotFound(_)) => {
                info!(
                    %application_id,
                    application_type = %application.application_type,
                    "no active workflow, skipping initialization"
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let start = workflow.start_stage().ok_or_else(|| {
            WorkflowError::InvalidWorkflow(format!("workflow '{}' has no start stage", workflow.id))
        })?;

        let applied = self
            .apply(
                &application,
                Move {
                    from: None,
                    to: start,
                    transition_id: None,
                    actor,
                    notes: Some("Application workflow initialized".to_string()),
                    pin: Some(WorkflowRef::new(workflow.id.clone(), workflow.version)),
                },
            )
            .await;

        match applied {
            Ok(_) => Ok(true),
            // A concurrent initializer got there first
            Err(WorkflowError::ConcurrentModification { .. }) => {
                let reloaded = self.get_application(application_id).await?;
                Ok(reloaded.current_status_id.is_some())
            }
            Err(e) => Err(e),
        }
    }

    /// Move an application along a manual edge on behalf of `actor`
    ///
    /// Fails with `InvalidTransition` when no manual edge leads from the
    /// current stage to the target, and with `Authorization` when such edges
    /// exist but the actor lacks permissions for every one of them.
    pub async fn execute_transition(
        &self,
        application_id: Uuid,
        target_stage_id: &StageId,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<ApplicationStatus> {
        let application = self.get_application(application_id).await?;
        let position = self.position(&application).await?.ok_or_else(|| WorkflowError::InvalidTransition {
            from: "(uninitialized)".to_string(),
            to: target_stage_id.to_string(),
            reason: "application workflow has not been initialized".to_string(),
        })?;

        let rules = TransitionRuleSet::new(position.workflow.clone());
        let transition = self
            .authorize_manual(&rules, &position.stage.id, target_stage_id, actor)
            .await?;

        let target = position
            .workflow
            .stage(&transition.target_stage_id)
            .ok_or_else(|| WorkflowError::StageNotFound(transition.target_stage_id.to_string()))?;

        self.apply(
            &application,
            Move {
                from: Some(&position.stage.id),
                to: target,
                transition_id: Some(&transition.id),
                actor: Some(actor),
                notes,
                pin: None,
            },
        )
        .await
    }

    /// Apply at most one eligible automatic transition
    ///
    /// Returns `false` with no state change when nothing is eligible, so it is
    /// safe to call after every document upload or status poll.
    pub async fn check_automatic_transitions(&self, application_id: Uuid) -> Result<bool> {
        let application = self.get_application(application_id).await?;
        let Some(position) = self.position(&application).await? else {
            return Ok(false);
        };

        let rules = TransitionRuleSet::new(position.workflow.clone());
        let Some(transition) = self
            .resolver
            .resolve_automatic(&application, &rules, &position.stage)
            .await?
        else {
            return Ok(false);
        };

        let target = position
            .workflow
            .stage(&transition.target_stage_id)
            .ok_or_else(|| WorkflowError::StageNotFound(transition.target_stage_id.to_string()))?;

        self.apply(
            &application,
            Move {
                from: Some(&position.stage.id),
                to: target,
                transition_id: Some(&transition.id),
                actor: None,
                notes: Some(format!("Automatic transition: {}", transition.name)),
                pin: None,
            },
        )
        .await?;
        Ok(true)
    }

    /// Manual transitions the actor may fire from the current stage
    pub async fn available_transitions(
        &self,
        application_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<WorkflowTransition>> {
        let application = self.get_application(application_id).await?;
        match self.position(&application).await? {
            Some(position) => {
                let rules = TransitionRuleSet::new(position.workflow.clone());
                self.resolver
                    .available_transitions(&rules, &position.stage, actor)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Per-transition report for the current stage
    pub async fn evaluate_transitions(
        &self,
        application_id: Uuid,
        actor: Option<&Actor>,
    ) -> Result<Option<WorkflowEvaluationResult>> {
        let application = self.get_application(application_id).await?;
        let Some(position) = self.position(&application).await? else {
            return Ok(None);
        };

        let rules = TransitionRuleSet::new(position.workflow.clone());
        self.resolver
            .evaluate_transitions(&application, &rules, &position.stage, actor)
            .await
            .map(Some)
    }

    /// Requirement check for the current stage; `None` before initialization
    pub async fn evaluate_requirements(&self, application_id: Uuid) -> Result<Option<RequirementCheck>> {
        let application = self.get_application(application_id).await?;
        match self.position(&application).await? {
            Some(position) => self
                .resolver
                .requirements()
                .evaluate(&application, &position.stage)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// The most recent status with its stage resolved
    pub async fn current_status(&self, application_id: Uuid) -> Result<Option<CurrentStatus>> {
        let application = self.get_application(application_id).await?;
        let history = self.store.list_statuses(application_id).await?;
        let Some(status) = latest_status(&history).cloned() else {
            return Ok(None);
        };

        let workflow = match &application.workflow {
            Some(reference) => Some(self.registry.get_workflow_version(reference).await?),
            None => None,
        };
        let stage = workflow
            .as_ref()
            .and_then(|w| w.stage(&status.workflow_stage_id).cloned());
        let is_terminal = workflow
            .as_ref()
            .map_or(false, |w| stage.is_some() && w.is_terminal(&status.workflow_stage_id));

        if stage.is_none() {
            warn!(%application_id, stage = %status.workflow_stage_id, "status references an unknown stage");
        }

        Ok(Some(CurrentStatus {
            status,
            stage,
            workflow: application.workflow,
            is_terminal,
        }))
    }

    /// Full status history, oldest first
    pub async fn status_history(&self, application_id: Uuid) -> Result<Vec<ApplicationStatus>> {
        self.get_application(application_id).await?;
        self.store.list_statuses(application_id).await
    }

    /// Set a condition-visible attribute (e.g. `decision`) and re-check
    /// automatic transitions
    pub async fn set_attribute(
        &self,
        application_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<bool> {
        self.store.set_attribute(application_id, key, value).await?;
        self.check_automatic_transitions(application_id).await
    }

    /// Leave draft state after the strict completeness check
    ///
    /// The applicant may always submit; anyone else needs
    /// [`SUBMIT_ON_BEHALF_PERMISSION`]. The completeness check runs against
    /// the current stage, or the start stage of the active workflow when the
    /// application has not been initialized yet. Afterwards the workflow is
    /// initialized if needed and automatic transitions are checked.
    pub async fn submit_application(&self, application_id: Uuid, actor: &Actor) -> Result<Application> {
        let application = self.get_application(application_id).await?;
        if application.is_submitted {
            return Ok(application);
        }

        if actor.user_id != application.applicant_id
            && !self
                .permissions
                .actor_has_permission(actor, SUBMIT_ON_BEHALF_PERMISSION)
                .await?
        {
            return Err(WorkflowError::Authorization {
                transition: "submit".to_string(),
                missing: vec![SUBMIT_ON_BEHALF_PERMISSION.to_string()],
            });
        }

        let gate = match self.position(&application).await? {
            Some(position) => Some(position.stage),
            None => match self.registry.get_active_workflow(&application.application_type).await {
                Ok(workflow) => workflow.start_stage().cloned(),
                Err(WorkflowError::WorkflowNotFound(_)) => None,
                Err(e) => return Err(e),
            },
        };
        if let Some(stage) = &gate {
            self.resolver
                .requirements()
                .check_application_complete(&application, stage)
                .await?;
        }

        let (submitted, changed) = self.store.mark_submitted(application_id).await?;
        if !changed {
            // A concurrent submit won; it owns the side effects
            debug!(%application_id, "application already submitted");
            return Ok(submitted);
        }
        info!(%application_id, actor = %actor.user_id, "application submitted");

        if let Err(e) = self
            .audit
            .log_update(
                "application",
                &application_id.to_string(),
                json!({ "is_submitted": false }),
                json!({ "is_submitted": true }),
            )
            .await
        {
            error!(%application_id, error = %e, "audit log failed for submission");
        }

        self.events.emit_submitted(ApplicationSubmittedEvent {
            application_id,
            applicant_id: submitted.applicant_id,
            actor_id: actor.user_id,
            occurred_at: Utc::now(),
        });

        self.initialize_application_workflow(application_id, Some(actor)).await?;
        self.check_automatic_transitions(application_id).await?;

        self.get_application(application_id).await
    }

    /// Resolve the pinned workflow and current stage
    async fn position(&self, application: &Application) -> Result<Option<Position>> {
        let (Some(reference), Some(stage_id)) = (&application.workflow, &application.current_stage_id) else {
            return Ok(None);
        };

        let workflow = self.registry.get_workflow_version(reference).await?;
        let stage = workflow.stage(stage_id).cloned().ok_or_else(|| {
            WorkflowError::StageNotFound(format!("{} in workflow {}", stage_id, reference))
        })?;

        Ok(Some(Position { workflow, stage }))
    }

    /// Pick the manual edge `actor` may fire from `from` to `to`
    async fn authorize_manual(
        &self,
        rules: &TransitionRuleSet,
        from: &StageId,
        to: &StageId,
        actor: &Actor,
    ) -> Result<WorkflowTransition> {
        let edges = rules.find_edges(from, to);
        if edges.is_empty() {
            return Err(WorkflowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: "no transition is defined between these stages".to_string(),
            });
        }

        let manual: Vec<&WorkflowTransition> = edges.into_iter().filter(|t| !t.is_automatic).collect();
        let Some(first) = manual.first() else {
            return Err(WorkflowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: "only automatic transitions lead to this stage".to_string(),
            });
        };

        let mut first_missing = None;
        for transition in &manual {
            let missing = self.resolver.missing_permissions(transition, actor).await?;
            if missing.is_empty() {
                return Ok((*transition).clone());
            }
            first_missing.get_or_insert(missing);
        }

        debug!(actor = %actor.user_id, transition = %first.id, "actor lacks permissions");
        Err(WorkflowError::Authorization {
            transition: first.id.to_string(),
            missing: first_missing.unwrap_or_default(),
        })
    }

    /// Commit a status change, then run side effects
    async fn apply(&self, application: &Application, step: Move<'_>) -> Result<ApplicationStatus> {
        let commit = StatusCommit {
            application_id: application.id,
            expected_status_id: application.current_status_id,
            stage_id: step.to.id.clone(),
            status: step.to.name.clone(),
            notes: step.notes,
            created_by: step.actor.map(|a| a.user_id),
            pin_workflow: step.pin,
        };

        let (updated, status) = self.store.commit_transition(commit).await?;
        info!(
            application_id = %application.id,
            from = ?step.from.map(|s| s.as_str()),
            to = %step.to.id,
            transition = ?step.transition_id.map(|t| t.as_str()),
            actor = ?step.actor.map(|a| a.user_id),
            status_id = status.id,
            "application status changed"
        );

        self.audit_transition(application, &updated).await;

        self.events.emit_status_changed(ApplicationStatusChangedEvent {
            application_id: application.id,
            old_stage_id: step.from.cloned(),
            new_stage_id: step.to.id.clone(),
            transition_id: step.transition_id.cloned(),
            status_id: status.id,
            actor_id: step.actor.map(|a| a.user_id),
            occurred_at: status.created_at,
        });

        self.notify_stage_entered(&updated, step.to, step.actor, &status).await;

        Ok(status)
    }

    async fn audit_transition(&self, before: &Application, after: &Application) {
        let snapshot = |app: &Application| {
            json!({
                "current_status_id": app.current_status_id,
                "current_stage_id": app.current_stage_id,
                "workflow": app.workflow.as_ref().map(|w| w.to_string()),
            })
        };

        if let Err(e) = self
            .audit
            .log_update("application", &before.id.to_string(), snapshot(before), snapshot(after))
            .await
        {
            error!(application_id = %before.id, error = %e, "audit log failed for transition");
        }
    }

    /// Fan out the stage's `stage_entered` triggers; failures are only logged
    async fn notify_stage_entered(
        &self,
        application: &Application,
        stage: &WorkflowStage,
        actor: Option<&Actor>,
        status: &ApplicationStatus,
    ) {
        let recipients: Vec<(Uuid, &str)> = stage
            .notification_triggers
            .iter()
            .filter(|t| t.event == STAGE_ENTERED)
            .filter_map(|t| {
                let user_id = match &t.recipient {
                    NotificationRecipient::Applicant => Some(application.applicant_id),
                    NotificationRecipient::Actor => actor.map(|a| a.user_id),
                    NotificationRecipient::User { user_id } => Some(*user_id),
                };
                user_id.map(|u| (u, t.subject.as_str()))
            })
            .collect();

        if recipients.is_empty() {
            return;
        }

        let payload = json!({
            "application_id": application.id,
            "stage_id": stage.id,
            "stage_name": stage.name,
            "status_id": status.id,
        });

        let deliveries = recipients.iter().map(|(user_id, subject)| {
            self.notifications
                .notify(*user_id, STAGE_ENTERED, subject, payload.clone())
        });

        for ((user_id, _), outcome) in recipients.iter().zip(join_all(deliveries).await) {
            if let Err(e) = outcome {
                warn!(application_id = %application.id, %user_id, error = %e, "notification delivery failed");
            }
        }
    }
}

/// Assembles a [`WorkflowEngine`]; unset collaborators default to in-memory ones
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    registry: Option<Arc<StageRegistry>>,
    store: Option<Arc<dyn ApplicationStore>>,
    documents: Option<Arc<dyn DocumentStore>>,
    actions: Option<Arc<dyn ActionChecker>>,
    permissions: Option<Arc<dyn PermissionStore>>,
    notifications: Option<Arc<dyn NotificationDispatcher>>,
    audit: Option<Arc<dyn AuditLogger>>,
    events: Option<EventBus>,
}

impl WorkflowEngineBuilder {
    pub fn registry(mut self, registry: Arc<StageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn ApplicationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn actions(mut self, actions: Arc<dyn ActionChecker>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionStore>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn notifications(mut self, notifications: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let documents = self
            .documents
            .unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new()));
        let actions = self
            .actions
            .unwrap_or_else(|| Arc::new(InMemoryActionChecker::new()));
        let permissions = self
            .permissions
            .unwrap_or_else(|| Arc::new(InMemoryPermissionStore::new()));

        let requirements = RequirementEvaluator::new(documents, actions);

        WorkflowEngine {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(StageRegistry::in_memory())),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryApplicationStore::new())),
            resolver: TransitionResolver::new(requirements, permissions.clone()),
            permissions,
            notifications: self
                .notifications
                .unwrap_or_else(|| Arc::new(InMemoryNotificationDispatcher::new())),
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(InMemoryAuditLogger::new())),
            events: self.events.unwrap_or_default(),
        }
    }
}
