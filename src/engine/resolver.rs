// Transition resolver - which edges an actor or the system may follow

//! # Transition Resolver
//!
//! Decides, for an application sitting in a stage:
//!
//! - **Manual availability**: outgoing non-automatic edges whose
//!   `required_permissions` the actor holds in full (empty set ⇒ anyone),
//!   in definition order
//! - **Automatic eligibility**: outgoing automatic edges evaluated in
//!   definition order; the **first** edge whose whole condition list holds is
//!   selected, later matches are ignored
//!
//! Conditions are evaluated against a [`ConditionContext`] built fresh per
//! call from the application's attributes and the stage's requirement state.
//!
//! ## Rust Learning Notes:
//!
//! ### Early Return for First-Match
//! `resolve_automatic` returns from inside the loop on the first passing
//! edge. Iterator adaptors like `find` would read nicely too, but the
//! condition validation step needs `?`, which plain loops handle directly.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::ports::PermissionStore;
use super::requirements::RequirementEvaluator;
use super::transitions::TransitionRuleSet;
use crate::models::{
    keys, Actor, Application, ConditionContext, ConditionEvaluation, StageId, TransitionId,
    WorkflowId, WorkflowStage, WorkflowTransition,
};
use crate::{Result, WorkflowError};

/// Why a single transition can or cannot fire right now
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvaluation {
    pub transition_id: TransitionId,
    pub name: String,
    pub target_stage_id: StageId,
    pub is_automatic: bool,
    pub can_fire: bool,

    /// Automatic edge that `check_automatic_transitions` would apply
    pub selected: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_permissions: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionEvaluation>,

    pub explanation: String,
}

/// Report over every outgoing transition of the current stage
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvaluationResult {
    pub workflow_id: WorkflowId,
    pub application_id: Uuid,
    pub current_stage: StageId,
    pub transition_results: Vec<TransitionEvaluation>,
    pub available_count: usize,
    pub blocked_count: usize,
}

/// Computes manual availability and automatic eligibility
#[derive(Clone)]
pub struct TransitionResolver {
    requirements: RequirementEvaluator,
    permissions: Arc<dyn PermissionStore>,
}

impl TransitionResolver {
    pub fn new(requirements: RequirementEvaluator, permissions: Arc<dyn PermissionStore>) -> Self {
        Self {
            requirements,
            permissions,
        }
    }

    pub fn requirements(&self) -> &RequirementEvaluator {
        &self.requirements
    }

    /// Build the condition context for `application` sitting in `stage`
    ///
    /// Application attributes go in first so the reserved keys always win.
    pub async fn build_context(&self, application: &Application, stage: &WorkflowStage) -> Result<ConditionContext> {
        let mut context: ConditionContext = application.attributes.clone();

        let check = self.requirements.evaluate(application, stage).await?;
        let states = self.requirements.document_states(application, stage).await?;

        let all_uploaded = states.iter().all(|(_, uploaded, _)| *uploaded);
        let all_verified = states.iter().all(|(_, _, verified)| *verified);
        for (document_type, uploaded, verified) in states {
            context.insert(keys::document_uploaded(&document_type), uploaded.into());
            context.insert(keys::document_verified(&document_type), verified.into());
        }

        context.insert(keys::REQUIREMENTS_MET.to_string(), check.met.into());
        context.insert(keys::ALL_DOCUMENTS_UPLOADED.to_string(), all_uploaded.into());
        context.insert(keys::ALL_DOCUMENTS_VERIFIED.to_string(), all_verified.into());
        context.insert(keys::IS_SUBMITTED.to_string(), application.is_submitted.into());
        context.insert(keys::CURRENT_STAGE.to_string(), stage.id.as_str().into());

        Ok(context)
    }

    /// Which of the permissions `transition` requires the actor holds
    async fn held_permissions(&self, transition: &WorkflowTransition, actor: &Actor) -> Result<BTreeSet<String>> {
        let mut held = BTreeSet::new();
        for permission in &transition.required_permissions {
            if self.permissions.actor_has_permission(actor, permission).await? {
                held.insert(permission.clone());
            }
        }
        Ok(held)
    }

    /// Required permissions of `transition` the actor does not hold
    pub async fn missing_permissions(&self, transition: &WorkflowTransition, actor: &Actor) -> Result<Vec<String>> {
        let held = self.held_permissions(transition, actor).await?;
        Ok(transition.required_permissions.difference(&held).cloned().collect())
    }

    /// Manual transitions out of `stage` the actor may fire, in definition order
    pub async fn available_transitions(
        &self,
        rules: &TransitionRuleSet,
        stage: &WorkflowStage,
        actor: &Actor,
    ) -> Result<Vec<WorkflowTransition>> {
        let mut available = Vec::new();
        for transition in rules.manual_from(&stage.id) {
            if transition.permitted_for(&self.held_permissions(transition, actor).await?) {
                available.push(transition.clone());
            }
        }
        Ok(available)
    }

    /// The automatic transition to apply, if any (first match wins)
    pub async fn resolve_automatic(
        &self,
        application: &Application,
        rules: &TransitionRuleSet,
        stage: &WorkflowStage,
    ) -> Result<Option<WorkflowTransition>> {
        let candidates = rules.automatic_from(&stage.id);
        if candidates.is_empty() {
            return Ok(None);
        }

        let context = self.build_context(application, stage).await?;
        for transition in candidates {
            validate_conditions(transition)?;
            if transition.conditions_pass(&context) {
                debug!(
                    application_id = %application.id,
                    transition = %transition.id,
                    "automatic transition eligible"
                );
                return Ok(Some(transition.clone()));
            }
        }

        debug!(application_id = %application.id, stage = %stage.id, "no automatic transition eligible");
        Ok(None)
    }

    /// Detailed report for every outgoing transition of `stage`
    ///
    /// Manual edges are judged against `actor` (blocked when `None`);
    /// automatic edges against the condition context.
    pub async fn evaluate_transitions(
        &self,
        application: &Application,
        rules: &TransitionRuleSet,
        stage: &WorkflowStage,
        actor: Option<&Actor>,
    ) -> Result<WorkflowEvaluationResult> {
        let context = self.build_context(application, stage).await?;
        let mut selected_found = false;
        let mut transition_results = Vec::new();

        for transition in rules.get_outgoing(&stage.id) {
            let result = if transition.is_automatic {
                validate_conditions(transition)?;
                let conditions = transition.explain_conditions(&context);
                let can_fire = conditions.iter().all(|c| c.passed);
                let selected = can_fire && !selected_found;
                selected_found |= selected;

                let explanation = match (can_fire, selected) {
                    (true, true) => "All conditions hold; this transition is applied next".to_string(),
                    (true, false) => "All conditions hold but an earlier automatic transition takes precedence".to_string(),
                    _ => "One or more conditions do not hold".to_string(),
                };

                TransitionEvaluation {
                    transition_id: transition.id.clone(),
                    name: transition.name.clone(),
                    target_stage_id: transition.target_stage_id.clone(),
                    is_automatic: true,
                    can_fire,
                    selected,
                    missing_permissions: Vec::new(),
                    conditions,
                    explanation,
                }
            } else {
                let missing_permissions = match actor {
                    Some(actor) => self.missing_permissions(transition, actor).await?,
                    None => transition.required_permissions.iter().cloned().collect(),
                };
                let can_fire = actor.is_some() && missing_permissions.is_empty();
                let explanation = if can_fire {
                    "Actor holds every required permission".to_string()
                } else if actor.is_none() {
                    "Manual transition requires an actor".to_string()
                } else {
                    format!("Missing permissions: {}", missing_permissions.join(", "))
                };

                TransitionEvaluation {
                    transition_id: transition.id.clone(),
                    name: transition.name.clone(),
                    target_stage_id: transition.target_stage_id.clone(),
                    is_automatic: false,
                    can_fire,
                    selected: false,
                    missing_permissions,
                    conditions: Vec::new(),
                    explanation,
                }
            };
            transition_results.push(result);
        }

        let available_count = transition_results.iter().filter(|r| r.can_fire).count();
        let blocked_count = transition_results.len() - available_count;

        Ok(WorkflowEvaluationResult {
            workflow_id: rules.workflow().id.clone(),
            application_id: application.id,
            current_stage: stage.id.clone(),
            transition_results,
            available_count,
            blocked_count,
        })
    }
}

fn validate_conditions(transition: &WorkflowTransition) -> Result<()> {
    for condition in &transition.transition_conditions {
        condition
            .validate()
            .map_err(|e| WorkflowError::MalformedCondition(format!("transition '{}': {}", transition.id, e)))?;
    }
    Ok(())
}
