// Transition definitions - the explicit edges between stages

//! # Workflow Transitions
//!
//! A `WorkflowTransition` is a directed edge from one stage to another.
//! Edges are the **only** source of legality: stage `sequence` numbers are
//! cosmetic (timeline ordering in the UI) and never imply a transition.
//!
//! Each edge is either:
//! - **Manual**: fired by a user who holds every permission in
//!   `required_permissions` (an empty set means anyone may fire it)
//! - **Automatic**: fired by the system when every condition in
//!   `transition_conditions` holds
//!
//! ## Rust Learning Notes:
//!
//! ### BTreeSet for Permission Sets
//! `BTreeSet` keeps permissions sorted and deduplicated, which gives stable
//! JSON output and makes `is_subset` checks straightforward.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::condition::{Condition, ConditionContext, ConditionEvaluation};
use super::ids::{StageId, TransitionId, WorkflowId};

/// A directed, optionally guarded edge between two stages of one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub id: TransitionId,

    /// Owning workflow; source and target must belong to it
    pub workflow_id: WorkflowId,

    pub source_stage_id: StageId,
    pub target_stage_id: StageId,

    /// Human-readable label ("Start review", "Admit")
    pub name: String,

    /// System-triggered edge evaluated against `transition_conditions`
    #[serde(default)]
    pub is_automatic: bool,

    /// Conditions that must all hold for an automatic edge to fire
    #[serde(default)]
    pub transition_conditions: Vec<Condition>,

    /// Permissions a user must hold to fire a manual edge
    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
}

impl WorkflowTransition {
    /// Create a manual transition with no permission requirements
    pub fn manual<W, T, S1, S2>(workflow_id: W, id: T, source: S1, target: S2) -> Self
    where
        W: Into<WorkflowId>,
        T: Into<TransitionId>,
        S1: Into<StageId>,
        S2: Into<StageId>,
    {
        let id = id.into();
        WorkflowTransition {
            name: id.to_string(),
            id,
            workflow_id: workflow_id.into(),
            source_stage_id: source.into(),
            target_stage_id: target.into(),
            is_automatic: false,
            transition_conditions: Vec::new(),
            required_permissions: BTreeSet::new(),
        }
    }

    /// Create an automatic transition guarded by the given conditions
    pub fn automatic<W, T, S1, S2>(
        workflow_id: W,
        id: T,
        source: S1,
        target: S2,
        conditions: Vec<Condition>,
    ) -> Self
    where
        W: Into<WorkflowId>,
        T: Into<TransitionId>,
        S1: Into<StageId>,
        S2: Into<StageId>,
    {
        let mut transition = Self::manual(workflow_id, id, source, target);
        transition.is_automatic = true;
        transition.transition_conditions = conditions;
        transition
    }

    /// Set the display name (builder style)
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Require a permission to fire this edge (builder style)
    pub fn requires(mut self, permission: &str) -> Self {
        self.required_permissions.insert(permission.to_string());
        self
    }

    /// Whether the full condition list holds (empty list ⇒ true)
    pub fn conditions_pass(&self, context: &ConditionContext) -> bool {
        self.transition_conditions.iter().all(|c| c.evaluate(context))
    }

    /// Per-condition explanations, in definition order
    pub fn explain_conditions(&self, context: &ConditionContext) -> Vec<ConditionEvaluation> {
        self.transition_conditions
            .iter()
            .map(|c| c.explain(context))
            .collect()
    }

    /// Whether a holder of `permissions` may fire this edge
    pub fn permitted_for(&self, permissions: &BTreeSet<String>) -> bool {
        self.required_permissions.is_subset(permissions)
    }
}

/// Exact-match filter over transitions; `None` fields do not filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionFilter {
    pub source_stage_id: Option<StageId>,
    pub target_stage_id: Option<StageId>,
    pub is_automatic: Option<bool>,
}

impl TransitionFilter {
    pub fn from_stage(stage_id: &StageId) -> Self {
        Self {
            source_stage_id: Some(stage_id.clone()),
            ..Self::default()
        }
    }

    pub fn to_stage(stage_id: &StageId) -> Self {
        Self {
            target_stage_id: Some(stage_id.clone()),
            ..Self::default()
        }
    }

    pub fn automatic(mut self, is_automatic: bool) -> Self {
        self.is_automatic = Some(is_automatic);
        self
    }

    pub fn matches(&self, transition: &WorkflowTransition) -> bool {
        self.source_stage_id
            .as_ref()
            .map_or(true, |s| *s == transition.source_stage_id)
            && self
                .target_stage_id
                .as_ref()
                .map_or(true, |t| *t == transition.target_stage_id)
            && self
                .is_automatic
                .map_or(true, |a| a == transition.is_automatic)
    }
}
