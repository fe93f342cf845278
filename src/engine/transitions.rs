// Transition rule set - edge queries over one workflow snapshot

//! # Transition Rule Set
//!
//! Wraps a workflow snapshot and answers edge questions: what leaves this
//! stage, what enters it, is there an edge from A to B.
//!
//! Only explicitly configured transitions are returned. Adjacency by stage
//! `sequence` is never treated as an edge, so a workflow that wants
//! "submitted → review" must declare it.
//!
//! ## Rust Learning Notes:
//!
//! ### Lifetimes Tied to `&self`
//! Query methods return `Vec<&WorkflowTransition>` borrowing from the
//! snapshot held in `self`. The `Arc<Workflow>` keeps the snapshot alive for
//! as long as the rule set exists, so no cloning happens per query.

use std::sync::Arc;

use crate::models::{StageId, TransitionFilter, Workflow, WorkflowTransition};

/// Edge queries over a workflow snapshot
#[derive(Debug, Clone)]
pub struct TransitionRuleSet {
    workflow: Arc<Workflow>,
}

impl TransitionRuleSet {
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Transitions matching every set field of `filter`, in definition order
    pub fn get_transitions(&self, filter: &TransitionFilter) -> Vec<&WorkflowTransition> {
        self.workflow
            .transitions
            .iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    pub fn get_outgoing(&self, stage_id: &StageId) -> Vec<&WorkflowTransition> {
        self.get_transitions(&TransitionFilter::from_stage(stage_id))
    }

    pub fn get_incoming(&self, stage_id: &StageId) -> Vec<&WorkflowTransition> {
        self.get_transitions(&TransitionFilter::to_stage(stage_id))
    }

    /// Outgoing automatic transitions; definition order is evaluation order
    pub fn automatic_from(&self, stage_id: &StageId) -> Vec<&WorkflowTransition> {
        self.get_transitions(&TransitionFilter::from_stage(stage_id).automatic(true))
    }

    /// Outgoing manual transitions
    pub fn manual_from(&self, stage_id: &StageId) -> Vec<&WorkflowTransition> {
        self.get_transitions(&TransitionFilter::from_stage(stage_id).automatic(false))
    }

    /// Every edge from `source` to `target`
    ///
    /// More than one edge may connect the same pair (e.g. with different
    /// permission requirements), so this returns all of them.
    pub fn find_edges(&self, source: &StageId, target: &StageId) -> Vec<&WorkflowTransition> {
        self.get_transitions(&TransitionFilter {
            source_stage_id: Some(source.clone()),
            target_stage_id: Some(target.clone()),
            is_automatic: None,
        })
    }
}
