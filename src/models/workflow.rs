// Workflow templates - stages, transitions and their structural rules

//! # Workflow Definitions
//!
//! A `Workflow` is a named, versioned template scoped to one application type
//! (e.g. "undergrad-fall"). It owns:
//! - **Stages**: the nodes, each declaring required documents, required
//!   actions and notification triggers
//! - **Transitions**: the explicit directed edges between stages
//!
//! ## State Machine Shape
//!
//! - **Initial stage**: `initial_stage` when configured, otherwise the single
//!   stage with no incoming transitions
//! - **Terminal stages**: stages with no outgoing transitions
//! - **Ordering**: `sequence` drives timelines in the UI only; branching and
//!   skipping (e.g. a rejection path past later stages) come from edges
//!
//! ## Versioning
//!
//! Workflows are immutable snapshots. Editing one means registering a new
//! `version` under the same id; applications pin the version they started on.
//!
//! ## Rust Learning Notes:
//!
//! This file leans on iterator adaptors and `HashSet` lookups the same way a
//! graph library would: validation is a single pass per collection and
//! reachability is an explicit depth-first search with a stack.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{StageId, WorkflowId};
use super::transition::WorkflowTransition;

/// Event name used by stage notification triggers when an application arrives
pub const STAGE_ENTERED: &str = "stage_entered";

/// Who receives a stage notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationRecipient {
    /// The applicant who owns the application
    Applicant,
    /// The user who fired the transition (skipped for automatic transitions)
    Actor,
    /// A fixed user, e.g. the admissions office inbox account
    User { user_id: Uuid },
}

/// A notification fired when an application reaches a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTrigger {
    /// Event the trigger listens for (currently only [`STAGE_ENTERED`])
    #[serde(default = "default_trigger_event")]
    pub event: String,
    pub recipient: NotificationRecipient,
    pub subject: String,
}

fn default_trigger_event() -> String {
    STAGE_ENTERED.to_string()
}

impl NotificationTrigger {
    pub fn on_enter(recipient: NotificationRecipient, subject: &str) -> Self {
        Self {
            event: STAGE_ENTERED.to_string(),
            recipient,
            subject: subject.to_string(),
        }
    }
}

/// A node in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: StageId,
    pub workflow_id: WorkflowId,
    pub name: String,

    /// Display ordering hint; unique within a workflow, never authoritative
    pub sequence: i32,

    /// Document types that must be uploaded before the stage is complete
    #[serde(default)]
    pub required_documents: BTreeSet<String>,

    /// Action identifiers checked by an external action checker
    #[serde(default)]
    pub required_actions: BTreeSet<String>,

    #[serde(default)]
    pub notification_triggers: Vec<NotificationTrigger>,
}

impl WorkflowStage {
    pub fn new<W: Into<WorkflowId>, S: Into<StageId>>(
        workflow_id: W,
        id: S,
        name: &str,
        sequence: i32,
    ) -> Self {
        WorkflowStage {
            id: id.into(),
            workflow_id: workflow_id.into(),
            name: name.to_string(),
            sequence,
            required_documents: BTreeSet::new(),
            required_actions: BTreeSet::new(),
            notification_triggers: Vec::new(),
        }
    }

    pub fn with_documents(mut self, documents: &[&str]) -> Self {
        self.required_documents
            .extend(documents.iter().map(|d| d.to_string()));
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.required_actions
            .extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_trigger(mut self, trigger: NotificationTrigger) -> Self {
        self.notification_triggers.push(trigger);
        self
    }
}

/// A versioned workflow template for one application type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,

    /// Application type this template serves, e.g. "undergrad-fall"
    pub application_type: String,

    /// At most one workflow per application type is active
    #[serde(default)]
    pub is_active: bool,

    /// Assigned by the registry on registration; 0 until then
    #[serde(default)]
    pub version: u32,

    /// Explicit start stage; falls back to the stage with no incoming edges
    #[serde(default)]
    pub initial_stage: Option<StageId>,

    pub stages: Vec<WorkflowStage>,

    #[serde(default)]
    pub transitions: Vec<WorkflowTransition>,
}

impl Workflow {
    pub fn new<W: Into<WorkflowId>>(id: W, name: &str, application_type: &str) -> Self {
        Workflow {
            id: id.into(),
            name: name.to_string(),
            application_type: application_type.to_string(),
            is_active: false,
            version: 0,
            initial_stage: None,
            stages: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: WorkflowStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_transition(mut self, transition: WorkflowTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_initial_stage<S: Into<StageId>>(mut self, stage: S) -> Self {
        self.initial_stage = Some(stage.into());
        self
    }

    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }

    /// Look up a stage by id
    pub fn stage(&self, stage_id: &StageId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == *stage_id)
    }

    /// Stages ordered by `sequence` for display
    pub fn stages_in_order(&self) -> Vec<&WorkflowStage> {
        let mut stages: Vec<&WorkflowStage> = self.stages.iter().collect();
        stages.sort_by_key(|s| s.sequence);
        stages
    }

    /// Stages no transition points into
    fn stages_without_incoming(&self) -> Vec<&WorkflowStage> {
        let targets: HashSet<&StageId> = self
            .transitions
            .iter()
            .map(|t| &t.target_stage_id)
            .collect();

        self.stages
            .iter()
            .filter(|s| !targets.contains(&s.id))
            .collect()
    }

    /// The stage a new application starts in
    ///
    /// Returns `None` when no explicit initial stage is configured and the
    /// graph does not have exactly one stage without incoming edges.
    pub fn start_stage(&self) -> Option<&WorkflowStage> {
        if let Some(initial) = &self.initial_stage {
            return self.stage(initial);
        }

        match self.stages_without_incoming().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Stages with no outgoing transitions
    pub fn terminal_stages(&self) -> Vec<&WorkflowStage> {
        let sources: HashSet<&StageId> = self
            .transitions
            .iter()
            .map(|t| &t.source_stage_id)
            .collect();

        self.stages_in_order()
            .into_iter()
            .filter(|s| !sources.contains(&s.id))
            .collect()
    }

    pub fn is_terminal(&self, stage_id: &StageId) -> bool {
        !self
            .transitions
            .iter()
            .any(|t| t.source_stage_id == *stage_id)
    }

    /// Check the structural invariants of the template
    ///
    /// ## Rust Learning Notes:
    ///
    /// ### HashSet::insert as a Duplicate Check
    /// `insert` returns `false` when the value was already present, which
    /// turns "find duplicates" into a single pass.
    pub fn validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err(format!("Workflow '{}' has no stages", self.id));
        }

        let mut stage_ids = HashSet::new();
        let mut sequences = HashSet::new();
        for stage in &self.stages {
            if stage.workflow_id != self.id {
                return Err(format!(
                    "Stage '{}' belongs to workflow '{}', not '{}'",
                    stage.id, stage.workflow_id, self.id
                ));
            }
            if !stage_ids.insert(&stage.id) {
                return Err(format!("Duplicate stage id '{}'", stage.id));
            }
            if !sequences.insert(stage.sequence) {
                return Err(format!(
                    "Duplicate sequence {} on stage '{}'",
                    stage.sequence, stage.id
                ));
            }
        }

        let mut transition_ids = HashSet::new();
        for transition in &self.transitions {
            if !transition_ids.insert(&transition.id) {
                return Err(format!("Duplicate transition id '{}'", transition.id));
            }
            if transition.workflow_id != self.id {
                return Err(format!(
                    "Transition '{}' belongs to workflow '{}', not '{}'",
                    transition.id, transition.workflow_id, self.id
                ));
            }
            if !stage_ids.contains(&transition.source_stage_id) {
                return Err(format!(
                    "Transition '{}' references unknown source stage '{}'",
                    transition.id, transition.source_stage_id
                ));
            }
            if !stage_ids.contains(&transition.target_stage_id) {
                return Err(format!(
                    "Transition '{}' references unknown target stage '{}'",
                    transition.id, transition.target_stage_id
                ));
            }
            for condition in &transition.transition_conditions {
                condition
                    .validate()
                    .map_err(|e| format!("Transition '{}': {}", transition.id, e))?;
            }
        }

        if let Some(initial) = &self.initial_stage {
            if !stage_ids.contains(initial) {
                return Err(format!("Initial stage '{}' not found in stages", initial));
            }
        } else {
            let candidates = self.stages_without_incoming();
            if candidates.len() != 1 {
                let names: Vec<&str> = candidates.iter().map(|s| s.id.as_str()).collect();
                return Err(format!(
                    "Workflow '{}' needs an explicit initial_stage: {} stages have no incoming transitions {:?}",
                    self.id,
                    candidates.len(),
                    names
                ));
            }
        }

        Ok(())
    }

    /// Stages that can never be reached from the start stage
    ///
    /// Depth-first search over the edge set. Unreachable stages are a lint,
    /// not an error: they are usually leftovers from an edit.
    pub fn unreachable_stages(&self) -> Vec<&WorkflowStage> {
        let Some(start) = self.start_stage() else {
            return self.stages_in_order();
        };

        let mut reachable: HashSet<&StageId> = HashSet::new();
        let mut to_visit = vec![&start.id];

        while let Some(stage_id) = to_visit.pop() {
            if reachable.insert(stage_id) {
                for t in self.transitions.iter().filter(|t| t.source_stage_id == *stage_id) {
                    if !reachable.contains(&t.target_stage_id) {
                        to_visit.push(&t.target_stage_id);
                    }
                }
            }
        }

        self.stages_in_order()
            .into_iter()
            .filter(|s| !reachable.contains(&s.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::condition::Condition;

    fn undergrad() -> Workflow {
        Workflow::new("undergrad-fall", "Undergraduate Fall", "undergrad-fall")
            .with_stage(WorkflowStage::new("undergrad-fall", "submitted", "Submitted", 1))
            .with_stage(
                WorkflowStage::new("undergrad-fall", "review", "Under Review", 2)
                    .with_documents(&["transcript", "essay"]),
            )
            .with_stage(WorkflowStage::new("undergrad-fall", "decision", "Decision", 3))
            .with_transition(
                WorkflowTransition::manual("undergrad-fall", "start_review", "submitted", "review")
                    .requires("review"),
            )
            .with_transition(WorkflowTransition::automatic(
                "undergrad-fall",
                "auto_decide",
                "review",
                "decision",
                vec![Condition::all_documents_verified()],
            ))
    }

    #[test]
    fn test_valid_workflow_shape() {
        let workflow = undergrad();
        assert!(workflow.validate().is_ok());
        assert_eq!(workflow.start_stage().unwrap().id, StageId::from("submitted"));

        let terminal: Vec<&str> = workflow.terminal_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(terminal, vec!["decision"]);
        assert!(workflow.unreachable_stages().is_empty());
    }

    #[test]
    fn test_stages_in_order_uses_sequence() {
        let workflow = Workflow::new("wf", "Wf", "t")
            .with_stage(WorkflowStage::new("wf", "c", "C", 30))
            .with_stage(WorkflowStage::new("wf", "a", "A", 10))
            .with_stage(WorkflowStage::new("wf", "b", "B", 20));

        let order: Vec<&str> = workflow.stages_in_order().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validate_rejects_foreign_and_unknown_stages() {
        let foreign = undergrad().with_transition(WorkflowTransition::manual(
            "graduate",
            "sneaky",
            "submitted",
            "decision",
        ));
        assert!(foreign.validate().unwrap_err().contains("belongs to workflow"));

        let dangling = undergrad().with_transition(WorkflowTransition::manual(
            "undergrad-fall",
            "dangling",
            "review",
            "enrolled",
        ));
        assert!(dangling.validate().unwrap_err().contains("unknown target stage"));
    }

    #[test]
    fn test_validate_rejects_duplicate_sequence() {
        let workflow = undergrad().with_stage(WorkflowStage::new("undergrad-fall", "waitlist", "Waitlist", 2));
        assert!(workflow.validate().unwrap_err().contains("Duplicate sequence"));
    }

    #[test]
    fn test_ambiguous_start_requires_explicit_initial_stage() {
        let workflow = undergrad().with_stage(WorkflowStage::new("undergrad-fall", "withdrawn", "Withdrawn", 9));
        assert!(workflow.start_stage().is_none());
        assert!(workflow.validate().unwrap_err().contains("initial_stage"));

        let fixed = workflow.with_initial_stage("submitted");
        assert!(fixed.validate().is_ok());
        assert_eq!(fixed.start_stage().unwrap().id, StageId::from("submitted"));

        let unreachable: Vec<&str> = fixed.unreachable_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(unreachable, vec!["withdrawn"]);
    }

    #[test]
    fn test_validate_rejects_malformed_condition() {
        let workflow = undergrad().with_transition(WorkflowTransition::automatic(
            "undergrad-fall",
            "broken",
            "review",
            "submitted",
            vec![Condition::any(vec![])],
        ));
        assert!(workflow.validate().unwrap_err().contains("broken"));
    }

    #[test]
    fn test_workflow_json_defaults() {
        let json = serde_json::json!({
            "id": "grad",
            "name": "Graduate",
            "application_type": "graduate",
            "stages": [
                {"id": "applied", "workflow_id": "grad", "name": "Applied", "sequence": 1}
            ]
        });

        let workflow: Workflow = serde_json::from_value(json).unwrap();
        assert!(!workflow.is_active);
        assert_eq!(workflow.version, 0);
        assert!(workflow.transitions.is_empty());
        assert!(workflow.validate().is_ok());
    }
}
