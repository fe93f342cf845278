// Admissions Workflow - Rust Edition
// A configurable state machine moving admissions applications through institution-defined stages

//! # Admissions Workflow Library
//!
//! This is the library root for the admissions workflow engine: a state
//! machine that moves applications through stages (submitted → under review →
//! decision → enrollment), evaluates per-stage requirements, works out which
//! transitions are available, and fires side effects on every transition.
//!
//! ## Core Components
//!
//! ### Domain Models ([`models`])
//! - [`Workflow`] / [`WorkflowStage`] / [`WorkflowTransition`]: the template
//! - [`Condition`]: boolean expression trees guarding automatic transitions
//! - [`Application`] / [`ApplicationStatus`]: the entity and its append-only history
//!
//! ### Engine ([`engine`])
//! - [`StageRegistry`]: versioned workflow snapshots and the active workflow per type
//! - [`TransitionRuleSet`]: edge queries over a snapshot, no implicit edges
//! - [`RequirementEvaluator`]: which documents/actions a stage is still missing
//! - [`TransitionResolver`]: manual availability and first-match-wins automatic resolution
//! - [`WorkflowEngine`]: initialize, execute, check automatic transitions, submit
//!
//! ### REST surface ([`api`])
//! Axum routes returning the `{ success, data, message }` envelope.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use admissions_workflow::{Actor, WorkflowEngine};
//! use admissions_workflow::models::StageId;
//!
//! # async fn run(engine: WorkflowEngine, application_id: uuid::Uuid, actor: Actor) -> admissions_workflow::Result<()> {
//! engine.initialize_application_workflow(application_id, Some(&actor)).await?;
//! engine.execute_transition(application_id, &StageId::from("review"), &actor, None).await?;
//! let moved = engine.check_automatic_transitions(application_id).await?;
//! # let _ = moved;
//! # Ok(())
//! # }
//! ```

// Core domain models (no I/O)
pub mod models;

// Registry, rule set, evaluator, resolver, orchestrator and their collaborators
pub mod engine;

// HTTP surface over the engine
pub mod api;

// Layered configuration for the binaries
pub mod config;

// Re-export core domain types for easy access
pub use models::{
    Actor, Application, ApplicationStatus, Condition, DomainEvent, StageId, TransitionId,
    Workflow, WorkflowId, WorkflowRef, WorkflowStage, WorkflowTransition,
};

// Re-export engine types for convenience
pub use engine::{
    events::EventBus,
    registry::{InMemoryWorkflowRepository, StageRegistry, WorkflowRepository},
    requirements::{MissingItems, RequirementCheck, RequirementEvaluator},
    resolver::TransitionResolver,
    storage::{ApplicationStore, InMemoryApplicationStore},
    transitions::TransitionRuleSet,
    workflow_engine::{CurrentStatus, WorkflowEngine, WorkflowEngineBuilder},
};

use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for the workflow engine
///
/// ## Rust Learning Notes:
///
/// ### Business Outcomes vs Failures
/// The first group of variants are expected outcomes (no workflow configured,
/// illegal transition, missing permission, incomplete application). They map
/// to 4xx responses and are never logged as server errors. The remaining
/// variants are real failures that operators need to see.
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements `std::error::Error`
/// - `#[error("...")]` provides the `Display` message
/// - `#[from]` enables `?` conversion from the wrapped error type
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No active workflow for an application type (or unknown workflow id)
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Stage id not present in the workflow snapshot consulted
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(Uuid),

    /// No edge leads from the current stage to the requested target
    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// An edge exists but the actor lacks its required permissions
    #[error("Not authorized to fire transition {transition}: missing permissions {missing:?}")]
    Authorization {
        transition: String,
        missing: Vec<String>,
    },

    /// Raised only by the stricter submission-completeness check
    #[error("Requirements not met: {missing}")]
    RequirementsNotMet { missing: MissingItems },

    /// Workflow template failed structural validation
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A stored condition expression cannot be evaluated
    #[error("Malformed condition: {0}")]
    MalformedCondition(String),

    /// Another writer moved the application first; safe to retry
    #[error("Application {application_id} was modified concurrently")]
    ConcurrentModification { application_id: Uuid },

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Expected business outcomes that surface as 4xx responses
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            WorkflowError::WorkflowNotFound(_)
                | WorkflowError::StageNotFound(_)
                | WorkflowError::ApplicationNotFound(_)
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::Authorization { .. }
                | WorkflowError::RequirementsNotMet { .. }
                | WorkflowError::InvalidWorkflow(_)
                | WorkflowError::ConcurrentModification { .. }
        )
    }

    /// Whether re-invoking the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::ConcurrentModification { .. } | WorkflowError::Storage(_)
        )
    }

    /// Stable machine-readable code for API clients
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkflowError::WorkflowNotFound(_) => "workflow_not_found",
            WorkflowError::StageNotFound(_) => "stage_not_found",
            WorkflowError::ApplicationNotFound(_) => "application_not_found",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::Authorization { .. } => "authorization_error",
            WorkflowError::RequirementsNotMet { .. } => "requirements_not_met",
            WorkflowError::InvalidWorkflow(_) => "invalid_workflow",
            WorkflowError::MalformedCondition(_) => "malformed_condition",
            WorkflowError::ConcurrentModification { .. } => "concurrent_modification",
            WorkflowError::Storage(_) => "storage_error",
            WorkflowError::Serialization(_) => "serialization_error",
            WorkflowError::Internal(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, WorkflowError>;
