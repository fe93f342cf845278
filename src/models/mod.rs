// Core domain models for the admissions workflow engine
// These are plain data structures with no I/O

//! # Domain Models Module
//!
//! The types every other layer speaks:
//!
//! - `ids`: string-backed identifiers and the `WorkflowRef` version pin
//! - `condition`: the boolean expression tree guarding automatic transitions
//! - `transition`: `WorkflowTransition` edges and `TransitionFilter`
//! - `workflow`: `Workflow` templates and their `WorkflowStage` nodes
//! - `application`: the `Application` entity, its `ApplicationStatus` history
//!   and the explicit `Actor`
//! - `events`: domain events published after a transition commits
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements below flatten the hierarchy, so callers write
//! `use admissions_workflow::models::Workflow` rather than naming the file.

pub mod ids;

pub mod condition;

pub mod transition;

pub mod workflow;

pub mod application;

pub mod events;

pub use ids::{StageId, TransitionId, WorkflowId, WorkflowRef};

pub use condition::{keys, Condition, ConditionContext, ConditionEvaluation};

pub use transition::{TransitionFilter, WorkflowTransition};

pub use workflow::{NotificationRecipient, NotificationTrigger, Workflow, WorkflowStage, STAGE_ENTERED};

pub use application::{latest_status, Actor, Application, ApplicationStatus};

pub use events::{ApplicationStatusChangedEvent, ApplicationSubmittedEvent, DomainEvent};
