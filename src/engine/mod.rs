// Admissions Workflow Engine
// Registry, rule evaluation and orchestration over the domain models

//! # Engine Module
//!
//! This module is the layer between the domain models and the outside world
//! (HTTP handlers, background jobs, the admin CLI).
//!
//! ## Architecture Overview
//!
//! - **Domain Models**: pure data and evaluation logic (in `models/`)
//! - **Engine Layer**: lookups, decisions and the transactional write (this module)
//! - **API Layer**: axum handlers translating HTTP into engine calls (in `api/`)
//!
//! ## Engine Components
//!
//! ### Stage Registry (`registry` module)
//! - Versioned workflow snapshots, one active workflow per application type
//! - Read-through cache with explicit invalidation
//!
//! ### Transition Rule Set (`transitions` module)
//! - Edge queries over one snapshot: outgoing, incoming, filtered
//!
//! ### Requirement Evaluator (`requirements` module)
//! - Missing documents and actions for a stage
//!
//! ### Transition Resolver (`resolver` module)
//! - Manual transitions an actor may fire
//! - First-match-wins automatic transition selection
//!
//! ### Workflow Engine (`workflow_engine` module)
//! - Initialize, execute, automatic checks, submission
//! - Atomic status write, then audit, event and notifications
//!
//! ### Collaborators (`ports`, `storage`, `events` modules)
//! - Trait seams for documents, actions, permissions, notifications, audit
//! - Application store with the atomic commit
//! - Broadcast event bus
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization Pattern
//! Each component lives in its own file and the most used types are
//! re-exported here, so callers write `engine::WorkflowEngine` instead of
//! `engine::workflow_engine::WorkflowEngine`.

use crate::WorkflowError;

pub mod ports;

pub mod storage;

pub mod events;

pub mod registry;

pub mod transitions;

pub mod requirements;

pub mod resolver;

pub mod workflow_engine;

#[cfg(test)]
mod scenario_tests;

pub use events::EventBus;
pub use ports::{
    ActionChecker, AuditLogger, DocumentStore, InMemoryActionChecker, InMemoryAuditLogger,
    InMemoryDocumentStore, InMemoryNotificationDispatcher, InMemoryPermissionStore,
    NotificationDispatcher, PermissionStore,
};
pub use registry::{InMemoryWorkflowRepository, StageRegistry, WorkflowRepository};
pub use requirements::{MissingItems, RequirementCheck, RequirementEvaluator};
pub use resolver::{TransitionEvaluation, TransitionResolver, WorkflowEvaluationResult};
pub use storage::{ApplicationStore, FaultPoint, InMemoryApplicationStore, StatusCommit};
pub use transitions::TransitionRuleSet;
pub use workflow_engine::{CurrentStatus, WorkflowEngine, WorkflowEngineBuilder};

/// Map a poisoned std lock into an engine error
pub(crate) fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> WorkflowError {
    WorkflowError::Internal("lock poisoned".to_string())
}
