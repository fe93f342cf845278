// Domain events published after workflow state changes commit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{StageId, TransitionId};

/// An application moved from one stage to another (or entered its first stage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatusChangedEvent {
    pub application_id: Uuid,

    /// `None` when the workflow was just initialized
    pub old_stage_id: Option<StageId>,
    pub new_stage_id: StageId,

    /// Edge that was followed; `None` for initialization
    pub transition_id: Option<TransitionId>,

    /// Id of the `ApplicationStatus` row written by the transition
    pub status_id: i64,

    /// `None` for system-triggered transitions
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// An application left draft state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSubmittedEvent {
    pub application_id: Uuid,
    pub applicant_id: Uuid,
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Everything the engine publishes on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ApplicationStatusChanged(ApplicationStatusChangedEvent),
    ApplicationSubmitted(ApplicationSubmittedEvent),
}

impl DomainEvent {
    pub fn application_id(&self) -> Uuid {
        match self {
            DomainEvent::ApplicationStatusChanged(e) => e.application_id,
            DomainEvent::ApplicationSubmitted(e) => e.application_id,
        }
    }

    /// Stable name used in logs and notification payloads
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ApplicationStatusChanged(_) => "application_status_changed",
            DomainEvent::ApplicationSubmitted(_) => "application_submitted",
        }
    }
}
