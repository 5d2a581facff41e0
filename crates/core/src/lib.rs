//! OpCom core data models.
//!
//! This crate defines the work unit hierarchy — Campaign, Mission, Task —
//! together with the status state machines, the plan shapes produced by the
//! external Decomposer/Planner, the After-Action Review report types, and the
//! append-only audit event model.

#![warn(missing_docs)]

// Core identities
mod id;

// Work unit hierarchy
mod campaign;
mod mission;
mod task;

// Planning and review
mod aar;
mod plan;

// Audit and execution records
mod event;
mod record;

// Re-exports
pub use id::*;

pub use campaign::{Campaign, CampaignStatus};
pub use mission::{ActionsOn, FailurePolicy, Mission, MissionStatus};
pub use task::{CoordinatingInstructions, Task, TaskStatus, TaskType};

pub use plan::{
    AgentProfile, AssignmentPlan, CampaignPlan, MissionAssignment, MissionDraft, TaskAssignment,
    TaskDraft,
};

pub use aar::{
    AarNarrative, CampaignAar, CampaignAarInput, CampaignNarrative, MissionAar, MissionAarInput,
    MissionReview, TaskReview, TaskScore,
};

pub use event::{AuditEvent, Event};
pub use record::{CampaignCheckpoint, RunRecord};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// A status transition rejected by an entity's transition table.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal {entity} transition: {from} -> {to}")]
pub struct TransitionError {
    /// Entity kind ("campaign", "mission", "task")
    pub entity: &'static str,
    /// Status the entity was in
    pub from: String,
    /// Status that was requested
    pub to: String,
}
