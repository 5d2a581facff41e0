//! Audit event model - append-only atoms of the campaign timeline.

use serde::{Deserialize, Serialize};

use crate::id::{CampaignId, EventId};
use crate::Time;

/// An audit event records one transition in a campaign's lifecycle.
///
/// Events are write-only from the scheduler's point of view: they are appended
/// on every transition and never read back for scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EventId,

    /// Campaign this event belongs to
    pub campaign_id: CampaignId,

    /// Canonical event name
    pub event: AuditEvent,

    /// Human-readable message
    pub message: String,

    /// Structured context
    pub metadata: Option<serde_json::Value>,

    /// When it happened
    pub timestamp: Time,
}

impl Event {
    /// Create a new event.
    pub fn new(campaign_id: CampaignId, event: AuditEvent, message: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            campaign_id,
            event,
            message: message.into(),
            metadata: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Canonical audit event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Decomposition started
    Analyzing,
    /// Decomposition finished
    Analyzed,
    /// Executor assignment finished; campaign is ready
    Planned,
    /// Campaign execution started
    Executing,
    /// A mission left pending
    MissionStarted,
    /// A failed task was absorbed by the skip policy
    TaskSkipped,
    /// A task failed
    TaskFailed,
    /// A task completed
    TaskComplete,
    /// A mission's pause policy fired
    Paused,
    /// A mission-level review was written
    MissionAar,
    /// The campaign-level review was written
    CampaignAar,
    /// The campaign reached a terminal status
    Complete,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Planned => "planned",
            Self::Executing => "executing",
            Self::MissionStarted => "mission_started",
            Self::TaskSkipped => "task_skipped",
            Self::TaskFailed => "task_failed",
            Self::TaskComplete => "task_complete",
            Self::Paused => "paused",
            Self::MissionAar => "mission_aar",
            Self::CampaignAar => "campaign_aar",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuditEvent::MissionStarted).unwrap(),
            "\"mission_started\""
        );
        assert_eq!(AuditEvent::TaskSkipped.to_string(), "task_skipped");
    }
}
