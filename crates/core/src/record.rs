//! Execution records: run correlation and scheduler checkpoints.

use serde::{Deserialize, Serialize};

use crate::id::{CampaignId, MissionId, RunId, TaskId};
use crate::Time;

/// Correlation record for one external execution run.
///
/// Written by the executor adapter before delegation so the run can be found
/// from the task and vice versa. Not consulted for scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier, stored back on the task as `execution_ref`
    pub id: RunId,

    /// Task this run executes
    pub task_id: TaskId,

    /// Executor identity the run was delegated to
    pub agent: String,

    /// When the run was created
    pub started_at: Time,

    /// When the run settled
    pub completed_at: Option<Time>,
}

impl RunRecord {
    /// Create a record for a task about to be delegated.
    pub fn new(task_id: TaskId, agent: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            task_id,
            agent: agent.into(),
            started_at: chrono::Utc::now(),
            completed_at: None,
        }
    }
}

/// Persisted barrier progress for a campaign scheduler.
///
/// Saved before every suspension so a restart resumes from the active sequence
/// group instead of re-dispatching settled work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCheckpoint {
    /// Campaign being executed
    pub campaign_id: CampaignId,

    /// Sequence group currently at the barrier
    pub active_sequence: Option<u32>,

    /// Missions that have already signalled settlement
    pub settled_missions: Vec<MissionId>,

    /// Last update
    pub updated_at: Time,
}

impl CampaignCheckpoint {
    /// Fresh checkpoint with nothing settled.
    pub fn new(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            active_sequence: None,
            settled_missions: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }
}
