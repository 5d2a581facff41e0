//! Storage trait abstraction.

use async_trait::async_trait;
use opcom_core::{
    Campaign, CampaignAar, CampaignCheckpoint, CampaignId, CampaignStatus, Event, Mission,
    MissionAar, MissionId, MissionStatus, RunId, RunRecord, Task, TaskId, TransitionError,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Transition rejected by an entity's transition table
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for OpCom data.
///
/// This trait allows different storage backends to be plugged in. Methods that
/// mutate more than one field, or that depend on the current state (the
/// `transition_*` guards, the task settlement methods, [`Storage::add_usage`]),
/// must execute atomically with respect to each other: backends serialize them
/// behind a single lock.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Campaign operations ===

    /// Save a campaign (create or update).
    async fn save_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// Load a campaign by ID.
    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// List all campaigns.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Transition a campaign, enforcing its table; returns the updated record.
    async fn transition_campaign(&self, id: CampaignId, to: CampaignStatus) -> Result<Campaign>;

    /// Update a campaign's progress percentage.
    async fn set_campaign_progress(&self, id: CampaignId, progress: u8) -> Result<()>;

    /// Write the campaign-level review and reconcile the campaign totals to
    /// the review's settled sums.
    async fn set_campaign_aar(&self, id: CampaignId, aar: &CampaignAar) -> Result<Campaign>;

    // === Mission operations ===

    /// Save a mission (create or update).
    async fn save_mission(&self, mission: &Mission) -> Result<()>;

    /// Load a mission by ID.
    async fn load_mission(&self, id: MissionId) -> Result<Option<Mission>>;

    /// List a campaign's missions, ordered by sequence then creation.
    async fn list_missions(&self, campaign_id: CampaignId) -> Result<Vec<Mission>>;

    /// Transition a mission, enforcing its table; returns the updated record.
    async fn transition_mission(&self, id: MissionId, to: MissionStatus) -> Result<Mission>;

    /// Write a mission-level review and reconcile the mission totals to the
    /// review's settled sums.
    async fn set_mission_aar(&self, id: MissionId, aar: &MissionAar) -> Result<Mission>;

    // === Task operations ===

    /// Save a task (create or update).
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Load a task by ID.
    async fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// List a mission's tasks, ordered by sequence then creation.
    async fn list_tasks(&self, mission_id: MissionId) -> Result<Vec<Task>>;

    /// Mark a task running and store its run correlation.
    async fn set_task_running(&self, id: TaskId, execution_ref: RunId) -> Result<Task>;

    /// Settle a task as complete with its output and usage.
    async fn complete_task(
        &self,
        id: TaskId,
        result: &str,
        cost_usd: f64,
        tokens: u64,
    ) -> Result<Task>;

    /// Settle a task as failed with its error text.
    async fn fail_task(&self, id: TaskId, error: &str) -> Result<Task>;

    /// Reclassify a task as skipped (pending tasks that will never run, or
    /// failed tasks absorbed by a mission's skip policy).
    async fn skip_task(&self, id: TaskId) -> Result<Task>;

    // === Aggregates ===

    /// Atomically add a settled task's usage to its mission and the mission's
    /// campaign. Increment-only; multiple siblings may call this concurrently.
    async fn add_usage(&self, mission_id: MissionId, cost_usd: f64, tokens: u64) -> Result<()>;

    // === Run records ===

    /// Save a run correlation record.
    async fn save_run(&self, run: &RunRecord) -> Result<()>;

    /// Load a run correlation record.
    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>>;

    // === Audit events ===

    /// Append an audit event. Events are never updated or deleted.
    async fn append_event(&self, event: &Event) -> Result<()>;

    /// List a campaign's audit events in timestamp order.
    async fn list_events(&self, campaign_id: CampaignId) -> Result<Vec<Event>>;

    // === Checkpoints ===

    /// Persist a campaign scheduler's barrier progress.
    async fn save_checkpoint(&self, checkpoint: &CampaignCheckpoint) -> Result<()>;

    /// Load a campaign scheduler's barrier progress.
    async fn load_checkpoint(&self, campaign_id: CampaignId) -> Result<Option<CampaignCheckpoint>>;

    // === Plan materialization ===

    /// Write a decomposed campaign and its full mission/task graph in one
    /// atomic step, before any execution begins.
    async fn save_campaign_plan(
        &self,
        campaign: &Campaign,
        missions: &[Mission],
        tasks: &[Task],
    ) -> Result<()>;
}
