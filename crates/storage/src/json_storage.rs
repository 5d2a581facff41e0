//! JSON file storage implementation.
//!
//! Stores each entity as one pretty-printed JSON file under a root directory
//! (`campaigns/`, `missions/`, `tasks/`, `runs/`, `events/`, `checkpoints/`).
//! Durable retry and crash-safe waits belong to the execution substrate; this
//! backend only has to keep the write-path for guarded mutations serialized,
//! which a single write lock provides.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;

use opcom_core::{
    Campaign, CampaignAar, CampaignCheckpoint, CampaignId, CampaignStatus, Event, Mission,
    MissionAar, MissionId, MissionStatus, RunId, RunRecord, Task, TaskId, TaskStatus,
};

use super::{Result, Storage, StorageError};

const KINDS: &[&str] = &[
    "campaigns",
    "missions",
    "tasks",
    "runs",
    "events",
    "checkpoints",
];

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    // Serializes read-modify-write mutations (transitions, increments).
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the per-kind subdirectories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in KINDS {
            fs::create_dir_all(root.join(kind)).await?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, kind: &str, id: impl std::fmt::Display) -> PathBuf {
        self.root.join(kind).join(format!("{id}.json"))
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json.as_bytes()).await?;
        Ok(())
    }

    async fn load_campaign_mut(&self, id: CampaignId) -> Result<Campaign> {
        read_json::<Campaign>(&self.path("campaigns", id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("campaign {id}")))
    }

    async fn load_mission_mut(&self, id: MissionId) -> Result<Mission> {
        read_json::<Mission>(&self.path("missions", id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("mission {id}")))
    }

    async fn load_task_mut(&self, id: TaskId) -> Result<Task> {
        read_json::<Task>(&self.path("tasks", id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {id}")))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.write_json(&self.path("campaigns", campaign.id), campaign)
            .await
    }

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        read_json(&self.path("campaigns", id)).await
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = list_dir(&self.root.join("campaigns")).await?;
        campaigns.sort_by_key(|c| c.id);
        Ok(campaigns)
    }

    async fn transition_campaign(&self, id: CampaignId, to: CampaignStatus) -> Result<Campaign> {
        let _guard = self.write_lock.lock().await;
        let mut campaign = self.load_campaign_mut(id).await?;
        campaign.transition(to)?;
        self.write_json(&self.path("campaigns", id), &campaign)
            .await?;
        Ok(campaign)
    }

    async fn set_campaign_progress(&self, id: CampaignId, progress: u8) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut campaign = self.load_campaign_mut(id).await?;
        campaign.progress = progress.min(100);
        campaign.updated_at = chrono::Utc::now();
        self.write_json(&self.path("campaigns", id), &campaign)
            .await
    }

    async fn set_campaign_aar(&self, id: CampaignId, aar: &CampaignAar) -> Result<Campaign> {
        let _guard = self.write_lock.lock().await;
        let mut campaign = self.load_campaign_mut(id).await?;
        campaign.total_cost_usd = aar.total_cost_usd;
        campaign.total_tokens = aar.total_tokens;
        campaign.aar = Some(aar.clone());
        campaign.updated_at = chrono::Utc::now();
        self.write_json(&self.path("campaigns", id), &campaign)
            .await?;
        Ok(campaign)
    }

    async fn save_mission(&self, mission: &Mission) -> Result<()> {
        self.write_json(&self.path("missions", mission.id), mission)
            .await
    }

    async fn load_mission(&self, id: MissionId) -> Result<Option<Mission>> {
        read_json(&self.path("missions", id)).await
    }

    async fn list_missions(&self, campaign_id: CampaignId) -> Result<Vec<Mission>> {
        let all: Vec<Mission> = list_dir(&self.root.join("missions")).await?;
        let mut missions: Vec<_> = all
            .into_iter()
            .filter(|m| m.campaign_id == campaign_id)
            .collect();
        missions.sort_by_key(|m| (m.sequence, m.id));
        Ok(missions)
    }

    async fn transition_mission(&self, id: MissionId, to: MissionStatus) -> Result<Mission> {
        let _guard = self.write_lock.lock().await;
        let mut mission = self.load_mission_mut(id).await?;
        mission.transition(to)?;
        self.write_json(&self.path("missions", id), &mission).await?;
        Ok(mission)
    }

    async fn set_mission_aar(&self, id: MissionId, aar: &MissionAar) -> Result<Mission> {
        let _guard = self.write_lock.lock().await;
        let mut mission = self.load_mission_mut(id).await?;
        mission.total_cost_usd = aar.total_cost_usd;
        mission.total_tokens = aar.total_tokens;
        mission.aar = Some(aar.clone());
        self.write_json(&self.path("missions", id), &mission).await?;
        Ok(mission)
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.write_json(&self.path("tasks", task.id), task).await
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        read_json(&self.path("tasks", id)).await
    }

    async fn list_tasks(&self, mission_id: MissionId) -> Result<Vec<Task>> {
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        let mut tasks: Vec<_> = all
            .into_iter()
            .filter(|t| t.mission_id == mission_id)
            .collect();
        tasks.sort_by_key(|t| (t.sequence, t.id));
        Ok(tasks)
    }

    async fn set_task_running(&self, id: TaskId, execution_ref: RunId) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_task_mut(id).await?;
        task.transition(TaskStatus::Running)?;
        task.execution_ref = Some(execution_ref);
        self.write_json(&self.path("tasks", id), &task).await?;
        Ok(task)
    }

    async fn complete_task(
        &self,
        id: TaskId,
        result: &str,
        cost_usd: f64,
        tokens: u64,
    ) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_task_mut(id).await?;
        task.transition(TaskStatus::Complete)?;
        task.result = Some(result.to_string());
        task.cost_usd = cost_usd;
        task.tokens = tokens;
        self.write_json(&self.path("tasks", id), &task).await?;
        Ok(task)
    }

    async fn fail_task(&self, id: TaskId, error: &str) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_task_mut(id).await?;
        task.transition(TaskStatus::Failed)?;
        task.error = Some(error.to_string());
        self.write_json(&self.path("tasks", id), &task).await?;
        Ok(task)
    }

    async fn skip_task(&self, id: TaskId) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_task_mut(id).await?;
        task.transition(TaskStatus::Skipped)?;
        self.write_json(&self.path("tasks", id), &task).await?;
        Ok(task)
    }

    async fn add_usage(&self, mission_id: MissionId, cost_usd: f64, tokens: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut mission = self.load_mission_mut(mission_id).await?;
        mission.total_cost_usd += cost_usd;
        mission.total_tokens += tokens;
        self.write_json(&self.path("missions", mission_id), &mission)
            .await?;

        let mut campaign = self.load_campaign_mut(mission.campaign_id).await?;
        campaign.total_cost_usd += cost_usd;
        campaign.total_tokens += tokens;
        campaign.updated_at = chrono::Utc::now();
        self.write_json(&self.path("campaigns", campaign.id), &campaign)
            .await
    }

    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        self.write_json(&self.path("runs", run.id), run).await
    }

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>> {
        read_json(&self.path("runs", id)).await
    }

    async fn append_event(&self, event: &Event) -> Result<()> {
        self.write_json(&self.path("events", event.id), event).await
    }

    async fn list_events(&self, campaign_id: CampaignId) -> Result<Vec<Event>> {
        let all: Vec<Event> = list_dir(&self.root.join("events")).await?;
        let mut events: Vec<_> = all
            .into_iter()
            .filter(|e| e.campaign_id == campaign_id)
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn save_checkpoint(&self, checkpoint: &CampaignCheckpoint) -> Result<()> {
        self.write_json(
            &self.path("checkpoints", checkpoint.campaign_id),
            checkpoint,
        )
        .await
    }

    async fn load_checkpoint(&self, campaign_id: CampaignId) -> Result<Option<CampaignCheckpoint>> {
        read_json(&self.path("checkpoints", campaign_id)).await
    }

    async fn save_campaign_plan(
        &self,
        campaign: &Campaign,
        missions: &[Mission],
        tasks: &[Task],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(&self.path("campaigns", campaign.id), campaign)
            .await?;
        for mission in missions {
            self.write_json(&self.path("missions", mission.id), mission)
                .await?;
        }
        for task in tasks {
            self.write_json(&self.path("tasks", task.id), task).await?;
        }
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn entities_round_trip_through_files() {
        let (_dir, storage) = storage().await;
        let campaign = Campaign::new("files", "intent", "end");
        let mission = Mission::new(campaign.id, "m", "statement", 1);
        let task = Task::new(mission.id, "t", "draft", 0);

        storage
            .save_campaign_plan(&campaign, &[mission.clone()], &[task.clone()])
            .await
            .unwrap();

        let loaded = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "files");
        assert_eq!(storage.list_missions(campaign.id).await.unwrap().len(), 1);
        assert_eq!(
            storage.list_tasks(mission.id).await.unwrap()[0].task_verb,
            "draft"
        );
    }

    #[tokio::test]
    async fn usage_increments_survive_reload() {
        let (_dir, storage) = storage().await;
        let campaign = Campaign::new("c", "i", "e");
        let mission = Mission::new(campaign.id, "m", "s", 0);
        storage
            .save_campaign_plan(&campaign, &[mission.clone()], &[])
            .await
            .unwrap();

        storage.add_usage(mission.id, 0.5, 200).await.unwrap();

        let mission = storage.load_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(mission.total_tokens, 200);
        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.total_tokens, 200);
    }

    #[tokio::test]
    async fn missing_files_are_none_not_errors() {
        let (_dir, storage) = storage().await;
        assert!(storage.load_task(TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_records_round_trip() {
        let (_dir, storage) = storage().await;
        let run = opcom_core::RunRecord::new(TaskId::new(), "scout");
        storage.save_run(&run).await.unwrap();

        let loaded = storage.load_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.task_id, run.task_id);
        assert_eq!(loaded.agent, "scout");
    }

    #[tokio::test]
    async fn checkpoints_persist_barrier_progress() {
        let (_dir, storage) = storage().await;
        let campaign_id = CampaignId::new();
        let mut checkpoint = CampaignCheckpoint::new(campaign_id);
        checkpoint.active_sequence = Some(2);
        storage.save_checkpoint(&checkpoint).await.unwrap();

        let loaded = storage.load_checkpoint(campaign_id).await.unwrap().unwrap();
        assert_eq!(loaded.active_sequence, Some(2));
    }
}
