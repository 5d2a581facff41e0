//! In-memory storage implementation.
//!
//! The default backend for tests and short-lived runs. A single mutex guards
//! the whole store, which is what makes the transition guards and usage
//! increments atomic with respect to concurrently settling siblings.

use std::collections::HashMap;

use tokio::sync::Mutex;

use opcom_core::{
    Campaign, CampaignAar, CampaignCheckpoint, CampaignId, CampaignStatus, Event, Mission,
    MissionAar, MissionId, MissionStatus, RunId, RunRecord, Task, TaskId, TaskStatus,
};

use super::{Result, Storage, StorageError};

#[derive(Default)]
struct Inner {
    campaigns: HashMap<CampaignId, Campaign>,
    missions: HashMap<MissionId, Mission>,
    tasks: HashMap<TaskId, Task>,
    runs: HashMap<RunId, RunRecord>,
    events: Vec<Event>,
    checkpoints: HashMap<CampaignId, CampaignCheckpoint>,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> StorageError {
    StorageError::NotFound(format!("{kind} {id}"))
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.inner
            .lock()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.inner.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<_> = self.inner.lock().await.campaigns.values().cloned().collect();
        campaigns.sort_by_key(|c| c.id);
        Ok(campaigns)
    }

    async fn transition_campaign(&self, id: CampaignId, to: CampaignStatus) -> Result<Campaign> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| not_found("campaign", id))?;
        campaign.transition(to)?;
        Ok(campaign.clone())
    }

    async fn set_campaign_progress(&self, id: CampaignId, progress: u8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| not_found("campaign", id))?;
        campaign.progress = progress.min(100);
        campaign.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_campaign_aar(&self, id: CampaignId, aar: &CampaignAar) -> Result<Campaign> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| not_found("campaign", id))?;
        campaign.total_cost_usd = aar.total_cost_usd;
        campaign.total_tokens = aar.total_tokens;
        campaign.aar = Some(aar.clone());
        campaign.updated_at = chrono::Utc::now();
        Ok(campaign.clone())
    }

    async fn save_mission(&self, mission: &Mission) -> Result<()> {
        self.inner
            .lock()
            .await
            .missions
            .insert(mission.id, mission.clone());
        Ok(())
    }

    async fn load_mission(&self, id: MissionId) -> Result<Option<Mission>> {
        Ok(self.inner.lock().await.missions.get(&id).cloned())
    }

    async fn list_missions(&self, campaign_id: CampaignId) -> Result<Vec<Mission>> {
        let mut missions: Vec<_> = self
            .inner
            .lock()
            .await
            .missions
            .values()
            .filter(|m| m.campaign_id == campaign_id)
            .cloned()
            .collect();
        missions.sort_by_key(|m| (m.sequence, m.id));
        Ok(missions)
    }

    async fn transition_mission(&self, id: MissionId, to: MissionStatus) -> Result<Mission> {
        let mut inner = self.inner.lock().await;
        let mission = inner
            .missions
            .get_mut(&id)
            .ok_or_else(|| not_found("mission", id))?;
        mission.transition(to)?;
        Ok(mission.clone())
    }

    async fn set_mission_aar(&self, id: MissionId, aar: &MissionAar) -> Result<Mission> {
        let mut inner = self.inner.lock().await;
        let mission = inner
            .missions
            .get_mut(&id)
            .ok_or_else(|| not_found("mission", id))?;
        mission.total_cost_usd = aar.total_cost_usd;
        mission.total_tokens = aar.total_tokens;
        mission.aar = Some(aar.clone());
        Ok(mission.clone())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.inner.lock().await.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.inner.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, mission_id: MissionId) -> Result<Vec<Task>> {
        let mut tasks: Vec<_> = self
            .inner
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| t.mission_id == mission_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.sequence, t.id));
        Ok(tasks)
    }

    async fn set_task_running(&self, id: TaskId, execution_ref: RunId) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| not_found("task", id))?;
        task.transition(TaskStatus::Running)?;
        task.execution_ref = Some(execution_ref);
        Ok(task.clone())
    }

    async fn complete_task(
        &self,
        id: TaskId,
        result: &str,
        cost_usd: f64,
        tokens: u64,
    ) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| not_found("task", id))?;
        task.transition(TaskStatus::Complete)?;
        task.result = Some(result.to_string());
        task.cost_usd = cost_usd;
        task.tokens = tokens;
        Ok(task.clone())
    }

    async fn fail_task(&self, id: TaskId, error: &str) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| not_found("task", id))?;
        task.transition(TaskStatus::Failed)?;
        task.error = Some(error.to_string());
        Ok(task.clone())
    }

    async fn skip_task(&self, id: TaskId) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| not_found("task", id))?;
        task.transition(TaskStatus::Skipped)?;
        Ok(task.clone())
    }

    async fn add_usage(&self, mission_id: MissionId, cost_usd: f64, tokens: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mission = inner
            .missions
            .get_mut(&mission_id)
            .ok_or_else(|| not_found("mission", mission_id))?;
        mission.total_cost_usd += cost_usd;
        mission.total_tokens += tokens;
        let campaign_id = mission.campaign_id;

        let campaign = inner
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| not_found("campaign", campaign_id))?;
        campaign.total_cost_usd += cost_usd;
        campaign.total_tokens += tokens;
        campaign.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        self.inner.lock().await.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>> {
        Ok(self.inner.lock().await.runs.get(&id).cloned())
    }

    async fn append_event(&self, event: &Event) -> Result<()> {
        self.inner.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, campaign_id: CampaignId) -> Result<Vec<Event>> {
        let mut events: Vec<_> = self
            .inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn save_checkpoint(&self, checkpoint: &CampaignCheckpoint) -> Result<()> {
        self.inner
            .lock()
            .await
            .checkpoints
            .insert(checkpoint.campaign_id, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, campaign_id: CampaignId) -> Result<Option<CampaignCheckpoint>> {
        Ok(self
            .inner
            .lock()
            .await
            .checkpoints
            .get(&campaign_id)
            .cloned())
    }

    async fn save_campaign_plan(
        &self,
        campaign: &Campaign,
        missions: &[Mission],
        tasks: &[Task],
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.campaigns.insert(campaign.id, campaign.clone());
        for mission in missions {
            inner.missions.insert(mission.id, mission.clone());
        }
        for task in tasks {
            inner.tasks.insert(task.id, task.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcom_core::TransitionError;

    fn seeded() -> (MemoryStorage, Campaign, Mission, Task) {
        let campaign = Campaign::new("c", "intent", "end");
        let mission = Mission::new(campaign.id, "m", "statement", 0);
        let task = Task::new(mission.id, "t", "verify", 0);
        let storage = MemoryStorage::new();
        (storage, campaign, mission, task)
    }

    #[tokio::test]
    async fn plan_write_is_visible_as_a_whole() {
        let (storage, campaign, mission, task) = seeded();
        storage
            .save_campaign_plan(&campaign, std::slice::from_ref(&mission), std::slice::from_ref(&task))
            .await
            .unwrap();

        assert!(storage.load_campaign(campaign.id).await.unwrap().is_some());
        assert_eq!(storage.list_missions(campaign.id).await.unwrap().len(), 1);
        assert_eq!(storage.list_tasks(mission.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn guarded_transition_rejects_illegal_moves() {
        let (storage, campaign, mission, task) = seeded();
        storage
            .save_campaign_plan(&campaign, &[mission], &[task.clone()])
            .await
            .unwrap();

        // A pending task cannot complete without running first.
        let err = storage.complete_task(task.id, "out", 0.1, 10).await;
        assert!(matches!(
            err,
            Err(StorageError::Transition(TransitionError { .. }))
        ));
    }

    #[tokio::test]
    async fn usage_increments_roll_up_to_mission_and_campaign() {
        let (storage, campaign, mission, task) = seeded();
        storage
            .save_campaign_plan(&campaign, &[mission.clone()], &[task])
            .await
            .unwrap();

        storage.add_usage(mission.id, 0.25, 100).await.unwrap();
        storage.add_usage(mission.id, 0.75, 300).await.unwrap();

        let mission = storage.load_mission(mission.id).await.unwrap().unwrap();
        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert!((mission.total_cost_usd - 1.0).abs() < f64::EPSILON);
        assert_eq!(mission.total_tokens, 400);
        assert!((campaign.total_cost_usd - 1.0).abs() < f64::EPSILON);
        assert_eq!(campaign.total_tokens, 400);
    }

    #[tokio::test]
    async fn concurrent_sibling_settlement_loses_no_increments() {
        let (storage, campaign, mission, _) = seeded();
        storage
            .save_campaign_plan(&campaign, &[mission.clone()], &[])
            .await
            .unwrap();

        let storage = std::sync::Arc::new(storage);
        let mut handles = Vec::new();
        for _ in 0..32 {
            let storage = storage.clone();
            let mission_id = mission.id;
            handles.push(tokio::spawn(async move {
                storage.add_usage(mission_id, 0.5, 50).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert!((campaign.total_cost_usd - 16.0).abs() < 1e-9);
        assert_eq!(campaign.total_tokens, 1600);
    }

    #[tokio::test]
    async fn listings_come_back_in_sequence_order() {
        let (storage, campaign, _, _) = seeded();
        storage.save_campaign(&campaign).await.unwrap();
        let m2 = Mission::new(campaign.id, "second", "s", 2);
        let m0 = Mission::new(campaign.id, "first", "s", 0);
        storage.save_mission(&m2).await.unwrap();
        storage.save_mission(&m0).await.unwrap();

        let missions = storage.list_missions(campaign.id).await.unwrap();
        assert_eq!(missions[0].sequence, 0);
        assert_eq!(missions[1].sequence, 2);
    }

    #[tokio::test]
    async fn unknown_ids_surface_as_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.fail_task(TaskId::new(), "boom").await;
        assert!(matches!(err, Err(StorageError::NotFound(_))));
    }
}
