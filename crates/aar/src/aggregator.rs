//! Review aggregation across the work unit hierarchy.

use std::sync::Arc;

use tracing::{debug, info};

use opcom_agents::{AgentError, Synthesizer, TaskEvaluator};
use opcom_core::{
    AuditEvent, Campaign, CampaignAar, CampaignAarInput, CampaignId, CampaignStatus, Event,
    Mission, MissionAar, MissionAarInput, MissionId, MissionReview, MissionStatus, Task,
    TaskReview, TaskStatus,
};
use opcom_storage::{Storage, StorageError};

/// Errors from review aggregation.
#[derive(Debug, thiserror::Error)]
pub enum AarError {
    /// Storage failure while gathering or writing reviews
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The synthesizer rejected the review input
    #[error(transparent)]
    Synthesis(#[from] AgentError),
}

/// Aggregates settled outcomes into mission and campaign reviews.
pub struct AarAggregator {
    storage: Arc<dyn Storage>,
    synthesizer: Arc<dyn Synthesizer>,
    evaluator: Option<Arc<dyn TaskEvaluator>>,
}

impl AarAggregator {
    /// Create an aggregator.
    pub fn new(storage: Arc<dyn Storage>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            storage,
            synthesizer,
            evaluator: None,
        }
    }

    /// Attach the external per-task evaluation lookup.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn TaskEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    async fn review_row(&self, task: &Task) -> TaskReview {
        let evaluation = match &self.evaluator {
            Some(evaluator) => evaluator.score(task).await,
            None => None,
        };
        let (score, sustain, improve) = match evaluation {
            Some(e) => (Some(e.score), e.sustain, e.improve),
            None => (None, Vec::new(), Vec::new()),
        };
        TaskReview {
            name: task.name.clone(),
            status: task.status,
            task_type: task.task_type,
            score,
            cost_usd: task.cost_usd,
            tokens: task.tokens,
            duration_ms: task.duration_ms(),
            sustain,
            improve,
            error: task.error.clone(),
        }
    }

    /// Review one mission: synthesize its AAR from settled tasks, write it
    /// back, and move the mission from reviewing to complete.
    ///
    /// Runs unconditionally at mission settlement - a mission whose tasks
    /// failed still gets reviewed, and still completes; the failures stay
    /// visible in the review counts and on the tasks themselves.
    pub async fn review_mission(&self, mission_id: MissionId) -> Result<MissionAar, AarError> {
        let mission = self
            .storage
            .load_mission(mission_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("mission {mission_id}")))?;
        let tasks = self.storage.list_tasks(mission_id).await?;

        let mut reviews = Vec::with_capacity(tasks.len());
        for task in &tasks {
            reviews.push(self.review_row(task).await);
        }

        let narrative = self
            .synthesizer
            .mission_aar(&MissionAarInput {
                mission_name: mission.name.clone(),
                mission_statement: mission.mission_statement.clone(),
                tasks: reviews.clone(),
            })
            .await?;

        let aar = assemble_mission_aar(&mission, &reviews, narrative);
        self.storage.set_mission_aar(mission_id, &aar).await?;
        self.storage
            .append_event(
                &Event::new(
                    mission.campaign_id,
                    AuditEvent::MissionAar,
                    format!("after-action review recorded for mission {}", mission.name),
                )
                .with_metadata(serde_json::json!({
                    "mission_id": mission_id.to_string(),
                    "completed_tasks": aar.completed_tasks,
                    "failed_tasks": aar.failed_tasks,
                    "skipped_tasks": aar.skipped_tasks,
                })),
            )
            .await?;
        self.storage
            .transition_mission(mission_id, MissionStatus::Complete)
            .await?;

        debug!(mission = %mission_id, "mission review written");
        Ok(aar)
    }

    /// Review the whole campaign once every mission has settled.
    ///
    /// Terminal rule: the campaign fails only when every mission failed;
    /// a single non-failed mission completes the campaign. A campaign with no
    /// missions completes - there was nothing left undone.
    pub async fn review_campaign(&self, campaign_id: CampaignId) -> Result<CampaignAar, AarError> {
        let campaign = self
            .storage
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("campaign {campaign_id}")))?;
        let missions = self.storage.list_missions(campaign_id).await?;

        let mut mission_reviews = Vec::with_capacity(missions.len());
        let mut task_reviews = Vec::new();
        for mission in &missions {
            let tasks = self.storage.list_tasks(mission.id).await?;
            for task in &tasks {
                task_reviews.push(self.review_row(task).await);
            }
            mission_reviews.push(MissionReview {
                name: mission.name.clone(),
                status: mission.status,
                planned_tasks: tasks.len(),
                completed_tasks: tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Complete)
                    .count(),
                cost_usd: mission.total_cost_usd,
                tokens: mission.total_tokens,
                aar: mission.aar.clone(),
            });
        }

        let narrative = self
            .synthesizer
            .campaign_aar(&CampaignAarInput {
                campaign_name: campaign.name.clone(),
                intent: campaign.intent.clone(),
                end_state: campaign.end_state.clone(),
                missions: mission_reviews.clone(),
            })
            .await?;

        let aar = assemble_campaign_aar(&campaign, &mission_reviews, &task_reviews, narrative);

        let all_failed =
            !missions.is_empty() && missions.iter().all(|m| m.status == MissionStatus::Failed);
        let terminal = if all_failed {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Complete
        };

        self.storage.set_campaign_aar(campaign_id, &aar).await?;
        self.storage.set_campaign_progress(campaign_id, 100).await?;
        self.storage
            .append_event(
                &Event::new(
                    campaign_id,
                    AuditEvent::CampaignAar,
                    format!("after-action review recorded for campaign {}", campaign.name),
                )
                .with_metadata(serde_json::json!({
                    "completed_missions": aar.completed_missions,
                    "failed_missions": aar.failed_missions,
                })),
            )
            .await?;
        self.storage.transition_campaign(campaign_id, terminal).await?;
        self.storage
            .append_event(&Event::new(
                campaign_id,
                AuditEvent::Complete,
                format!("campaign settled {terminal}"),
            ))
            .await?;

        info!(campaign = %campaign_id, status = %terminal, "campaign review written");
        Ok(aar)
    }
}

fn score_stats(reviews: &[TaskReview]) -> (Option<f32>, Option<String>) {
    let scored: Vec<_> = reviews
        .iter()
        .filter_map(|r| r.score.map(|s| (r.name.clone(), s)))
        .collect();
    if scored.is_empty() {
        return (None, None);
    }
    let avg = scored.iter().map(|(_, s)| s).sum::<f32>() / scored.len() as f32;
    let lowest = scored
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.clone());
    (Some(avg), lowest)
}

fn assemble_mission_aar(
    mission: &Mission,
    reviews: &[TaskReview],
    narrative: opcom_core::AarNarrative,
) -> MissionAar {
    let count = |status: TaskStatus| reviews.iter().filter(|r| r.status == status).count();
    let (avg_task_score, lowest_scoring_task) = score_stats(reviews);

    let duration_ms = match (mission.started_at, mission.completed_at) {
        (Some(s), Some(c)) => (c - s).num_milliseconds().max(0) as u64,
        (Some(s), None) => (chrono::Utc::now() - s).num_milliseconds().max(0) as u64,
        _ => 0,
    };

    MissionAar {
        planned_tasks: reviews.len(),
        completed_tasks: count(TaskStatus::Complete),
        failed_tasks: count(TaskStatus::Failed),
        skipped_tasks: count(TaskStatus::Skipped),
        avg_task_score,
        lowest_scoring_task,
        total_cost_usd: reviews.iter().map(|r| r.cost_usd).sum(),
        total_tokens: reviews.iter().map(|r| r.tokens).sum(),
        duration_ms,
        sustain_patterns: narrative.sustain_patterns,
        improve_patterns: narrative.improve_patterns,
        summary: narrative.summary,
    }
}

fn assemble_campaign_aar(
    campaign: &Campaign,
    missions: &[MissionReview],
    task_reviews: &[TaskReview],
    narrative: opcom_core::CampaignNarrative,
) -> CampaignAar {
    let (avg_task_score, lowest_scoring_task) = score_stats(task_reviews);

    let actual_duration_ms = match campaign.started_at {
        Some(s) => (chrono::Utc::now() - s).num_milliseconds().max(0) as u64,
        None => 0,
    };

    CampaignAar {
        planned_missions: missions.len(),
        completed_missions: missions
            .iter()
            .filter(|m| m.status == MissionStatus::Complete)
            .count(),
        failed_missions: missions
            .iter()
            .filter(|m| m.status == MissionStatus::Failed)
            .count(),
        planned_tasks: missions.iter().map(|m| m.planned_tasks).sum(),
        completed_tasks: missions.iter().map(|m| m.completed_tasks).sum(),
        avg_task_score,
        lowest_scoring_task,
        planned_duration_ms: campaign.estimated_duration_minutes.map(|m| m * 60_000),
        actual_duration_ms,
        total_cost_usd: missions.iter().map(|m| m.cost_usd).sum(),
        total_tokens: missions.iter().map(|m| m.tokens).sum(),
        sustain_patterns: narrative.sustain_patterns,
        improve_patterns: narrative.improve_patterns,
        intent_achieved: narrative.intent_achieved,
        end_state_reached: narrative.end_state_reached,
        lessons_learned: narrative.lessons_learned,
        summary: narrative.summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opcom_agents::TemplateSynthesizer;
    use opcom_core::TaskScore;
    use opcom_storage::MemoryStorage;

    struct FixedScores;

    #[async_trait]
    impl TaskEvaluator for FixedScores {
        async fn score(&self, task: &Task) -> Option<TaskScore> {
            let score = match task.name.as_str() {
                "north" => 0.9,
                "south" => 0.4,
                _ => return None,
            };
            Some(TaskScore {
                score,
                sustain: Vec::new(),
                improve: Vec::new(),
            })
        }
    }

    async fn seed_mission(
        storage: &MemoryStorage,
        statuses: &[(&str, TaskStatus)],
    ) -> (Campaign, Mission) {
        let mut campaign = Campaign::new("c", "intent", "end");
        campaign.transition(CampaignStatus::Analyzing).unwrap();
        campaign.transition(CampaignStatus::Ready).unwrap();
        campaign.transition(CampaignStatus::Executing).unwrap();

        let mut mission = Mission::new(campaign.id, "recon", "map the area", 0);
        mission.transition(MissionStatus::Executing).unwrap();
        mission.transition(MissionStatus::Reviewing).unwrap();

        let mut tasks = Vec::new();
        for (name, status) in statuses {
            let mut task = Task::new(mission.id, *name, "survey", 0);
            if *status != TaskStatus::Pending {
                task.transition(TaskStatus::Running).unwrap();
                if *status == TaskStatus::Complete {
                    task.cost_usd = 0.5;
                    task.tokens = 100;
                }
                task.transition(*status).unwrap();
            }
            tasks.push(task);
        }

        storage
            .save_campaign_plan(&campaign, std::slice::from_ref(&mission), &tasks)
            .await
            .unwrap();
        (campaign, mission)
    }

    fn aggregator(storage: Arc<MemoryStorage>) -> AarAggregator {
        AarAggregator::new(storage, Arc::new(TemplateSynthesizer)).with_evaluator(Arc::new(FixedScores))
    }

    #[tokio::test]
    async fn mission_review_counts_and_completes() {
        let storage = Arc::new(MemoryStorage::new());
        let (_, mission) = seed_mission(
            &storage,
            &[
                ("north", TaskStatus::Complete),
                ("south", TaskStatus::Failed),
                ("report", TaskStatus::Skipped),
            ],
        )
        .await;

        let aar = aggregator(storage.clone())
            .review_mission(mission.id)
            .await
            .unwrap();

        assert_eq!(aar.planned_tasks, 3);
        assert_eq!(aar.completed_tasks, 1);
        assert_eq!(aar.failed_tasks, 1);
        assert_eq!(aar.skipped_tasks, 1);
        assert_eq!(aar.lowest_scoring_task.as_deref(), Some("south"));

        let mission = storage.load_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::Complete);
        assert!(mission.aar.is_some());
        // Reconciled to the settled sums.
        assert!((mission.total_cost_usd - 0.5).abs() < f64::EPSILON);
        assert_eq!(mission.total_tokens, 100);
    }

    #[tokio::test]
    async fn campaign_completes_when_any_mission_survived() {
        let storage = Arc::new(MemoryStorage::new());
        let (campaign, mission) = seed_mission(&storage, &[("north", TaskStatus::Complete)]).await;

        // One failed sibling mission alongside the reviewed one.
        let mut failed = Mission::new(campaign.id, "doomed", "s", 0);
        failed.transition(MissionStatus::Executing).unwrap();
        failed.transition(MissionStatus::Failed).unwrap();
        storage.save_mission(&failed).await.unwrap();

        let agg = aggregator(storage.clone());
        agg.review_mission(mission.id).await.unwrap();
        agg.review_campaign(campaign.id).await.unwrap();

        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Complete);
        assert_eq!(campaign.progress, 100);
        assert!(campaign.completed_at.is_some());
        let aar = campaign.aar.unwrap();
        assert_eq!(aar.planned_missions, 2);
        assert_eq!(aar.failed_missions, 1);
    }

    #[tokio::test]
    async fn campaign_fails_only_when_every_mission_failed() {
        let storage = Arc::new(MemoryStorage::new());
        let mut campaign = Campaign::new("c", "i", "e");
        campaign.transition(CampaignStatus::Analyzing).unwrap();
        campaign.transition(CampaignStatus::Ready).unwrap();
        campaign.transition(CampaignStatus::Executing).unwrap();
        storage.save_campaign(&campaign).await.unwrap();

        for name in ["m1", "m2"] {
            let mut mission = Mission::new(campaign.id, name, "s", 0);
            mission.transition(MissionStatus::Executing).unwrap();
            mission.transition(MissionStatus::Failed).unwrap();
            storage.save_mission(&mission).await.unwrap();
        }

        aggregator(storage.clone())
            .review_campaign(campaign.id)
            .await
            .unwrap();

        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Failed);
    }

    #[tokio::test]
    async fn empty_campaign_completes() {
        let storage = Arc::new(MemoryStorage::new());
        let mut campaign = Campaign::new("c", "i", "e");
        campaign.transition(CampaignStatus::Analyzing).unwrap();
        campaign.transition(CampaignStatus::Ready).unwrap();
        campaign.transition(CampaignStatus::Executing).unwrap();
        storage.save_campaign(&campaign).await.unwrap();

        aggregator(storage.clone())
            .review_campaign(campaign.id)
            .await
            .unwrap();

        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Complete);
    }
}
