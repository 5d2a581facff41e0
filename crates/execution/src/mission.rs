//! Mission scheduler.
//!
//! Runs one mission's tasks group by group: members of a sequence group are
//! dispatched concurrently and settled together; the next group starts only
//! once every member has settled and no failure policy has halted the
//! mission. The mission always reaches review, and always signals settlement,
//! whatever its tasks did.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use opcom_aar::AarAggregator;
use opcom_core::{
    AuditEvent, Campaign, CampaignStatus, Event, FailurePolicy, Mission, MissionId, MissionStatus,
    Task, TaskStatus,
};
use opcom_storage::{Storage, StorageError};

use crate::signal::{Signal, SignalHub};
use crate::{ExecutionError, TaskRunner};

/// Schedules one mission's task groups to settlement.
pub struct MissionScheduler {
    storage: Arc<dyn Storage>,
    runner: Arc<TaskRunner>,
    aar: Arc<AarAggregator>,
    signals: SignalHub,
}

impl MissionScheduler {
    /// Create a scheduler.
    pub fn new(
        storage: Arc<dyn Storage>,
        runner: Arc<TaskRunner>,
        aar: Arc<AarAggregator>,
        signals: SignalHub,
    ) -> Self {
        Self {
            storage,
            runner,
            aar,
            signals,
        }
    }

    /// Run a mission to settlement.
    ///
    /// Re-entrant: a mission that already settled only re-publishes its
    /// settlement signal, and re-dispatching a group never re-invokes the
    /// executor for tasks that already settled.
    pub async fn run(&self, mission_id: MissionId) -> Result<(), ExecutionError> {
        let mission = self
            .storage
            .load_mission(mission_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("mission {mission_id}")))?;

        if mission.status.is_settled() {
            debug!(mission = %mission_id, status = %mission.status, "mission already settled");
            self.publish_settled(&mission);
            return Ok(());
        }

        let campaign = self
            .storage
            .load_campaign(mission.campaign_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("campaign {}", mission.campaign_id)))?;

        let starting = mission.status == MissionStatus::Pending;
        let mission = self
            .storage
            .transition_mission(mission_id, MissionStatus::Executing)
            .await?;
        if starting {
            self.storage
                .append_event(
                    &Event::new(
                        campaign.id,
                        AuditEvent::MissionStarted,
                        format!("mission {} started", mission.name),
                    )
                    .with_metadata(serde_json::json!({ "mission_id": mission_id.to_string() })),
                )
                .await?;
            info!(mission = %mission_id, name = %mission.name, "mission started");
        }

        let tasks = self.storage.list_tasks(mission_id).await?;
        let mut groups: BTreeMap<u32, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            groups.entry(task.sequence).or_default().push(task);
        }

        let mut halted = false;
        for (sequence, group) in &groups {
            if halted {
                // Tasks in groups past the halt stay pending; they were never
                // dispatched and are not reclassified.
                break;
            }
            debug!(mission = %mission_id, sequence, size = group.len(), "dispatching sequence group");
            halted = self.settle_group(&mission, &campaign, group).await?;
        }

        self.storage
            .transition_mission(mission_id, MissionStatus::Reviewing)
            .await?;

        // Review runs unconditionally - failed missions still produce lessons.
        let mission = match self.aar.review_mission(mission_id).await {
            Ok(_) => self
                .storage
                .load_mission(mission_id)
                .await?
                .unwrap_or(mission),
            Err(err) => {
                error!(mission = %mission_id, error = %err, "mission review failed");
                self.storage
                    .transition_mission(mission_id, MissionStatus::Failed)
                    .await?
            }
        };

        self.publish_settled(&mission);
        Ok(())
    }

    /// Dispatch every pending member of one sequence group and settle them
    /// all. Returns whether the mission's failure flag was raised.
    async fn settle_group(
        &self,
        mission: &Mission,
        campaign: &Campaign,
        group: &[Task],
    ) -> Result<bool, ExecutionError> {
        let pending: Vec<&Task> = group
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();

        // Scatter: one spawned unit per pending task, no cancellation paths.
        let handles: Vec<_> = pending
            .iter()
            .map(|task| {
                let runner = Arc::clone(&self.runner);
                let mission = mission.clone();
                let campaign = campaign.clone();
                let task_id = task.id;
                tokio::spawn(async move { runner.run(task_id, &mission, &campaign).await })
            })
            .collect();

        // Gather: wait for every member, collecting per-task outcomes instead
        // of short-circuiting on the first failure.
        let outcomes = join_all(handles).await;

        let mut halted = false;
        for (task, joined) in pending.iter().zip(outcomes) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(task = %task.id, error = %join_err, "task panicked during execution");
                    // The task may have settled before the panic; only a task
                    // still pending or running needs the failure recorded.
                    let _ = self
                        .storage
                        .fail_task(task.id, &format!("task panicked: {join_err}"))
                        .await;
                    Err(ExecutionError::Agent(opcom_agents::AgentError::Executor(
                        format!("task panicked: {join_err}"),
                    )))
                }
            };

            let Err(err) = outcome else { continue };
            match mission.actions_on.default {
                Some(FailurePolicy::Skip) => {
                    self.storage.skip_task(task.id).await?;
                    self.storage
                        .append_event(
                            &Event::new(
                                campaign.id,
                                AuditEvent::TaskSkipped,
                                format!("task {} skipped: {err}", task.name),
                            )
                            .with_metadata(serde_json::json!({ "task_id": task.id.to_string() })),
                        )
                        .await?;
                    debug!(task = %task.id, "failure absorbed by skip policy");
                }
                Some(FailurePolicy::Pause) => {
                    self.storage
                        .transition_campaign(campaign.id, CampaignStatus::Paused)
                        .await?;
                    self.storage
                        .append_event(&Event::new(
                            campaign.id,
                            AuditEvent::Paused,
                            format!("campaign paused by mission {} after task {} failed",
                                mission.name, task.name),
                        ))
                        .await?;
                    warn!(mission = %mission.id, task = %task.id, "pause policy raised");
                    halted = true;
                }
                None => {
                    warn!(mission = %mission.id, task = %task.id, "task failure halts mission");
                    halted = true;
                }
            }
        }
        Ok(halted)
    }

    fn publish_settled(&self, mission: &Mission) {
        self.signals.publish(Signal::MissionComplete {
            campaign_id: mission.campaign_id,
            mission_id: mission.id,
        });
    }
}
