//! Campaign scheduler.
//!
//! Dispatches mission sequence groups in ascending order, barrier-waiting on
//! every member's settlement signal before advancing. Settlement - not
//! success - satisfies the barrier: a failed or paused mission never blocks
//! the campaign from reaching its next group, and the terminal status is
//! decided later, by the review aggregator.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use opcom_aar::AarAggregator;
use opcom_core::{
    AuditEvent, CampaignCheckpoint, CampaignId, CampaignStatus, Event, Mission, MissionId,
    MissionStatus,
};
use opcom_storage::{Storage, StorageError};

use crate::signal::{Signal, SignalHub};
use crate::{ExecutionError, MissionScheduler, SchedulerConfig};

/// Schedules a campaign's mission groups to settlement.
pub struct CampaignScheduler {
    storage: Arc<dyn Storage>,
    missions: Arc<MissionScheduler>,
    aar: Arc<AarAggregator>,
    signals: SignalHub,
    config: SchedulerConfig,
}

impl CampaignScheduler {
    /// Create a scheduler.
    pub fn new(
        storage: Arc<dyn Storage>,
        missions: Arc<MissionScheduler>,
        aar: Arc<AarAggregator>,
        signals: SignalHub,
    ) -> Self {
        Self {
            storage,
            missions,
            aar,
            signals,
            config: SchedulerConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run a campaign to settlement and write its review.
    ///
    /// Re-entrant: an executing campaign resumes from its persisted state -
    /// settled missions satisfy their barrier slot immediately and are never
    /// re-dispatched.
    pub async fn run(&self, campaign_id: CampaignId) -> Result<(), ExecutionError> {
        let campaign = self
            .storage
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("campaign {campaign_id}")))?;

        let campaign = match campaign.status {
            CampaignStatus::Ready => {
                let campaign = self
                    .storage
                    .transition_campaign(campaign_id, CampaignStatus::Executing)
                    .await?;
                self.storage
                    .append_event(&Event::new(
                        campaign_id,
                        AuditEvent::Executing,
                        format!("campaign {} executing", campaign.name),
                    ))
                    .await?;
                info!(campaign = %campaign_id, name = %campaign.name, "campaign executing");
                campaign
            }
            // Paused campaigns keep settling: pause annotates status, it does
            // not gate group dispatch.
            CampaignStatus::Executing | CampaignStatus::Paused => campaign,
            CampaignStatus::Complete | CampaignStatus::Failed => {
                debug!(campaign = %campaign_id, "campaign already settled");
                return Ok(());
            }
            status => {
                return Err(ExecutionError::NotExecutable {
                    status: status.to_string(),
                })
            }
        };

        // Statuses are authoritative for resume; the checkpoint tells an
        // operator where a restarted scheduler picked up.
        if let Some(checkpoint) = self.storage.load_checkpoint(campaign_id).await? {
            info!(
                campaign = %campaign_id,
                sequence = ?checkpoint.active_sequence,
                settled = checkpoint.settled_missions.len(),
                "resuming from checkpoint"
            );
        }

        let missions = self.storage.list_missions(campaign_id).await?;
        let mut groups: BTreeMap<u32, Vec<Mission>> = BTreeMap::new();
        for mission in missions {
            groups.entry(mission.sequence).or_default().push(mission);
        }

        let timeout_minutes = campaign
            .timeout_minutes
            .unwrap_or(self.config.default_timeout_minutes);
        let total: usize = groups.values().map(Vec::len).sum();
        let mut settled: Vec<MissionId> = groups
            .values()
            .flatten()
            .filter(|m| m.status.is_settled())
            .map(|m| m.id)
            .collect();

        for (sequence, group) in &groups {
            let awaiting: HashSet<MissionId> = group
                .iter()
                .filter(|m| !m.status.is_settled())
                .map(|m| m.id)
                .collect();
            if awaiting.is_empty() {
                continue;
            }

            // Subscribe before dispatching so no settlement signal can slip
            // between spawn and wait.
            let rx = self.signals.subscribe();

            debug!(campaign = %campaign_id, sequence, size = awaiting.len(), "dispatching mission group");
            for mission in group.iter().filter(|m| awaiting.contains(&m.id)) {
                self.dispatch_mission(campaign_id, mission.id);
            }

            self.checkpoint(campaign_id, Some(*sequence), &settled).await?;
            self.barrier_wait(campaign_id, awaiting, rx, timeout_minutes, &mut settled)
                .await?;

            self.storage
                .set_campaign_progress(campaign_id, ((settled.len() * 100) / total.max(1)) as u8)
                .await?;
            self.checkpoint(campaign_id, Some(*sequence), &settled).await?;
        }

        self.checkpoint(campaign_id, None, &settled).await?;
        self.signals.publish(Signal::CampaignAar { campaign_id });
        self.aar.review_campaign(campaign_id).await?;
        Ok(())
    }

    /// Publish the dispatch signal and spawn the mission run. A run that dies
    /// on an infrastructure error is marked failed and still signals
    /// settlement, so the barrier never waits on a corpse.
    fn dispatch_mission(&self, campaign_id: CampaignId, mission_id: MissionId) {
        self.signals.publish(Signal::MissionExecute {
            campaign_id,
            mission_id,
        });

        let missions = Arc::clone(&self.missions);
        let storage = Arc::clone(&self.storage);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            if let Err(err) = missions.run(mission_id).await {
                error!(mission = %mission_id, error = %err, "mission run failed");
                if let Err(err) = storage
                    .transition_mission(mission_id, MissionStatus::Failed)
                    .await
                {
                    error!(mission = %mission_id, error = %err, "could not record mission failure");
                }
                signals.publish(Signal::MissionComplete {
                    campaign_id,
                    mission_id,
                });
            }
        });
    }

    /// Wait for every mission in `awaiting` to signal settlement, up to the
    /// timeout. Missions that never signal are marked failed and abandoned;
    /// the campaign proceeds regardless of individual outcomes.
    async fn barrier_wait(
        &self,
        campaign_id: CampaignId,
        mut awaiting: HashSet<MissionId>,
        mut rx: tokio::sync::broadcast::Receiver<Signal>,
        timeout_minutes: u64,
        settled: &mut Vec<MissionId>,
    ) -> Result<(), ExecutionError> {
        let deadline = Instant::now() + Duration::from_secs(timeout_minutes * 60);

        while !awaiting.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.abandon(campaign_id, &mut awaiting, settled, timeout_minutes)
                    .await?;
                break;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(Signal::MissionComplete {
                    campaign_id: cid,
                    mission_id,
                })) if cid == campaign_id => {
                    if awaiting.remove(&mission_id) {
                        settled.push(mission_id);
                        debug!(mission = %mission_id, remaining = awaiting.len(), "mission settled");
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    // Signals are wake-ups; the store is the source of truth.
                    warn!(campaign = %campaign_id, skipped, "signal lag, resyncing from storage");
                    self.resync(&mut awaiting, settled).await?;
                }
                Ok(Err(RecvError::Closed)) => {
                    self.resync(&mut awaiting, settled).await?;
                    if !awaiting.is_empty() {
                        self.abandon(campaign_id, &mut awaiting, settled, timeout_minutes)
                            .await?;
                    }
                    break;
                }
                Err(_elapsed) => {
                    self.abandon(campaign_id, &mut awaiting, settled, timeout_minutes)
                        .await?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Drop settled missions from `awaiting` based on persisted status.
    async fn resync(
        &self,
        awaiting: &mut HashSet<MissionId>,
        settled: &mut Vec<MissionId>,
    ) -> Result<(), ExecutionError> {
        let ids: Vec<MissionId> = awaiting.iter().copied().collect();
        for id in ids {
            let is_settled = self
                .storage
                .load_mission(id)
                .await?
                .map(|m| m.status.is_settled())
                .unwrap_or(false);
            if is_settled {
                awaiting.remove(&id);
                settled.push(id);
            }
        }
        Ok(())
    }

    /// Give up on missions that never signalled settlement.
    async fn abandon(
        &self,
        campaign_id: CampaignId,
        awaiting: &mut HashSet<MissionId>,
        settled: &mut Vec<MissionId>,
        timeout_minutes: u64,
    ) -> Result<(), ExecutionError> {
        let timeout = ExecutionError::TimeoutExceeded {
            minutes: timeout_minutes,
        };
        for mission_id in awaiting.drain() {
            warn!(mission = %mission_id, campaign = %campaign_id, error = %timeout, "barrier timeout, abandoning mission");
            if let Err(err) = self
                .storage
                .transition_mission(mission_id, MissionStatus::Failed)
                .await
            {
                // It may have settled between the timeout and this write.
                debug!(mission = %mission_id, error = %err, "abandonment not recorded");
            }
            settled.push(mission_id);
        }
        Ok(())
    }

    async fn checkpoint(
        &self,
        campaign_id: CampaignId,
        active_sequence: Option<u32>,
        settled: &[MissionId],
    ) -> Result<(), ExecutionError> {
        self.storage
            .save_checkpoint(&CampaignCheckpoint {
                campaign_id,
                active_sequence,
                settled_missions: settled.to_vec(),
                updated_at: chrono::Utc::now(),
            })
            .await?;
        Ok(())
    }
}
