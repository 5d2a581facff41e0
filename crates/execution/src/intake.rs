//! Campaign intake: decomposition, assignment, and atomic materialization.
//!
//! A draft campaign is analyzed into a mission/task graph, executors are
//! assigned, and the whole graph is written in one step before any execution
//! begins. Plans are validated here, on ingestion - an assignment that does
//! not resolve fails the campaign at intake instead of surfacing mid-flight.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use opcom_agents::{AgentError, AgentRoster, Decomposer, Planner};
use opcom_core::{
    AssignmentPlan, AuditEvent, Campaign, CampaignId, CampaignPlan, CampaignStatus, Event, Mission,
    Task, TaskType,
};
use opcom_storage::{Storage, StorageError};

use crate::ExecutionError;

/// Analyzes draft campaigns into executable plans.
pub struct CampaignIntake {
    storage: Arc<dyn Storage>,
    decomposer: Arc<dyn Decomposer>,
    planner: Arc<dyn Planner>,
    roster: AgentRoster,
}

impl CampaignIntake {
    /// Create an intake pipeline.
    pub fn new(
        storage: Arc<dyn Storage>,
        decomposer: Arc<dyn Decomposer>,
        planner: Arc<dyn Planner>,
        roster: AgentRoster,
    ) -> Self {
        Self {
            storage,
            decomposer,
            planner,
            roster,
        }
    }

    /// Take a draft campaign through analysis to ready.
    pub async fn analyze(&self, campaign_id: CampaignId) -> Result<(), ExecutionError> {
        let mut campaign = self
            .storage
            .transition_campaign(campaign_id, CampaignStatus::Analyzing)
            .await?;
        self.storage
            .append_event(&Event::new(
                campaign_id,
                AuditEvent::Analyzing,
                format!("analyzing campaign {}", campaign.name),
            ))
            .await?;

        let plan = match self.run_analysis(&campaign).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(campaign = %campaign_id, error = %err, "intake failed");
                self.storage
                    .transition_campaign(campaign_id, CampaignStatus::Failed)
                    .await?;
                return Err(err);
            }
        };
        let (assignment, missions, tasks) = plan;

        campaign.estimated_duration_minutes = assignment.estimated_duration_minutes;
        campaign.transition(CampaignStatus::Ready).map_err(StorageError::from)?;
        self.storage
            .save_campaign_plan(&campaign, &missions, &tasks)
            .await?;

        self.storage
            .append_event(
                &Event::new(
                    campaign_id,
                    AuditEvent::Planned,
                    format!("campaign {} planned and ready", campaign.name),
                )
                .with_metadata(serde_json::json!({
                    "missions": missions.len(),
                    "tasks": tasks.len(),
                    "strategy": assignment.execution_strategy,
                })),
            )
            .await?;
        info!(campaign = %campaign_id, missions = missions.len(), tasks = tasks.len(), "campaign ready");
        Ok(())
    }

    async fn run_analysis(
        &self,
        campaign: &Campaign,
    ) -> Result<(AssignmentPlan, Vec<Mission>, Vec<Task>), ExecutionError> {
        let plan = self.decomposer.decompose(campaign).await?;
        validate_plan(&plan)?;
        self.storage
            .append_event(
                &Event::new(
                    campaign.id,
                    AuditEvent::Analyzed,
                    format!("campaign {} decomposed", campaign.name),
                )
                .with_metadata(serde_json::json!({
                    "missions": plan.missions.len(),
                    "tasks": plan.missions.iter().map(|m| m.tasks.len()).sum::<usize>(),
                    "essential_task": plan.essential_task,
                })),
            )
            .await?;

        let assignment = self.planner.assign(campaign, &self.roster, &plan).await?;
        let (missions, tasks) = self.materialize(campaign, &plan, &assignment)?;
        Ok((assignment, missions, tasks))
    }

    /// Turn validated drafts and assignments into persisted work units.
    fn materialize(
        &self,
        campaign: &Campaign,
        plan: &CampaignPlan,
        assignment: &AssignmentPlan,
    ) -> Result<(Vec<Mission>, Vec<Task>), ExecutionError> {
        // mission name -> task name -> agent slug
        let mut assigned: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
        for mission in &assignment.assignments {
            let known = plan.missions.iter().any(|m| m.name == mission.mission_name);
            if !known {
                return Err(ExecutionError::InvalidPlan(format!(
                    "assignment references unknown mission `{}`",
                    mission.mission_name
                )));
            }
            let tasks = assigned.entry(mission.mission_name.as_str()).or_default();
            for task in &mission.tasks {
                if !self.roster.contains(&task.agent_slug) {
                    return Err(AgentError::ExecutorNotFound(task.agent_slug.clone()).into());
                }
                tasks.insert(task.task_name.as_str(), task.agent_slug.as_str());
            }
        }

        let mut missions = Vec::new();
        let mut tasks = Vec::new();
        for draft in &plan.missions {
            let mut mission = Mission::new(
                campaign.id,
                draft.name.clone(),
                draft.mission_statement.clone(),
                draft.sequence,
            )
            .with_priority(draft.priority);
            mission.actions_on = draft.actions_on.clone();

            let mission_assignments = assigned.get(draft.name.as_str());
            for task_draft in &draft.tasks {
                let mut task = Task::new(
                    mission.id,
                    task_draft.name.clone(),
                    task_draft.task_verb.clone(),
                    task_draft.sequence,
                )
                .with_type(task_draft.task_type);
                if let Some(instructions) = &task_draft.coordinating_instructions {
                    task.coordinating_instructions = instructions.clone();
                }
                if task_draft.name == plan.essential_task {
                    task.task_type = TaskType::Essential;
                }
                if let Some(slug) =
                    mission_assignments.and_then(|m| m.get(task_draft.name.as_str()))
                {
                    task.assigned_agent = Some((*slug).to_string());
                }

                if task.executor_identity().is_none() {
                    return Err(ExecutionError::InvalidPlan(format!(
                        "task `{}` in mission `{}` has no executor",
                        task_draft.name, draft.name
                    )));
                }
                tasks.push(task);
            }
            missions.push(mission);
        }
        Ok((missions, tasks))
    }
}

/// Structural validation of a decomposition.
fn validate_plan(plan: &CampaignPlan) -> Result<(), ExecutionError> {
    if plan.missions.is_empty() {
        return Err(ExecutionError::InvalidPlan(
            "decomposition produced no missions".to_string(),
        ));
    }
    let mut names = std::collections::HashSet::new();
    for mission in &plan.missions {
        if !names.insert(mission.name.as_str()) {
            return Err(ExecutionError::InvalidPlan(format!(
                "duplicate mission name `{}`",
                mission.name
            )));
        }
        if mission.priority > 10 {
            return Err(ExecutionError::InvalidPlan(format!(
                "mission `{}` priority {} exceeds 10",
                mission.name, mission.priority
            )));
        }
        if mission.tasks.is_empty() {
            return Err(ExecutionError::InvalidPlan(format!(
                "mission `{}` has no tasks",
                mission.name
            )));
        }
        let mut task_names = std::collections::HashSet::new();
        for task in &mission.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(ExecutionError::InvalidPlan(format!(
                    "duplicate task name `{}` in mission `{}`",
                    task.name, mission.name
                )));
            }
        }
    }
    Ok(())
}
