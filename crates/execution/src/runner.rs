//! Task executor adapter.
//!
//! Bridges one pending task to the external executor: resolves the executor
//! identity, composes the execution context, records the run correlation,
//! settles the task, and rolls its usage into the mission and campaign
//! aggregates. Failures are recorded on the task and re-raised so the mission
//! scheduler observes a rejected unit of work.

use std::sync::Arc;

use tracing::{debug, info, warn};

use opcom_agents::{AgentError, AgentRoster, Executor, Pricing};
use opcom_core::{AuditEvent, Campaign, Event, Mission, RunRecord, Task, TaskId, TaskStatus};
use opcom_storage::{Storage, StorageError};

use crate::{ExecutionError, SchedulerConfig};

/// Executes single tasks through the external executor.
pub struct TaskRunner {
    storage: Arc<dyn Storage>,
    executor: Arc<dyn Executor>,
    roster: AgentRoster,
    pricing: Pricing,
    result_cap: usize,
}

impl TaskRunner {
    /// Create a runner with default pricing and result cap.
    pub fn new(
        storage: Arc<dyn Storage>,
        executor: Arc<dyn Executor>,
        roster: AgentRoster,
    ) -> Self {
        Self {
            storage,
            executor,
            roster,
            pricing: Pricing::default(),
            result_cap: SchedulerConfig::default().result_cap,
        }
    }

    /// Set the pricing used to convert usage into spend.
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Set the stored-result cap.
    pub fn with_result_cap(mut self, bytes: usize) -> Self {
        self.result_cap = bytes;
        self
    }

    /// Run one task to settlement.
    ///
    /// A task that is no longer pending settles immediately as a no-op: no
    /// executor call, no counter mutation. This is what makes re-running a
    /// dispatch step after a substrate retry safe.
    pub async fn run(
        &self,
        task_id: TaskId,
        mission: &Mission,
        campaign: &Campaign,
    ) -> Result<(), ExecutionError> {
        let task = self
            .storage
            .load_task(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;

        if task.status != TaskStatus::Pending {
            debug!(task = %task_id, status = %task.status, "task already dispatched, skipping");
            return Ok(());
        }

        let identity = task.executor_identity().map(str::to_string);
        let run = RunRecord::new(
            task_id,
            identity.clone().unwrap_or_else(|| "unassigned".to_string()),
        );
        self.storage.save_run(&run).await?;
        self.storage.set_task_running(task_id, run.id).await?;

        let agent = match identity {
            Some(slug) => match self.roster.resolve(&slug) {
                Ok(agent) => agent.clone(),
                Err(err) => return self.settle_failed(&task, campaign, err).await,
            },
            None => {
                let err = AgentError::ExecutorNotFound(format!("task {} has no executor", task.name));
                return self.settle_failed(&task, campaign, err).await;
            }
        };

        let prompt = compose_context(campaign, mission, &task);
        debug!(task = %task_id, agent = %agent.slug, "delegating to executor");

        match self.executor.execute(&agent, &prompt).await {
            Ok(output) => {
                let cost_usd = self.pricing.cost_usd(output.usage);
                let tokens = output.usage.total();
                let result = truncate(&output.text, self.result_cap);

                self.storage
                    .complete_task(task_id, result, cost_usd, tokens)
                    .await?;
                self.storage
                    .add_usage(mission.id, cost_usd, tokens)
                    .await?;

                let mut run = run;
                run.completed_at = Some(chrono::Utc::now());
                self.storage.save_run(&run).await?;

                self.storage
                    .append_event(
                        &Event::new(
                            campaign.id,
                            AuditEvent::TaskComplete,
                            format!("task {} completed", task.name),
                        )
                        .with_metadata(serde_json::json!({
                            "task_id": task_id.to_string(),
                            "agent": agent.slug,
                            "cost_usd": cost_usd,
                            "tokens": tokens,
                        })),
                    )
                    .await?;

                info!(task = %task_id, agent = %agent.slug, tokens, "task completed");
                Ok(())
            }
            Err(err) => self.settle_failed(&task, campaign, err).await,
        }
    }

    /// Record a failure on the task and re-raise it.
    async fn settle_failed(
        &self,
        task: &Task,
        campaign: &Campaign,
        err: AgentError,
    ) -> Result<(), ExecutionError> {
        warn!(task = %task.id, error = %err, "task failed");
        self.storage.fail_task(task.id, &err.to_string()).await?;
        self.storage
            .append_event(
                &Event::new(
                    campaign.id,
                    AuditEvent::TaskFailed,
                    format!("task {} failed: {err}", task.name),
                )
                .with_metadata(serde_json::json!({ "task_id": task.id.to_string() })),
            )
            .await?;
        Err(err.into())
    }
}

/// Compose the execution context handed to the executor.
fn compose_context(campaign: &Campaign, mission: &Mission, task: &Task) -> String {
    let mut prompt = format!(
        "Mission: {}\nTask: {} {}\n",
        mission.mission_statement, task.task_verb, task.name
    );
    if !task.coordinating_instructions.context.is_empty() {
        prompt.push_str("Coordinating instructions: ");
        prompt.push_str(&task.coordinating_instructions.context);
        prompt.push('\n');
    }
    if !campaign.constraints.is_empty() {
        prompt.push_str(&format!("Constraints: {}\n", campaign.constraints.join("; ")));
    }
    if !campaign.restraints.is_empty() {
        prompt.push_str(&format!("Restraints: {}\n", campaign.restraints.join("; ")));
    }
    prompt
}

/// Cap `text` at `cap` bytes without splitting a character.
fn truncate(text: &str, cap: usize) -> &str {
    if text.len() <= cap {
        return text;
    }
    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opcom_agents::{ExecutorOutput, TokenUsage};
    use opcom_core::{AgentProfile, CoordinatingInstructions};
    use opcom_storage::MemoryStorage;

    struct FixedExecutor {
        text: String,
    }

    #[async_trait]
    impl Executor for FixedExecutor {
        async fn execute(
            &self,
            _agent: &AgentProfile,
            _prompt: &str,
        ) -> Result<ExecutorOutput, AgentError> {
            Ok(ExecutorOutput {
                text: self.text.clone(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 100,
                },
            })
        }
    }

    fn roster() -> AgentRoster {
        AgentRoster::new(vec![AgentProfile {
            slug: "scout".to_string(),
            name: "Scout".to_string(),
            description: String::new(),
            tools: Vec::new(),
        }])
    }

    async fn seed(storage: &MemoryStorage) -> (Campaign, Mission, Task) {
        let mut campaign = Campaign::new("c", "i", "e");
        campaign.transition(opcom_core::CampaignStatus::Analyzing).unwrap();
        campaign.transition(opcom_core::CampaignStatus::Ready).unwrap();
        campaign.transition(opcom_core::CampaignStatus::Executing).unwrap();
        let mission = Mission::new(campaign.id, "m", "statement", 0);
        let task = Task::new(mission.id, "t", "survey", 0).with_agent("scout");
        storage
            .save_campaign_plan(&campaign, std::slice::from_ref(&mission), std::slice::from_ref(&task))
            .await
            .unwrap();
        (campaign, mission, task)
    }

    #[tokio::test]
    async fn success_settles_task_and_rolls_up_usage() {
        let storage = Arc::new(MemoryStorage::new());
        let (campaign, mission, task) = seed(&storage).await;
        let runner = TaskRunner::new(
            storage.clone(),
            Arc::new(FixedExecutor {
                text: "report".to_string(),
            }),
            roster(),
        );

        runner.run(task.id, &mission, &campaign).await.unwrap();

        let task = storage.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.result.as_deref(), Some("report"));
        assert_eq!(task.tokens, 200);
        assert!(task.execution_ref.is_some());

        let mission = storage.load_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(mission.total_tokens, 200);
        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.total_tokens, 200);
    }

    #[tokio::test]
    async fn redispatch_of_settled_task_is_a_noop() {
        let storage = Arc::new(MemoryStorage::new());
        let (campaign, mission, task) = seed(&storage).await;
        let runner = TaskRunner::new(
            storage.clone(),
            Arc::new(FixedExecutor {
                text: "report".to_string(),
            }),
            roster(),
        );

        runner.run(task.id, &mission, &campaign).await.unwrap();
        // Substrate retry replays the dispatch step.
        runner.run(task.id, &mission, &campaign).await.unwrap();

        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.total_tokens, 200, "no double counting");
    }

    #[tokio::test]
    async fn unresolvable_executor_fails_the_task_locally_and_reraises() {
        let storage = Arc::new(MemoryStorage::new());
        let (campaign, mission, _) = seed(&storage).await;
        let orphan = Task::new(mission.id, "orphan", "survey", 0).with_agent("ghost");
        storage.save_task(&orphan).await.unwrap();

        let runner = TaskRunner::new(
            storage.clone(),
            Arc::new(FixedExecutor {
                text: String::new(),
            }),
            roster(),
        );

        let err = runner.run(orphan.id, &mission, &campaign).await;
        assert!(matches!(
            err,
            Err(ExecutionError::Agent(AgentError::ExecutorNotFound(_)))
        ));

        let orphan = storage.load_task(orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.status, TaskStatus::Failed);
        assert!(orphan.error.unwrap().contains("ghost"));
        let campaign = storage.load_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.total_tokens, 0, "failures increment nothing");
    }

    #[tokio::test]
    async fn oversized_results_are_capped() {
        let storage = Arc::new(MemoryStorage::new());
        let (campaign, mission, task) = seed(&storage).await;
        let runner = TaskRunner::new(
            storage.clone(),
            Arc::new(FixedExecutor {
                text: "x".repeat(100),
            }),
            roster(),
        )
        .with_result_cap(10);

        runner.run(task.id, &mission, &campaign).await.unwrap();
        let task = storage.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(task.result.unwrap().len(), 10);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let cut = truncate(text, 2);
        assert!(cut.len() <= 2);
        assert!(text.starts_with(cut));
    }

    #[test]
    fn context_includes_mission_and_guidance() {
        let campaign = Campaign::new("c", "i", "e")
            .with_constraints(vec!["stay on roads".to_string()])
            .with_restraints(vec!["no contact".to_string()]);
        let mission = Mission::new(campaign.id, "recon", "map the area", 0);
        let task = Task::new(mission.id, "north", "survey", 0)
            .with_instructions(CoordinatingInstructions::from_context("start at dawn"));

        let prompt = compose_context(&campaign, &mission, &task);
        assert!(prompt.contains("map the area"));
        assert!(prompt.contains("survey north"));
        assert!(prompt.contains("start at dawn"));
        assert!(prompt.contains("stay on roads"));
        assert!(prompt.contains("no contact"));
    }
}
