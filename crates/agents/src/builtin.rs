//! Built-in collaborator implementations.
//!
//! None of these are generative: they exist so campaigns can be decomposed,
//! assigned, executed, and reviewed end to end from the CLI and the test
//! suites. Generative implementations plug in through the same traits.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use opcom_core::{
    AarNarrative, AgentProfile, AssignmentPlan, Campaign, CampaignAarInput, CampaignNarrative,
    CampaignPlan, MissionAarInput, MissionAssignment, MissionStatus, TaskAssignment, TaskStatus,
};

use crate::{AgentError, AgentRoster, Decomposer, Executor, ExecutorOutput, Planner, Synthesizer, TokenUsage};

/// Decomposer that reads a prepared [`CampaignPlan`] document from disk.
pub struct ManifestDecomposer {
    path: PathBuf,
}

impl ManifestDecomposer {
    /// Read plans from the given JSON file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Decomposer for ManifestDecomposer {
    async fn decompose(&self, campaign: &Campaign) -> Result<CampaignPlan, AgentError> {
        debug!(campaign = %campaign.id, path = %self.path.display(), "reading plan manifest");
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AgentError::Decomposition(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| AgentError::Decomposition(format!("{}: {e}", self.path.display())))
    }
}

/// Planner that rotates through the roster in order.
pub struct RoundRobinPlanner;

#[async_trait]
impl Planner for RoundRobinPlanner {
    async fn assign(
        &self,
        _campaign: &Campaign,
        roster: &AgentRoster,
        plan: &CampaignPlan,
    ) -> Result<AssignmentPlan, AgentError> {
        if roster.is_empty() {
            return Err(AgentError::Planning("roster is empty".to_string()));
        }
        let profiles: Vec<&AgentProfile> = roster.iter().collect();

        let mut next = 0usize;
        let assignments = plan
            .missions
            .iter()
            .map(|mission| MissionAssignment {
                mission_name: mission.name.clone(),
                tasks: mission
                    .tasks
                    .iter()
                    .map(|task| {
                        let agent = profiles[next % profiles.len()];
                        next += 1;
                        TaskAssignment {
                            task_name: task.name.clone(),
                            agent_slug: agent.slug.clone(),
                            reasoning: format!("rotation put {} on `{}`", agent.slug, task.task_verb),
                            estimated_tokens: None,
                            estimated_cost_usd: None,
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(AssignmentPlan {
            assignments,
            execution_strategy: "sequence-ordered execution, executors rotated across the roster"
                .to_string(),
            estimated_total_cost_usd: None,
            estimated_duration_minutes: None,
        })
    }
}

/// Executor that delegates each task to a local command.
///
/// The composed prompt is appended as the final argument and the agent slug is
/// exported as `OPCOM_AGENT`; stdout becomes the task result. Token usage is
/// approximated from byte counts - pricing accuracy is a non-goal.
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Delegate to `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Fixed arguments placed before the prompt.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

fn approx_tokens(text: &str) -> u64 {
    (text.len() as u64 / 4).max(1)
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(
        &self,
        agent: &AgentProfile,
        prompt: &str,
    ) -> Result<ExecutorOutput, AgentError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(prompt)
            .env("OPCOM_AGENT", &agent.slug);

        let output = cmd
            .output()
            .await
            .map_err(|e| AgentError::Executor(format!("spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Executor(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        let usage = TokenUsage {
            prompt_tokens: approx_tokens(prompt),
            completion_tokens: approx_tokens(&text),
        };
        Ok(ExecutorOutput { text, usage })
    }
}

/// Rule-based synthesizer.
///
/// Produces the qualitative review fields from statuses and errors alone, the
/// way the review reads when no generative synthesizer is wired in.
pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn mission_aar(&self, input: &MissionAarInput) -> Result<AarNarrative, AgentError> {
        let mut sustain = Vec::new();
        let mut improve = Vec::new();
        for task in &input.tasks {
            match task.status {
                TaskStatus::Complete => sustain.push(format!("{}: completed", task.name)),
                TaskStatus::Failed => improve.push(format!(
                    "{}: {}",
                    task.name,
                    task.error.as_deref().unwrap_or("failed")
                )),
                TaskStatus::Skipped => improve.push(format!("{}: skipped", task.name)),
                _ => {}
            }
        }

        let completed = input
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete)
            .count();
        Ok(AarNarrative {
            sustain_patterns: sustain,
            improve_patterns: improve,
            summary: format!(
                "{}: {completed} of {} tasks completed",
                input.mission_name,
                input.tasks.len()
            ),
        })
    }

    async fn campaign_aar(
        &self,
        input: &CampaignAarInput,
    ) -> Result<CampaignNarrative, AgentError> {
        let mut sustain = Vec::new();
        let mut improve = Vec::new();
        let mut lessons = Vec::new();
        for mission in &input.missions {
            if mission.status == MissionStatus::Failed {
                improve.push(format!("{}: mission failed", mission.name));
            } else if mission.completed_tasks == mission.planned_tasks {
                sustain.push(format!(
                    "{}: all {} tasks completed",
                    mission.name, mission.planned_tasks
                ));
            } else {
                improve.push(format!(
                    "{}: {} of {} tasks completed",
                    mission.name, mission.completed_tasks, mission.planned_tasks
                ));
            }
            if let Some(aar) = &mission.aar {
                lessons.extend(aar.improve_patterns.iter().cloned());
            }
        }
        lessons.dedup();
        lessons.truncate(8);

        let failed = input
            .missions
            .iter()
            .filter(|m| m.status == MissionStatus::Failed)
            .count();
        let planned_tasks: usize = input.missions.iter().map(|m| m.planned_tasks).sum();
        let completed_tasks: usize = input.missions.iter().map(|m| m.completed_tasks).sum();
        let intent_achieved = failed == 0 && completed_tasks == planned_tasks;

        Ok(CampaignNarrative {
            sustain_patterns: sustain,
            improve_patterns: improve,
            intent_achieved,
            end_state_reached: failed == 0 && completed_tasks > 0,
            lessons_learned: lessons,
            summary: format!(
                "{}: {} of {} missions settled without failure",
                input.campaign_name,
                input.missions.len() - failed,
                input.missions.len()
            ),
        })
    }
}
