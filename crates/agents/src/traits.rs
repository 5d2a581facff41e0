//! Collaborator trait contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use opcom_core::{
    AarNarrative, AgentProfile, AssignmentPlan, Campaign, CampaignAarInput, CampaignNarrative,
    CampaignPlan, MissionAarInput, Task, TaskScore,
};

use crate::{AgentError, AgentRoster};

/// Turns a campaign's free-text intent into the mission/task graph.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Decompose a campaign into missions and tasks.
    async fn decompose(&self, campaign: &Campaign) -> Result<CampaignPlan, AgentError>;
}

/// Assigns an executor identity to each task of a decomposed campaign.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce executor assignments for every task in the plan.
    async fn assign(
        &self,
        campaign: &Campaign,
        roster: &AgentRoster,
        plan: &CampaignPlan,
    ) -> Result<AssignmentPlan, AgentError>;
}

/// Performs one task. Failure is a typed error; there is no partial output.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute the composed prompt as the given agent.
    async fn execute(&self, agent: &AgentProfile, prompt: &str)
        -> Result<ExecutorOutput, AgentError>;
}

/// Turns a batch of settled outcomes into review narrative.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize the qualitative fields of a mission-level review.
    async fn mission_aar(&self, input: &MissionAarInput) -> Result<AarNarrative, AgentError>;

    /// Synthesize the qualitative fields of the campaign-level review.
    async fn campaign_aar(&self, input: &CampaignAarInput)
        -> Result<CampaignNarrative, AgentError>;
}

/// External per-task evaluation lookup feeding review scores.
#[async_trait]
pub trait TaskEvaluator: Send + Sync {
    /// Score a settled task, when an evaluation exists for it.
    async fn score(&self, task: &Task) -> Option<TaskScore>;
}

/// Output of one executor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOutput {
    /// Response text
    pub text: String,

    /// Token accounting for the invocation
    pub usage: TokenUsage,
}

/// Token accounting for one executor invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,

    /// Tokens in the completion
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Total tokens for the invocation.
    pub fn total(self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
