//! Plan shapes exchanged with the external decomposer and planner.

use serde::{Deserialize, Serialize};

use crate::mission::ActionsOn;
use crate::task::{CoordinatingInstructions, TaskType};

/// Output of campaign decomposition: the mission/task graph before planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignPlan {
    /// Missions in declared order
    pub missions: Vec<MissionDraft>,

    /// The one task the campaign cannot succeed without
    pub essential_task: String,
}

/// A mission as proposed by decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionDraft {
    /// Mission name
    pub name: String,

    /// What this mission is to accomplish and why
    pub mission_statement: String,

    /// Priority (0-10)
    pub priority: u8,

    /// Sequence group
    pub sequence: u32,

    /// Contingency policy for task failures in this mission
    #[serde(default)]
    pub actions_on: ActionsOn,

    /// Tasks in declared order
    pub tasks: Vec<TaskDraft>,
}

/// A task as proposed by decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Task name
    pub name: String,

    /// How this task entered the plan
    pub task_type: TaskType,

    /// The operative verb
    pub task_verb: String,

    /// Sequence group within the mission
    pub sequence: u32,

    /// Coordinating instructions, when decomposition produced them
    #[serde(default)]
    pub coordinating_instructions: Option<CoordinatingInstructions>,
}

/// Output of executor planning: who does what, and at what estimated cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentPlan {
    /// Per-mission task assignments
    pub assignments: Vec<MissionAssignment>,

    /// Free-text description of the execution approach
    pub execution_strategy: String,

    /// Estimated total spend
    pub estimated_total_cost_usd: Option<f64>,

    /// Estimated wall-clock duration
    pub estimated_duration_minutes: Option<u64>,
}

/// Assignments for one mission's tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionAssignment {
    /// Mission name, matching a `MissionDraft`
    pub mission_name: String,

    /// Task assignments
    pub tasks: Vec<TaskAssignment>,
}

/// One task's executor assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Task name, matching a `TaskDraft` in the same mission
    pub task_name: String,

    /// Roster slug of the chosen executor
    pub agent_slug: String,

    /// Why the planner chose this executor
    pub reasoning: String,

    /// Estimated token usage
    #[serde(default)]
    pub estimated_tokens: Option<u64>,

    /// Estimated cost
    #[serde(default)]
    pub estimated_cost_usd: Option<f64>,
}

/// An executor the planner may assign work to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable identity used in assignments
    pub slug: String,

    /// Human-readable name
    pub name: String,

    /// What this executor is good at
    pub description: String,

    /// Tools the executor can use
    pub tools: Vec<String>,
}
