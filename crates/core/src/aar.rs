//! After-Action Review report types.
//!
//! Reviews are synthesized bottom-up: settled tasks feed a mission AAR,
//! mission AARs feed the campaign AAR. Numeric aggregates are computed by the
//! aggregator from the persisted work units; the external synthesizer only
//! contributes the qualitative narrative.

use serde::{Deserialize, Serialize};

use crate::task::{TaskStatus, TaskType};
use crate::MissionStatus;

/// One settled task, as presented to the mission-level synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReview {
    /// Task name
    pub name: String,

    /// Final status
    pub status: TaskStatus,

    /// How the task entered the plan
    pub task_type: TaskType,

    /// Score from the external per-task evaluation lookup, when available
    pub score: Option<f32>,

    /// Cost of the task
    pub cost_usd: f64,

    /// Tokens consumed
    pub tokens: u64,

    /// Wall time from start to settlement
    pub duration_ms: Option<u64>,

    /// Qualitative "keep doing this" tags
    pub sustain: Vec<String>,

    /// Qualitative "do this better" tags
    pub improve: Vec<String>,

    /// Error text when the task failed
    pub error: Option<String>,
}

/// Score and qualitative tags from the external per-task evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskScore {
    /// Normalized score, 0.0 - 1.0
    pub score: f32,

    /// Patterns worth repeating
    pub sustain: Vec<String>,

    /// Patterns worth fixing
    pub improve: Vec<String>,
}

/// Input handed to the mission-level synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionAarInput {
    /// Mission name
    pub mission_name: String,

    /// The mission statement being reviewed against
    pub mission_statement: String,

    /// Ordered task reviews
    pub tasks: Vec<TaskReview>,
}

/// Qualitative fields returned by the mission-level synthesizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AarNarrative {
    /// Patterns worth repeating
    pub sustain_patterns: Vec<String>,

    /// Patterns worth fixing
    pub improve_patterns: Vec<String>,

    /// One-paragraph narrative summary
    pub summary: String,
}

/// Mission-level after-action review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionAar {
    /// Tasks the mission planned
    pub planned_tasks: usize,

    /// Tasks that completed
    pub completed_tasks: usize,

    /// Tasks that failed
    pub failed_tasks: usize,

    /// Tasks that were skipped
    pub skipped_tasks: usize,

    /// Mean score across scored tasks
    pub avg_task_score: Option<f32>,

    /// Name of the lowest-scoring task
    pub lowest_scoring_task: Option<String>,

    /// Cost summed over settled tasks
    pub total_cost_usd: f64,

    /// Tokens summed over settled tasks
    pub total_tokens: u64,

    /// Wall time from mission start to settlement
    pub duration_ms: u64,

    /// Patterns worth repeating
    pub sustain_patterns: Vec<String>,

    /// Patterns worth fixing
    pub improve_patterns: Vec<String>,

    /// Narrative summary
    pub summary: String,
}

/// One settled mission, as presented to the campaign-level synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionReview {
    /// Mission name
    pub name: String,

    /// Final status
    pub status: MissionStatus,

    /// Tasks the mission planned
    pub planned_tasks: usize,

    /// Tasks that completed
    pub completed_tasks: usize,

    /// Cost summed over the mission
    pub cost_usd: f64,

    /// Tokens summed over the mission
    pub tokens: u64,

    /// The mission's own review, when one was produced
    pub aar: Option<MissionAar>,
}

/// Input handed to the campaign-level synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignAarInput {
    /// Campaign name
    pub campaign_name: String,

    /// The intent being reviewed against
    pub intent: String,

    /// The end state being reviewed against
    pub end_state: String,

    /// Ordered mission reviews
    pub missions: Vec<MissionReview>,
}

/// Qualitative fields returned by the campaign-level synthesizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignNarrative {
    /// Patterns worth repeating
    pub sustain_patterns: Vec<String>,

    /// Patterns worth fixing
    pub improve_patterns: Vec<String>,

    /// Whether the commander's intent was achieved
    pub intent_achieved: bool,

    /// Whether the stated end state was reached
    pub end_state_reached: bool,

    /// Durable lessons for future campaigns
    pub lessons_learned: Vec<String>,

    /// Narrative summary
    pub summary: String,
}

/// Campaign-level after-action review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignAar {
    /// Missions the campaign planned
    pub planned_missions: usize,

    /// Missions that finished complete
    pub completed_missions: usize,

    /// Missions that finished failed
    pub failed_missions: usize,

    /// Tasks planned across all missions
    pub planned_tasks: usize,

    /// Tasks completed across all missions
    pub completed_tasks: usize,

    /// Mean score across scored tasks
    pub avg_task_score: Option<f32>,

    /// Name of the lowest-scoring task campaign-wide
    pub lowest_scoring_task: Option<String>,

    /// Planner's duration estimate, when one was recorded
    pub planned_duration_ms: Option<u64>,

    /// Wall time from campaign start to settlement
    pub actual_duration_ms: u64,

    /// Cost summed over all missions
    pub total_cost_usd: f64,

    /// Tokens summed over all missions
    pub total_tokens: u64,

    /// Patterns worth repeating
    pub sustain_patterns: Vec<String>,

    /// Patterns worth fixing
    pub improve_patterns: Vec<String>,

    /// Whether the commander's intent was achieved
    pub intent_achieved: bool,

    /// Whether the stated end state was reached
    pub end_state_reached: bool,

    /// Durable lessons for future campaigns
    pub lessons_learned: Vec<String>,

    /// Narrative summary
    pub summary: String,
}
