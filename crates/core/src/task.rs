//! Task model - the smallest executable unit, delegated to one executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{MissionId, RunId, TaskId};
use crate::{Time, TransitionError};

/// A task is one unit of work handed to a single executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning mission
    pub mission_id: MissionId,

    /// Task name
    pub name: String,

    /// How this task entered the plan
    pub task_type: TaskType,

    /// The operative verb ("survey", "draft", "verify", ...)
    pub task_verb: String,

    /// Sequence group; tasks sharing a value execute concurrently
    pub sequence: u32,

    /// Executor identity chosen by the planner
    pub assigned_agent: Option<String>,

    /// Coordinating instructions handed down from decomposition
    pub coordinating_instructions: CoordinatingInstructions,

    /// Current status
    pub status: TaskStatus,

    /// Executor output, truncated to the configured cap
    pub result: Option<String>,

    /// Error text when the task failed
    pub error: Option<String>,

    /// Cost of this task's execution
    pub cost_usd: f64,

    /// Tokens consumed by this task's execution
    pub tokens: u64,

    /// Correlation handle to the external execution run
    pub execution_ref: Option<RunId>,

    /// When execution started
    pub started_at: Option<Time>,

    /// When execution settled
    pub completed_at: Option<Time>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        mission_id: MissionId,
        name: impl Into<String>,
        task_verb: impl Into<String>,
        sequence: u32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            mission_id,
            name: name.into(),
            task_type: TaskType::Assigned,
            task_verb: task_verb.into(),
            sequence,
            assigned_agent: None,
            coordinating_instructions: CoordinatingInstructions::default(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            cost_usd: 0.0,
            tokens: 0,
            execution_ref: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the task type.
    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the assigned executor.
    pub fn with_agent(mut self, slug: impl Into<String>) -> Self {
        self.assigned_agent = Some(slug.into());
        self
    }

    /// Set the coordinating instructions.
    pub fn with_instructions(mut self, instructions: CoordinatingInstructions) -> Self {
        self.coordinating_instructions = instructions;
        self
    }

    /// The executor identity this task resolves to: planner assignment first,
    /// then the identity embedded in the coordinating instructions.
    pub fn executor_identity(&self) -> Option<&str> {
        self.assigned_agent
            .as_deref()
            .or(self.coordinating_instructions.executor.as_deref())
    }

    /// Elapsed wall time between start and settlement, in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => Some((c - s).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    /// Apply a status transition, rejecting moves the table does not allow.
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError {
                entity: "task",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        let now = chrono::Utc::now();
        if to == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = to;
        Ok(())
    }
}

/// How a task entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    /// Explicitly assigned by decomposition
    Assigned,
    /// Implied by the mission statement
    Implied,
    /// Essential to the campaign regardless of mission
    Essential,
}

/// Typed coordinating instructions.
///
/// Decomposition used to hand these down as an opaque JSON map; the executor
/// identity and free-text context are now first-class and validated at intake,
/// with anything else preserved in `extras`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatingInstructions {
    /// Executor identity, when decomposition already knows it
    pub executor: Option<String>,

    /// Free-text context passed through to the executor
    pub context: String,

    /// Structured fields this scheduler does not interpret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl CoordinatingInstructions {
    /// Instructions carrying only free-text context.
    pub fn from_context(context: impl Into<String>) -> Self {
        Self {
            executor: None,
            context: context.into(),
            extras: BTreeMap::new(),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting for its sequence group to be dispatched
    Pending,
    /// Handed to the executor
    Running,
    /// Terminal: executor returned output
    Complete,
    /// Terminal: executor failed or could not be resolved
    Failed,
    /// Terminal: never ran, or failure absorbed by the mission's skip policy
    Skipped,
}

impl TaskStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Skipped)
    }

    /// Transition table. Identity transitions are permitted no-ops.
    ///
    /// Failed -> Skipped is the one terminal reclassification: the executor
    /// adapter records the failure, then the mission's skip policy absorbs it.
    /// No transition re-enters an active state.
    pub fn can_transition(self, to: Self) -> bool {
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Complete)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
                | (Self::Failed, Self::Skipped)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
