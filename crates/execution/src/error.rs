//! Scheduler error taxonomy.

use opcom_aar::AarError;
use opcom_agents::AgentError;
use opcom_storage::StorageError;

/// Errors surfaced by the schedulers.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A collaborator failed (executor, decomposer, planner, synthesizer)
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Review aggregation failed
    #[error(transparent)]
    Aar(#[from] AarError),

    /// Decomposition or assignment output failed intake validation
    #[error("plan validation failed: {0}")]
    InvalidPlan(String),

    /// The campaign is not in a dispatchable status
    #[error("campaign is not executable from status `{status}`")]
    NotExecutable {
        /// The status the campaign was found in
        status: String,
    },

    /// A barrier wait gave up on unsettled missions
    #[error("barrier wait exceeded {minutes} minutes")]
    TimeoutExceeded {
        /// The configured timeout
        minutes: u64,
    },
}
