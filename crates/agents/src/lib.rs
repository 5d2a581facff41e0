//! External collaborator seams.
//!
//! The scheduler treats decomposition, planning, execution, synthesis, and
//! task evaluation as external collaborators; this crate defines their trait
//! contracts plus concrete non-generative stand-ins that the CLI and the test
//! suites run against.

mod builtin;
mod error;
mod pricing;
mod roster;
mod traits;

pub use builtin::{CommandExecutor, ManifestDecomposer, RoundRobinPlanner, TemplateSynthesizer};
pub use error::AgentError;
pub use pricing::Pricing;
pub use roster::AgentRoster;
pub use traits::{
    Decomposer, Executor, ExecutorOutput, Planner, Synthesizer, TaskEvaluator, TokenUsage,
};
