//! The hierarchical campaign scheduler.
//!
//! Work is grouped by declared sequence number, fanned out in parallel within
//! a group, and fanned back in at a barrier before the next group starts. A
//! failing unit settles alongside its siblings (settle-all, never fail-fast);
//! the owning mission's failure policy decides whether the failure is
//! absorbed, halts the mission, or pauses the campaign. Every dispatch step is
//! guarded by a status precondition so substrate-level retries are no-ops.

mod campaign;
mod config;
mod error;
mod intake;
mod mission;
mod runner;
mod signal;

pub use campaign::CampaignScheduler;
pub use config::SchedulerConfig;
pub use error::ExecutionError;
pub use intake::CampaignIntake;
pub use mission::MissionScheduler;
pub use runner::TaskRunner;
pub use signal::{Signal, SignalHub};
