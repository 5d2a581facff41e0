//! Campaign model - top-level unit of intent.

use serde::{Deserialize, Serialize};

use crate::aar::CampaignAar;
use crate::id::CampaignId;
use crate::{Time, TransitionError};

/// A campaign is the top-level objective, decomposed into missions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique identifier
    pub id: CampaignId,

    /// Campaign name
    pub name: String,

    /// Commander's intent - what outcome this campaign exists to achieve
    pub intent: String,

    /// Description of the world once the campaign has succeeded
    pub end_state: String,

    /// Detailed description
    pub description: String,

    /// Things the campaign must do
    pub constraints: Vec<String>,

    /// Things the campaign must not do
    pub restraints: Vec<String>,

    /// Optional spend ceiling in USD
    pub max_cost_usd: Option<f64>,

    /// Barrier-wait timeout for each mission sequence group, in minutes
    pub timeout_minutes: Option<u64>,

    /// Whether execution requires an explicit approval step after planning
    pub require_approval: bool,

    /// Planner's wall-clock estimate, recorded at intake
    pub estimated_duration_minutes: Option<u64>,

    /// Current status
    pub status: CampaignStatus,

    /// Percentage complete (0-100)
    pub progress: u8,

    /// Accumulated cost across all missions
    pub total_cost_usd: f64,

    /// Accumulated token usage across all missions
    pub total_tokens: u64,

    /// Campaign-level after-action review, written once all missions settle
    pub aar: Option<CampaignAar>,

    /// When execution started
    pub started_at: Option<Time>,

    /// When execution completed
    pub completed_at: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Campaign {
    /// Create a new draft campaign.
    pub fn new(
        name: impl Into<String>,
        intent: impl Into<String>,
        end_state: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: CampaignId::new(),
            name: name.into(),
            intent: intent.into(),
            end_state: end_state.into(),
            description: String::new(),
            constraints: Vec::new(),
            restraints: Vec::new(),
            max_cost_usd: None,
            timeout_minutes: None,
            require_approval: false,
            estimated_duration_minutes: None,
            status: CampaignStatus::Draft,
            progress: 0,
            total_cost_usd: 0.0,
            total_tokens: 0,
            aar: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the constraints.
    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Set the restraints.
    pub fn with_restraints(mut self, restraints: Vec<String>) -> Self {
        self.restraints = restraints;
        self
    }

    /// Set the barrier timeout in minutes.
    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    /// Apply a status transition, rejecting moves the table does not allow.
    pub fn transition(&mut self, to: CampaignStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError {
                entity: "campaign",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        let now = chrono::Utc::now();
        if to == CampaignStatus::Executing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Campaign status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Created, not yet analyzed
    Draft,
    /// Decomposition/planning in progress
    Analyzing,
    /// Planned and ready to execute
    Ready,
    /// Missions are being dispatched
    Executing,
    /// A mission's pause policy fired; annotation only, in-flight work settles
    Paused,
    /// Terminal: at least one mission finished in a non-failed state
    Complete,
    /// Terminal: every mission failed
    Failed,
}

impl CampaignStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Transition table. Identity transitions are permitted no-ops so that
    /// resumed schedulers can re-apply their current state safely.
    pub fn can_transition(self, to: Self) -> bool {
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Self::Draft, Self::Analyzing)
                | (Self::Analyzing, Self::Ready)
                | (Self::Analyzing, Self::Failed)
                | (Self::Ready, Self::Executing)
                | (Self::Executing, Self::Paused)
                | (Self::Executing, Self::Complete)
                | (Self::Executing, Self::Failed)
                | (Self::Paused, Self::Complete)
                | (Self::Paused, Self::Failed)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Analyzing => "analyzing",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_accepted() {
        let mut c = Campaign::new("border-audit", "audit the perimeter", "perimeter audited");
        for to in [
            CampaignStatus::Analyzing,
            CampaignStatus::Ready,
            CampaignStatus::Executing,
            CampaignStatus::Paused,
            CampaignStatus::Complete,
        ] {
            c.transition(to).unwrap();
        }
        assert!(c.started_at.is_some());
        assert!(c.completed_at.is_some());
    }

    #[test]
    fn no_entity_reenters_an_earlier_state() {
        let mut c = Campaign::new("c", "i", "e");
        c.transition(CampaignStatus::Analyzing).unwrap();
        c.transition(CampaignStatus::Ready).unwrap();
        assert!(c.transition(CampaignStatus::Draft).is_err());
        assert!(c.transition(CampaignStatus::Analyzing).is_err());
    }

    #[test]
    fn identity_transition_is_a_noop() {
        let mut c = Campaign::new("c", "i", "e");
        c.transition(CampaignStatus::Analyzing).unwrap();
        c.transition(CampaignStatus::Analyzing).unwrap();
        assert_eq!(c.status, CampaignStatus::Analyzing);
    }

    #[test]
    fn terminal_states_only_allow_identity() {
        assert!(!CampaignStatus::Complete.can_transition(CampaignStatus::Executing));
        assert!(!CampaignStatus::Failed.can_transition(CampaignStatus::Complete));
        assert!(CampaignStatus::Complete.can_transition(CampaignStatus::Complete));
    }
}
