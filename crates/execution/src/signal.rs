//! Settlement signals.
//!
//! In-process stand-in for the durable substrate's pub/sub topics. Signals are
//! wake-ups, not state: the persisted work units stay the source of truth, so
//! a subscriber that lags or misses a signal resynchronizes from storage.

use tokio::sync::broadcast;

use opcom_core::{CampaignId, MissionId};

/// Substrate-level signal topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A mission is being dispatched
    MissionExecute {
        /// Owning campaign
        campaign_id: CampaignId,
        /// Mission being dispatched
        mission_id: MissionId,
    },
    /// A mission settled, successfully or not
    MissionComplete {
        /// Owning campaign
        campaign_id: CampaignId,
        /// Mission that settled
        mission_id: MissionId,
    },
    /// All mission groups settled; the campaign review may run
    CampaignAar {
        /// Campaign ready for review
        campaign_id: CampaignId,
    },
}

/// Broadcast hub for settlement signals.
#[derive(Debug, Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<Signal>,
}

impl SignalHub {
    /// Create a hub.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Subscribe to all signals. Subscribe before dispatching the work whose
    /// settlement you intend to wait for.
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    /// Publish a signal. Publishing with no subscribers is not an error.
    pub fn publish(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
