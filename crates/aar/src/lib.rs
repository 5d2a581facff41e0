//! Bottom-up After-Action Review aggregation.
//!
//! Settled tasks are rolled into a mission review, settled missions into the
//! campaign review. Numeric aggregates are computed here from the persisted
//! work units; the external synthesizer contributes only the narrative. The
//! campaign's terminal status is decided here, at review time, as a pure
//! aggregate rule - never raised as an error.

mod aggregator;

pub use aggregator::{AarAggregator, AarError};
