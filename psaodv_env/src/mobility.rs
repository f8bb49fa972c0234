//! Mobility source abstraction consumed by the simulation loop.

use crate::error::EnvError;
use crate::types::{Position, VehicleId};

/// Positions of every active vehicle for one step, in source order.
pub type Snapshot = Vec<(VehicleId, Position)>;

/// The external mobility simulator, seen as a capability.
///
/// # Implementations
///
/// - **Replay**: `TraceReplay` - steps through a recorded floating-car-data trace
/// - **Synthetic**: `SyntheticTraffic` (in `psaodv_sim`) - seeded kinematic vehicles
///
/// # Step Protocol
///
/// ```text
/// Runner                         Source
///   |-- remaining_expected_nodes() -->|   (0 => stop)
///   |-- advance_step() -------------->|   (blocking, may fail)
///   |-- active_node_ids() ----------->|
///   |-- position(id) ---------------->|   (per active id)
///   |            ...                  |
///   |-- close() --------------------->|   (exactly once)
/// ```
pub trait MobilitySource {
    /// Returns the vehicles present in the current step.
    fn active_node_ids(&self) -> Vec<VehicleId>;

    /// Returns the current position of an active vehicle.
    ///
    /// # Returns
    /// * `Some(position)` - The vehicle is present this step
    /// * `None` - The id is unknown or not active
    fn position(&self, id: &VehicleId) -> Option<Position>;

    /// Advances simulated time by one step.
    ///
    /// # Returns
    /// * `Err(EnvError::SourceUnavailable)` - The source cannot continue; the run must abort
    fn advance_step(&mut self) -> Result<(), EnvError>;

    /// Returns the number of vehicles still present or yet to depart.
    ///
    /// Used as the loop's termination oracle: 0 means the run is over.
    fn remaining_expected_nodes(&self) -> usize;

    /// Releases the source.
    ///
    /// A second call returns `EnvError::AlreadyClosed`.
    fn close(&mut self) -> Result<(), EnvError>;

    /// Collects `(id, position)` for every active vehicle that has a position.
    fn snapshot(&self) -> Snapshot {
        self.active_node_ids()
            .into_iter()
            .filter_map(|id| self.position(&id).map(|pos| (id, pos)))
            .collect()
    }
}
