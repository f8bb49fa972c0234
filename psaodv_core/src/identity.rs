//! Identity and pseudonym management.
//!
//! Owns the per-vehicle state of a run: trajectory, current pseudonym,
//! privacy level and the packets attributed to each vehicle. Entries are
//! created lazily the first time a vehicle is referenced and are never
//! removed, so vehicles that leave the map stay in the final report.

use crate::config::Variant;
use crate::metrics::{MetricEvent, Metrics};
use crate::packet::{Packet, PacketKey};
use psaodv_env::{Position, VehicleId};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Length of a pseudonym token. 62^8 ≈ 2.2e14 possible values.
pub const PSEUDONYM_LEN: usize = 8;

/// Privacy levels are sampled once per vehicle from this interval.
const PRIVACY_LEVEL_RANGE: std::ops::RangeInclusive<f64> = 0.8..=1.0;

/// Short-lived opaque identity token used in place of the real vehicle id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pseudonym(String);

impl Pseudonym {
    /// Generates a fresh alphanumeric token of [`PSEUDONYM_LEN`] characters.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let token: String = (0..PSEUDONYM_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the run knows about one vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    /// External identifier (owned by the mobility source)
    pub id: VehicleId,

    /// Visited positions; consecutive duplicates are never stored
    pub trajectory: Vec<Position>,

    /// Current pseudonym (pseudonymous variant only)
    pub pseudonym: Option<Pseudonym>,

    /// Informational privacy score in [0.8, 1.0], fixed at creation
    pub privacy_level: f64,

    /// Packets originated or received, keyed for interception
    pub seen_packets: BTreeSet<PacketKey>,

    /// Route log (pseudonymous variant only)
    pub routes: Vec<Packet>,

    /// Step the vehicle was first observed
    pub first_seen_step: u64,

    /// Last step the vehicle was observed
    pub last_seen_step: u64,

    /// Step of the route request still waiting for a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_discovery: Option<u64>,
}

impl VehicleState {
    fn new(id: VehicleId, step: u64, pseudonym: Option<Pseudonym>, privacy_level: f64) -> Self {
        Self {
            id,
            trajectory: Vec::new(),
            pseudonym,
            privacy_level,
            seen_packets: BTreeSet::new(),
            routes: Vec::new(),
            first_seen_step: step,
            last_seen_step: step,
            pending_discovery: None,
        }
    }

    /// Appends a position unless it equals the previous one.
    ///
    /// Returns true if the trajectory grew.
    pub fn record_position(&mut self, position: Position) -> bool {
        if self.trajectory.last() == Some(&position) {
            return false;
        }
        self.trajectory.push(position);
        true
    }

    /// Attributes a packet to this vehicle.
    ///
    /// The key always lands in `seen_packets`; the full packet is appended
    /// to `routes` only when `log_route` is set.
    pub fn attribute(&mut self, packet: &Packet, log_route: bool) {
        self.seen_packets.insert(packet.key());
        if log_route {
            self.routes.push(packet.clone());
        }
    }
}

/// Per-run registry of vehicle identity state.
#[derive(Debug)]
pub struct IdentityManager {
    variant: Variant,

    /// Sorted by id so reports and scans are deterministic
    vehicles: BTreeMap<VehicleId, VehicleState>,
}

impl IdentityManager {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            vehicles: BTreeMap::new(),
        }
    }

    /// Returns the vehicle's state, creating it on first reference.
    ///
    /// Creation samples a privacy level and, in the pseudonymous variant,
    /// issues an initial pseudonym. Later calls only bump `last_seen_step`.
    pub fn ensure_vehicle<R: Rng>(
        &mut self,
        id: &VehicleId,
        step: u64,
        rng: &mut R,
    ) -> &mut VehicleState {
        match self.vehicles.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                state.last_seen_step = state.last_seen_step.max(step);
                state
            }
            Entry::Vacant(entry) => {
                let pseudonym = self
                    .variant
                    .is_pseudonymous()
                    .then(|| Pseudonym::generate(rng));
                let privacy_level = rng.gen_range(PRIVACY_LEVEL_RANGE);
                debug!("Tracking vehicle {} from step {}", id, step);
                entry.insert(VehicleState::new(id.clone(), step, pseudonym, privacy_level))
            }
        }
    }

    /// Replaces the vehicle's pseudonym with a fresh one.
    ///
    /// The old token is discarded. Trajectory and packet history are left
    /// untouched. Returns `None` for untracked vehicles.
    pub fn refresh_pseudonym<R: Rng>(
        &mut self,
        id: &VehicleId,
        rng: &mut R,
        metrics: &mut Metrics,
    ) -> Option<Pseudonym> {
        let state = self.vehicles.get_mut(id)?;
        let fresh = Pseudonym::generate(rng);
        state.pseudonym = Some(fresh.clone());
        metrics.record(MetricEvent::PseudonymRefreshed);
        debug!("Vehicle {} refreshed pseudonym to {}", id, fresh);
        Some(fresh)
    }

    pub fn get(&self, id: &VehicleId) -> Option<&VehicleState> {
        self.vehicles.get(id)
    }

    pub fn contains(&self, id: &VehicleId) -> bool {
        self.vehicles.contains_key(id)
    }

    /// Number of vehicles ever tracked (active or dormant).
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Iterates all tracked vehicles in id order.
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleState> {
        self.vehicles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_pseudonym_shape() {
        let mut rng = rng();
        let pseudonym = Pseudonym::generate(&mut rng);

        assert_eq!(pseudonym.as_str().len(), PSEUDONYM_LEN);
        assert!(pseudonym.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_ensure_vehicle_idempotent() {
        let mut rng = rng();
        let mut manager = IdentityManager::new(Variant::Pseudonymous);
        let id = VehicleId::from("veh0");

        assert!(!manager.contains(&id));
        let first = manager.ensure_vehicle(&id, 0, &mut rng).pseudonym.clone();
        let second = manager.ensure_vehicle(&id, 3, &mut rng).pseudonym.clone();

        assert!(manager.contains(&id));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get(&id).unwrap().first_seen_step, 0);
        assert_eq!(manager.get(&id).unwrap().last_seen_step, 3);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_ensure_vehicle_plain_has_no_pseudonym() {
        let mut rng = rng();
        let mut manager = IdentityManager::new(Variant::Plain);

        let state = manager.ensure_vehicle(&VehicleId::from("veh0"), 3, &mut rng);
        assert!(state.pseudonym.is_none());
        assert!((0.8..=1.0).contains(&state.privacy_level));
        assert_eq!(state.first_seen_step, 3);
    }

    #[test]
    fn test_ensure_vehicle_tracks_last_seen() {
        let mut rng = rng();
        let mut manager = IdentityManager::new(Variant::Plain);
        let id = VehicleId::from("veh0");

        manager.ensure_vehicle(&id, 2, &mut rng);
        manager.ensure_vehicle(&id, 9, &mut rng);

        let state = manager.get(&id).unwrap();
        assert_eq!(state.first_seen_step, 2);
        assert_eq!(state.last_seen_step, 9);
    }

    #[test]
    fn test_refresh_replaces_pseudonym_only() {
        let mut rng = rng();
        let mut metrics = Metrics::new();
        let mut manager = IdentityManager::new(Variant::Pseudonymous);
        let id = VehicleId::from("veh0");

        let state = manager.ensure_vehicle(&id, 0, &mut rng);
        state.record_position(Position::new(1.0, 1.0));
        let before = state.pseudonym.clone();

        let fresh = manager.refresh_pseudonym(&id, &mut rng, &mut metrics).unwrap();

        let state = manager.get(&id).unwrap();
        assert_eq!(state.pseudonym.as_ref(), Some(&fresh));
        assert_ne!(before, Some(fresh));
        assert_eq!(state.trajectory.len(), 1);
        assert_eq!(metrics.pseudonym_refreshes, 1);
    }

    #[test]
    fn test_refresh_unknown_vehicle() {
        let mut rng = rng();
        let mut metrics = Metrics::new();
        let mut manager = IdentityManager::new(Variant::Pseudonymous);

        assert!(manager
            .refresh_pseudonym(&VehicleId::from("ghost"), &mut rng, &mut metrics)
            .is_none());
        assert_eq!(metrics.pseudonym_refreshes, 0);
    }

    #[test]
    fn test_trajectory_dedup() {
        let mut rng = rng();
        let mut manager = IdentityManager::new(Variant::Plain);
        let state = manager.ensure_vehicle(&VehicleId::from("veh0"), 0, &mut rng);

        assert!(state.record_position(Position::new(0.0, 0.0)));
        assert!(!state.record_position(Position::new(0.0, 0.0)));
        assert!(state.record_position(Position::new(1.0, 0.0)));
        // Returning to an earlier point is a new entry
        assert!(state.record_position(Position::new(0.0, 0.0)));

        assert_eq!(state.trajectory.len(), 3);
    }
}
