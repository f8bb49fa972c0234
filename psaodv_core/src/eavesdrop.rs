//! Geometric model of passive eavesdropping stations.
//!
//! Every step, every active vehicle is tested against every station. A
//! vehicle within `range` meters of a station is observable by it.
//!
//! - **Plain AODV**: every packet the vehicle holds is intercepted, once per
//!   (station, packet) for the whole run.
//! - **PS-AODV**: the station sees only a pseudonym. Under
//!   [`PreventionModel::AssumeUnlinkable`] each observation counts as a
//!   prevented attempt; [`PreventionModel::RequireFreshPseudonym`] only
//!   credits observations of a pseudonym the station has not seen before.

use crate::config::Variant;
use crate::geometry::within_range;
use crate::identity::{IdentityManager, Pseudonym};
use crate::metrics::{MetricEvent, Metrics};
use crate::packet::PacketKey;
use psaodv_env::{Position, VehicleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Radio range of the reference stations (meters).
pub const REFERENCE_RANGE: f64 = 300.0;

/// A fixed passive listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EavesdropStation {
    pub id: String,
    pub position: Position,
    pub range: f64,
}

impl EavesdropStation {
    pub fn new(id: impl Into<String>, x: f64, y: f64, range: f64) -> Self {
        Self {
            id: id.into(),
            position: Position::new(x, y),
            range,
        }
    }

    /// The two stations of the reference deployment.
    pub fn reference_set() -> Vec<EavesdropStation> {
        vec![
            EavesdropStation::new("eav1", 4429.02, 2834.03, REFERENCE_RANGE),
            EavesdropStation::new("eav2", 4343.50, 2501.99, REFERENCE_RANGE),
        ]
    }

    /// Returns true if `position` is within this station's range.
    pub fn covers(&self, position: &Position) -> bool {
        within_range(&self.position, position, self.range)
    }
}

/// How an in-range pseudonymous observation is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreventionModel {
    /// Every observation is prevented because a pseudonym was in use
    AssumeUnlinkable,

    /// Only the first sighting of a pseudonym per station is prevented;
    /// repeated sightings are linkable
    RequireFreshPseudonym,
}

/// A packet reported by a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interception {
    pub station: String,
    pub vehicle: VehicleId,
    pub packet: PacketKey,

    /// Step in which the station picked it up
    pub step: u64,
}

/// Tally of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub interceptions: Vec<Interception>,
    pub attempts: u64,
    pub prevented: u64,
    pub linked: u64,
}

/// Runs the stations against the vehicles each step.
#[derive(Debug)]
pub struct Eavesdropper {
    variant: Variant,
    prevention: PreventionModel,
    stations: Vec<EavesdropStation>,

    /// (station, packet) pairs already reported this run
    reported: HashSet<(usize, PacketKey)>,

    /// (station, pseudonym) pairs already observed this run
    sightings: HashSet<(usize, Pseudonym)>,

    /// Every interception in report order
    log: Vec<Interception>,
}

impl Eavesdropper {
    pub fn new(variant: Variant, prevention: PreventionModel, stations: Vec<EavesdropStation>) -> Self {
        Self {
            variant,
            prevention,
            stations,
            reported: HashSet::new(),
            sightings: HashSet::new(),
            log: Vec::new(),
        }
    }

    pub fn stations(&self) -> &[EavesdropStation] {
        &self.stations
    }

    /// All interceptions reported so far.
    pub fn interceptions(&self) -> &[Interception] {
        &self.log
    }

    /// Scans every (vehicle, station) pair for this step.
    ///
    /// Vehicles must already be tracked by `identities`; untracked ids hold
    /// no packets and yield attempts only.
    pub fn scan(
        &mut self,
        step: u64,
        snapshot: &[(VehicleId, Position)],
        identities: &IdentityManager,
        metrics: &mut Metrics,
    ) -> ScanResult {
        let mut result = ScanResult::default();

        for (vehicle, position) in snapshot {
            for station_idx in 0..self.stations.len() {
                if !self.stations[station_idx].covers(position) {
                    continue;
                }

                metrics.record(MetricEvent::EavesdropAttempt);
                result.attempts += 1;

                match self.variant {
                    Variant::Plain => {
                        self.intercept_packets(station_idx, vehicle, step, identities, metrics, &mut result)
                    }
                    Variant::Pseudonymous => {
                        self.judge_observation(station_idx, vehicle, step, identities, metrics, &mut result)
                    }
                }
            }
        }

        result
    }

    fn intercept_packets(
        &mut self,
        station_idx: usize,
        vehicle: &VehicleId,
        step: u64,
        identities: &IdentityManager,
        metrics: &mut Metrics,
        result: &mut ScanResult,
    ) {
        let Some(state) = identities.get(vehicle) else {
            return;
        };

        for key in &state.seen_packets {
            if !self.reported.insert((station_idx, *key)) {
                continue;
            }

            let station = &self.stations[station_idx];
            debug!(
                "Step {}: Eavesdropper {} intercepted {} from {}",
                step,
                station.id,
                key.kind.label(false),
                vehicle
            );

            let interception = Interception {
                station: station.id.clone(),
                vehicle: vehicle.clone(),
                packet: *key,
                step,
            };
            metrics.record(MetricEvent::Interception);
            self.log.push(interception.clone());
            result.interceptions.push(interception);
        }
    }

    fn judge_observation(
        &mut self,
        station_idx: usize,
        vehicle: &VehicleId,
        step: u64,
        identities: &IdentityManager,
        metrics: &mut Metrics,
        result: &mut ScanResult,
    ) {
        let pseudonym = identities.get(vehicle).and_then(|state| state.pseudonym.clone());

        let prevented = match (self.prevention, pseudonym) {
            (PreventionModel::AssumeUnlinkable, _) => true,
            (PreventionModel::RequireFreshPseudonym, Some(pseudonym)) => {
                self.sightings.insert((station_idx, pseudonym))
            }
            (PreventionModel::RequireFreshPseudonym, None) => false,
        };

        let station_id = &self.stations[station_idx].id;
        if prevented {
            metrics.record(MetricEvent::EavesdropPrevented);
            result.prevented += 1;
            debug!("Step {}: Vehicle {} avoided eavesdropper {} using pseudonym", step, vehicle, station_id);
        } else {
            metrics.record(MetricEvent::EavesdropLinked);
            result.linked += 1;
            debug!("Step {}: Eavesdropper {} linked a repeated pseudonym of {}", step, station_id, vehicle);
        }
    }
}
