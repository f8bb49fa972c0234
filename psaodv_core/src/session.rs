//! The simulation session: all per-run state in one owned object.
//!
//! A session is created at run start, fed one mobility snapshot per step
//! and asked for a [`RunReport`] at the end. Nothing outlives it.

use crate::config::{ConfigError, ProtocolConfig, Variant};
use crate::eavesdrop::{Eavesdropper, Interception};
use crate::identity::{IdentityManager, Pseudonym, VehicleState};
use crate::metrics::{Metrics, MetricsReport};
use crate::packet::{Packet, PacketKey};
use crate::protocol::{ProtocolEngine, StochasticTriggers, TriggerPolicy};
use psaodv_env::{Position, VehicleId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happened during one step.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub step: u64,

    /// Vehicles active this step
    pub active: usize,

    /// Vehicles seen for the first time this step
    pub new_vehicles: usize,

    pub packets: Vec<Packet>,
    pub interceptions: Vec<Interception>,
    pub attempts: u64,
    pub prevented: u64,
    pub linked: u64,
}

/// Per-vehicle section of the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleReport {
    pub id: VehicleId,
    pub first_seen_step: u64,
    pub last_seen_step: u64,
    pub privacy_level: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudonym: Option<Pseudonym>,

    pub trajectory: Vec<Position>,
    pub packets: Vec<PacketKey>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Packet>,
}

impl From<&VehicleState> for VehicleReport {
    fn from(state: &VehicleState) -> Self {
        Self {
            id: state.id.clone(),
            first_seen_step: state.first_seen_step,
            last_seen_step: state.last_seen_step,
            privacy_level: state.privacy_level,
            pseudonym: state.pseudonym.clone(),
            trajectory: state.trajectory.clone(),
            packets: state.seen_packets.iter().copied().collect(),
            routes: state.routes.clone(),
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub variant: Variant,

    /// Steps fully processed
    pub steps: u64,

    pub vehicles: Vec<VehicleReport>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interceptions: Vec<Interception>,

    pub metrics: MetricsReport,
}

/// Owns the identity manager, protocol engine, eavesdropper and metrics of
/// a single run.
pub struct SimulationSession<P = StochasticTriggers> {
    config: ProtocolConfig,
    identities: IdentityManager,
    engine: ProtocolEngine<P>,
    eavesdropper: Eavesdropper,
    metrics: Metrics,
    steps_processed: u64,
}

impl SimulationSession<StochasticTriggers> {
    /// Creates a session with the reference trigger policy.
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        let policy = StochasticTriggers::from_config(&config);
        Self::with_policy(config, policy)
    }
}

impl<P: TriggerPolicy> SimulationSession<P> {
    /// Creates a session driven by a custom trigger policy.
    pub fn with_policy(config: ProtocolConfig, policy: P) -> Result<Self, ConfigError> {
        config.validate()?;

        let engine = ProtocolEngine::with_policy(&config, policy);
        let eavesdropper = Eavesdropper::new(config.variant, config.prevention, config.stations.clone());

        Ok(Self {
            identities: IdentityManager::new(config.variant),
            engine,
            eavesdropper,
            metrics: Metrics::new(),
            steps_processed: 0,
            config,
        })
    }

    /// Processes one step: tracking, protocol events, eavesdropping scan.
    ///
    /// `snapshot` lists every vehicle active in `step` with its position.
    pub fn process_step<R: Rng>(
        &mut self,
        step: u64,
        snapshot: &[(VehicleId, Position)],
        rng: &mut R,
    ) -> StepOutcome {
        let known_before = self.identities.len();

        for (id, position) in snapshot {
            self.identities.ensure_vehicle(id, step, rng).record_position(*position);
        }

        let active: Vec<VehicleId> = snapshot.iter().map(|(id, _)| id.clone()).collect();
        let packets = self
            .engine
            .run_step(step, &active, &mut self.identities, &mut self.metrics, rng);

        let scan = self
            .eavesdropper
            .scan(step, snapshot, &self.identities, &mut self.metrics);

        self.steps_processed += 1;

        let outcome = StepOutcome {
            step,
            active: snapshot.len(),
            new_vehicles: self.identities.len() - known_before,
            packets,
            interceptions: scan.interceptions,
            attempts: scan.attempts,
            prevented: scan.prevented,
            linked: scan.linked,
        };

        debug!(
            "Step {}: {} active, {} packets, {} interceptions, {} attempts",
            step,
            outcome.active,
            outcome.packets.len(),
            outcome.interceptions.len(),
            outcome.attempts
        );

        outcome
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn identities(&self) -> &IdentityManager {
        &self.identities
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn interceptions(&self) -> &[Interception] {
        self.eavesdropper.interceptions()
    }

    pub fn steps_processed(&self) -> u64 {
        self.steps_processed
    }

    /// Builds the report from whatever has been processed so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            variant: self.config.variant,
            steps: self.steps_processed,
            vehicles: self.identities.vehicles().map(VehicleReport::from).collect(),
            interceptions: self.eavesdropper.interceptions().to_vec(),
            metrics: self.metrics.report(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eavesdrop::EavesdropStation;
    use crate::packet::PacketKind;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn silent(config: ProtocolConfig) -> ProtocolConfig {
        config.with_request_probability(0.0).with_reply_probability(0.0)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProtocolConfig::psaodv().with_hello_interval(0);
        assert!(SimulationSession::new(config).is_err());
    }

    #[test]
    fn test_three_vehicles_forced_off() {
        let mut session = SimulationSession::new(silent(ProtocolConfig::psaodv())).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let snapshot: Vec<_> = (0..3)
            .map(|i| (VehicleId::new(format!("veh{i}")), Position::new(i as f64 * 10.0, 0.0)))
            .collect();

        for step in 0..31 {
            session.process_step(step, &snapshot, &mut rng);
        }

        let metrics = session.metrics();
        assert_eq!(metrics.prreq_count, 0);
        assert_eq!(metrics.prrep_count, 0);
        // Steps 0, 10, 20, 30
        assert_eq!(metrics.hello_count, 4 * 3);
        assert_eq!(metrics.pdr(), 0.0);
    }

    #[test]
    fn test_refresh_counts_only_active_vehicles() {
        let mut session = SimulationSession::new(silent(ProtocolConfig::psaodv())).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let a = (VehicleId::from("a"), Position::new(0.0, 0.0));
        let b = (VehicleId::from("b"), Position::new(5.0, 0.0));

        // a is active 0..120, b only 0..60
        for step in 0..120 {
            let snapshot = if step < 60 { vec![a.clone(), b.clone()] } else { vec![a.clone()] };
            session.process_step(step, &snapshot, &mut rng);
        }

        // a: 0, 50, 100; b: 0, 50
        assert_eq!(session.metrics().pseudonym_refreshes, 5);
    }

    #[test]
    fn test_new_vehicles_counted_once() {
        let mut session = SimulationSession::new(silent(ProtocolConfig::aodv())).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let a = (VehicleId::from("a"), Position::new(0.0, 0.0));
        let b = (VehicleId::from("b"), Position::new(1.0, 0.0));
        let c = (VehicleId::from("c"), Position::new(2.0, 0.0));

        let first = session.process_step(0, &[a.clone(), b.clone()], &mut rng);
        let second = session.process_step(1, &[a, b, c], &mut rng);

        assert_eq!(first.new_vehicles, 2);
        assert_eq!(second.new_vehicles, 1);
        assert_eq!(second.active, 3);
    }

    #[test]
    fn test_dormant_vehicles_kept_in_report() {
        let mut session = SimulationSession::new(ProtocolConfig::aodv()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        session.process_step(0, &[(VehicleId::from("gone"), Position::new(1.0, 1.0))], &mut rng);
        session.process_step(1, &[(VehicleId::from("stays"), Position::new(2.0, 2.0))], &mut rng);

        let report = session.report();
        assert_eq!(report.steps, 2);
        assert_eq!(report.vehicles.len(), 2);
        let gone = report.vehicles.iter().find(|v| v.id.as_str() == "gone").unwrap();
        assert_eq!(gone.last_seen_step, 0);
        assert_eq!(gone.trajectory, vec![Position::new(1.0, 1.0)]);
    }

    #[test]
    fn test_plain_scenario_intercepts_first_packet() {
        let config = silent(ProtocolConfig::aodv())
            .with_stations(vec![EavesdropStation::new("eav1", 4429.02, 2834.03, 300.0)]);
        let mut session = SimulationSession::new(config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let near = (VehicleId::from("near"), Position::new(4429.02, 2834.03 + 250.0));
        let far = (VehicleId::from("far"), Position::new(4429.02, 2834.03 + 400.0));

        let outcome = session.process_step(0, &[near.clone(), far.clone()], &mut rng);

        // Step 0 HELLO is each vehicle's first packet
        assert_eq!(outcome.interceptions.len(), 1);
        let interception = &outcome.interceptions[0];
        assert_eq!(interception.vehicle, near.0);
        assert_eq!(interception.packet.kind, PacketKind::KeepAlive);

        for step in 1..15 {
            let outcome = session.process_step(step, &[near.clone(), far.clone()], &mut rng);
            assert!(outcome.interceptions.iter().all(|i| i.vehicle != far.0));
        }
        // Second HELLO at step 10 is new, nothing else is re-reported
        assert_eq!(session.interceptions().len(), 2);
    }

    #[test]
    fn test_pseudonymous_scenario_counts_prevention() {
        let config = silent(ProtocolConfig::psaodv());
        let mut session = SimulationSession::new(config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(13);

        let near = (VehicleId::from("near"), Position::new(4429.02, 2834.03 + 250.0));
        let far = (VehicleId::from("far"), Position::new(4429.02 + 900.0, 2834.03 + 900.0));

        for step in 0..4 {
            session.process_step(step, &[near.clone(), far.clone()], &mut rng);
        }

        let metrics = session.metrics();
        // near is only in range of eav1 (eav2 is ~590 m away)
        assert_eq!(metrics.eavesdropping_attempts, 4);
        assert_eq!(metrics.eavesdropping_prevented, 4);
        assert!(session.interceptions().is_empty());
    }

    proptest! {
        #[test]
        fn prop_trajectory_never_repeats(
            moves in prop::collection::vec((0u8..3, 0u8..3), 1..60),
            seed in any::<u64>(),
        ) {
            let mut session = SimulationSession::new(ProtocolConfig::psaodv()).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let id = VehicleId::from("veh0");

            for (step, (x, y)) in moves.into_iter().enumerate() {
                let position = Position::new(x as f64, y as f64);
                session.process_step(step as u64, &[(id.clone(), position)], &mut rng);
            }

            let trajectory = &session.identities().get(&id).unwrap().trajectory;
            for pair in trajectory.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
        }
    }
}
