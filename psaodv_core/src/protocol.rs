//! The protocol engine: per-step route discovery, replies, HELLO beacons
//! and pseudonym refresh.
//!
//! The engine is split in two:
//! - [`TriggerPolicy`] decides *when* something happens (the reference
//!   [`StochasticTriggers`] flips weighted coins and counts steps)
//! - [`ProtocolEngine`] decides *what* happens when it does: which packet
//!   is built, who it is attributed to and which counters move
//!
//! A route-table-driven policy can replace the stochastic one without
//! touching packet attribution or metrics.
//!
//! # Per-vehicle state machine
//!
//! ```text
//!   should_request ──► RREQ  (attributed to originator, opens discovery)
//!   should_reply   ──► pick target ≠ self ──► RREP (attributed, closes target's discovery)
//!   keep_alive_due ──► HELLO (attributed to originator)
//!   refresh_due    ──► new pseudonym (pseudonymous variant)
//! ```

use crate::config::{ProtocolConfig, Variant};
use crate::identity::IdentityManager;
use crate::metrics::{MetricEvent, Metrics};
use crate::packet::{Packet, PacketKind, SequencePolicy};
use psaodv_env::VehicleId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Route-reply quality scores are uniform over this interval.
const QUALITY_RANGE: std::ops::RangeInclusive<f64> = 0.8..=1.0;

/// Decides when protocol events fire.
pub trait TriggerPolicy {
    /// Should `vehicle` start route discovery this step?
    fn should_request<R: Rng>(&mut self, vehicle: &VehicleId, step: u64, rng: &mut R) -> bool;

    /// Should `vehicle` send a route reply this step?
    fn should_reply<R: Rng>(&mut self, vehicle: &VehicleId, step: u64, rng: &mut R) -> bool;

    /// Is this a HELLO step?
    fn keep_alive_due(&self, step: u64) -> bool;

    /// Is this a pseudonym-refresh step?
    fn refresh_due(&self, step: u64) -> bool;

    /// Picks the vehicle a reply is addressed to.
    ///
    /// Defaults to a uniform choice among `active` excluding `vehicle`;
    /// `None` means nobody is eligible and the reply is skipped.
    fn choose_reply_target<R: Rng>(
        &mut self,
        vehicle: &VehicleId,
        active: &[VehicleId],
        rng: &mut R,
    ) -> Option<VehicleId> {
        let candidates: Vec<&VehicleId> = active.iter().filter(|id| *id != vehicle).collect();
        candidates.choose(rng).map(|id| (*id).clone())
    }
}

/// Reference trigger policy: fixed probabilities and fixed intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticTriggers {
    pub request_probability: f64,
    pub reply_probability: f64,
    pub hello_interval: u64,
    pub refresh_interval: u64,
}

impl StochasticTriggers {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            request_probability: config.request_probability,
            reply_probability: config.reply_probability,
            hello_interval: config.hello_interval,
            refresh_interval: config.refresh_interval,
        }
    }
}

impl Default for StochasticTriggers {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

impl TriggerPolicy for StochasticTriggers {
    fn should_request<R: Rng>(&mut self, _vehicle: &VehicleId, _step: u64, rng: &mut R) -> bool {
        rng.gen_bool(self.request_probability)
    }

    fn should_reply<R: Rng>(&mut self, _vehicle: &VehicleId, _step: u64, rng: &mut R) -> bool {
        rng.gen_bool(self.reply_probability)
    }

    fn keep_alive_due(&self, step: u64) -> bool {
        step % self.hello_interval.max(1) == 0
    }

    fn refresh_due(&self, step: u64) -> bool {
        step % self.refresh_interval.max(1) == 0
    }
}

/// Whether a route-discovery packet counts as delivered.
///
/// `Never` reproduces the reference behaviour, where no event ever confirms
/// delivery and the PDR stays at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    Never,
    Probability(f64),
}

impl DeliveryPolicy {
    /// Draws a delivery confirmation.
    pub fn confirms<R: Rng>(&self, rng: &mut R) -> bool {
        match *self {
            DeliveryPolicy::Never => false,
            DeliveryPolicy::Probability(p) => rng.gen_bool(p),
        }
    }
}

/// Builds packets and attributes them to vehicles.
#[derive(Debug, Clone)]
pub struct ProtocolEngine<P = StochasticTriggers> {
    variant: Variant,
    policy: P,
    sequence: SequencePolicy,
    delivery: DeliveryPolicy,
}

impl ProtocolEngine<StochasticTriggers> {
    /// Creates an engine with the reference trigger policy.
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::with_policy(config, StochasticTriggers::from_config(config))
    }
}

impl<P: TriggerPolicy> ProtocolEngine<P> {
    /// Creates an engine with a custom trigger policy.
    pub fn with_policy(config: &ProtocolConfig, policy: P) -> Self {
        Self {
            variant: config.variant,
            policy,
            sequence: config.sequence,
            delivery: config.delivery,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Runs every active vehicle through one step and returns the packets
    /// emitted, in vehicle order.
    pub fn run_step<R: Rng>(
        &mut self,
        step: u64,
        active: &[VehicleId],
        identities: &mut IdentityManager,
        metrics: &mut Metrics,
        rng: &mut R,
    ) -> Vec<Packet> {
        let mut emitted = Vec::new();
        for vehicle in active {
            emitted.extend(self.step_vehicle(vehicle, step, active, identities, metrics, rng));
        }
        emitted
    }

    /// Evaluates the state machine for a single vehicle.
    pub fn step_vehicle<R: Rng>(
        &mut self,
        vehicle: &VehicleId,
        step: u64,
        active: &[VehicleId],
        identities: &mut IdentityManager,
        metrics: &mut Metrics,
        rng: &mut R,
    ) -> Vec<Packet> {
        let mut emitted = Vec::new();

        if self.policy.should_request(vehicle, step, rng) {
            emitted.push(self.send_route_request(vehicle, step, identities, metrics, rng));
        }

        if self.policy.should_reply(vehicle, step, rng) {
            match self.policy.choose_reply_target(vehicle, active, rng) {
                Some(target) => {
                    emitted.push(self.send_route_reply(vehicle, &target, step, identities, metrics, rng));
                }
                None => trace!("Step {}: Vehicle {} has no reply target", step, vehicle),
            }
        }

        if self.policy.keep_alive_due(step) {
            emitted.push(self.send_keep_alive(vehicle, step, identities, metrics, rng));
        }

        if self.variant.is_pseudonymous() && self.policy.refresh_due(step) {
            identities.refresh_pseudonym(vehicle, rng, metrics);
        }

        emitted
    }

    fn send_route_request<R: Rng>(
        &self,
        vehicle: &VehicleId,
        step: u64,
        identities: &mut IdentityManager,
        metrics: &mut Metrics,
        rng: &mut R,
    ) -> Packet {
        let pseudonymous = self.variant.is_pseudonymous();
        let state = identities.ensure_vehicle(vehicle, step, rng);
        let sequence = self
            .sequence
            .next(rng, PacketKind::RouteRequest, step, &state.seen_packets);

        let packet = Packet::route_request(vehicle.clone(), state.pseudonym.clone(), sequence, step);
        state.attribute(&packet, pseudonymous);
        state.pending_discovery.get_or_insert(step);

        metrics.record(MetricEvent::RouteRequestSent);
        debug!(
            "Step {}: Vehicle {} ({}) broadcasting {}",
            step,
            vehicle,
            packet.visible_identity(),
            packet.kind.label(pseudonymous)
        );

        self.confirm_delivery(&packet, metrics, rng);
        packet
    }

    fn send_route_reply<R: Rng>(
        &self,
        vehicle: &VehicleId,
        target: &VehicleId,
        step: u64,
        identities: &mut IdentityManager,
        metrics: &mut Metrics,
        rng: &mut R,
    ) -> Packet {
        let pseudonymous = self.variant.is_pseudonymous();
        let pseudonym = identities.ensure_vehicle(vehicle, step, rng).pseudonym.clone();
        let quality_score = pseudonymous.then(|| rng.gen_range(QUALITY_RANGE));

        // PS-AODV logs the reply with the vehicle it is addressed to;
        // plain AODV keeps it with the sender.
        let holder = if pseudonymous { target } else { vehicle };
        let holder_state = identities.ensure_vehicle(holder, step, rng);
        let sequence = self
            .sequence
            .next(rng, PacketKind::RouteReply, step, &holder_state.seen_packets);

        let packet = Packet::route_reply(
            vehicle.clone(),
            target.clone(),
            pseudonym,
            quality_score,
            sequence,
            step,
        );
        holder_state.attribute(&packet, pseudonymous);
        metrics.record(MetricEvent::RouteReplySent);

        let opened = identities
            .ensure_vehicle(target, step, rng)
            .pending_discovery
            .take();
        if let Some(requested_at) = opened {
            metrics.record(MetricEvent::RouteDiscovered {
                latency_steps: step.saturating_sub(requested_at),
            });
        }

        match quality_score {
            Some(quality) => debug!(
                "Step {}: Vehicle {} sending {} to {} with quality {:.3}",
                step,
                vehicle,
                packet.kind.label(pseudonymous),
                target,
                quality
            ),
            None => debug!(
                "Step {}: Vehicle {} sending {} to {}",
                step,
                vehicle,
                packet.kind.label(pseudonymous),
                target
            ),
        }

        self.confirm_delivery(&packet, metrics, rng);
        packet
    }

    fn send_keep_alive<R: Rng>(
        &self,
        vehicle: &VehicleId,
        step: u64,
        identities: &mut IdentityManager,
        metrics: &mut Metrics,
        rng: &mut R,
    ) -> Packet {
        let state = identities.ensure_vehicle(vehicle, step, rng);
        let sequence = self
            .sequence
            .next(rng, PacketKind::KeepAlive, step, &state.seen_packets);

        let packet = Packet::keep_alive(vehicle.clone(), state.pseudonym.clone(), sequence, step);
        state.attribute(&packet, false);

        metrics.record(MetricEvent::KeepAliveSent);
        trace!(
            "Step {}: Vehicle {} sending HELLO as {}",
            step,
            vehicle,
            packet.visible_identity()
        );
        packet
    }

    /// Only route-discovery packets count towards the delivery ratio.
    fn confirm_delivery<R: Rng>(&self, packet: &Packet, metrics: &mut Metrics, rng: &mut R) {
        if packet.kind.is_route_discovery() && self.delivery.confirms(rng) {
            metrics.record(MetricEvent::DeliveryConfirmed);
        }
    }
}
