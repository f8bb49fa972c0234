//! Control-message records.
//!
//! Packets are events, not bytes: nothing here is ever serialized onto a
//! wire. A packet is immutable once created and identified for interception
//! purposes by its [`PacketKey`] `(kind, sequence, step)`.

use crate::identity::Pseudonym;
use psaodv_env::VehicleId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Redraw attempts before a colliding sequence number is accepted anyway.
const MAX_SEQUENCE_REDRAWS: usize = 16;

/// Kind of control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PacketKind {
    /// Route discovery broadcast
    RouteRequest,

    /// Answer to a route request
    RouteReply,

    /// Periodic liveness beacon
    KeepAlive,
}

impl PacketKind {
    /// Short label as printed in logs.
    ///
    /// Pseudonymous route messages are prefixed with `P` (PRREQ / PRREP).
    pub fn label(&self, pseudonymous: bool) -> &'static str {
        match (self, pseudonymous) {
            (PacketKind::RouteRequest, false) => "RREQ",
            (PacketKind::RouteRequest, true) => "PRREQ",
            (PacketKind::RouteReply, false) => "RREP",
            (PacketKind::RouteReply, true) => "PRREP",
            (PacketKind::KeepAlive, _) => "HELLO",
        }
    }

    /// Returns true for RREQ/RREP, the packets counted towards PDR.
    pub fn is_route_discovery(&self) -> bool {
        matches!(self, PacketKind::RouteRequest | PacketKind::RouteReply)
    }
}

/// Identity of a packet for interception bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketKey {
    pub kind: PacketKind,
    pub sequence: u32,
    pub step: u64,
}

/// A control message emitted during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub kind: PacketKind,

    /// Vehicle that put the packet on the air
    pub originator: VehicleId,

    /// Vehicle a route reply is addressed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<VehicleId>,

    pub sequence: u32,

    pub step: u64,

    /// Identity token used instead of the real id (pseudonymous variant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudonym: Option<Pseudonym>,

    /// Route-reply confidence in [0.8, 1.0] (pseudonymous variant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl Packet {
    /// Creates a route request.
    pub fn route_request(
        originator: VehicleId,
        pseudonym: Option<Pseudonym>,
        sequence: u32,
        step: u64,
    ) -> Self {
        Self {
            kind: PacketKind::RouteRequest,
            originator,
            target: None,
            sequence,
            step,
            pseudonym,
            quality_score: None,
        }
    }

    /// Creates a route reply addressed to `target`.
    pub fn route_reply(
        originator: VehicleId,
        target: VehicleId,
        pseudonym: Option<Pseudonym>,
        quality_score: Option<f64>,
        sequence: u32,
        step: u64,
    ) -> Self {
        Self {
            kind: PacketKind::RouteReply,
            originator,
            target: Some(target),
            sequence,
            step,
            pseudonym,
            quality_score,
        }
    }

    /// Creates a HELLO beacon.
    pub fn keep_alive(
        originator: VehicleId,
        pseudonym: Option<Pseudonym>,
        sequence: u32,
        step: u64,
    ) -> Self {
        Self {
            kind: PacketKind::KeepAlive,
            originator,
            target: None,
            sequence,
            step,
            pseudonym,
            quality_score: None,
        }
    }

    /// Returns the interception key of this packet.
    pub fn key(&self) -> PacketKey {
        PacketKey {
            kind: self.kind,
            sequence: self.sequence,
            step: self.step,
        }
    }

    /// Returns the identity an observer sees on the air.
    pub fn visible_identity(&self) -> &str {
        match &self.pseudonym {
            Some(pseudonym) => pseudonym.as_str(),
            None => self.originator.as_str(),
        }
    }
}

/// How sequence numbers are drawn.
///
/// Numbers are uniform over `1..=max_sequence` and independent per packet.
/// Collisions are tolerated by default, the way AODV tolerates sequence
/// wraparound; `dedupe_within_step` redraws numbers that collide with a key
/// the same vehicle already holds for the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePolicy {
    pub max_sequence: u32,
    pub dedupe_within_step: bool,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            max_sequence: 10_000,
            dedupe_within_step: false,
        }
    }
}

impl SequencePolicy {
    /// Draws one sequence number.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.gen_range(1..=self.max_sequence.max(1))
    }

    /// Draws a sequence number for a packet of `kind` at `step`, honouring
    /// `dedupe_within_step` against the keys the vehicle already holds.
    pub fn next<R: Rng>(
        &self,
        rng: &mut R,
        kind: PacketKind,
        step: u64,
        held: &BTreeSet<PacketKey>,
    ) -> u32 {
        let mut sequence = self.draw(rng);
        if !self.dedupe_within_step {
            return sequence;
        }

        for _ in 0..MAX_SEQUENCE_REDRAWS {
            if !held.contains(&PacketKey { kind, sequence, step }) {
                return sequence;
            }
            sequence = self.draw(rng);
        }

        warn!("Sequence {} reused at step {} after {} redraws", sequence, step, MAX_SEQUENCE_REDRAWS);
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_labels() {
        assert_eq!(PacketKind::RouteRequest.label(false), "RREQ");
        assert_eq!(PacketKind::RouteRequest.label(true), "PRREQ");
        assert_eq!(PacketKind::RouteReply.label(true), "PRREP");
        assert_eq!(PacketKind::KeepAlive.label(true), "HELLO");
        assert!(!PacketKind::KeepAlive.is_route_discovery());
    }

    #[test]
    fn test_packet_key() {
        let packet = Packet::route_reply(
            VehicleId::from("veh0"),
            VehicleId::from("veh1"),
            None,
            None,
            42,
            7,
        );

        assert_eq!(
            packet.key(),
            PacketKey { kind: PacketKind::RouteReply, sequence: 42, step: 7 }
        );
        assert_eq!(packet.visible_identity(), "veh0");
    }

    #[test]
    fn test_sequence_in_range() {
        let policy = SequencePolicy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..1000 {
            let seq = policy.draw(&mut rng);
            assert!((1..=10_000).contains(&seq));
        }
    }

    #[test]
    fn test_sequence_dedupe_within_step() {
        // Two possible values, one already held: dedupe must pick the other
        let policy = SequencePolicy { max_sequence: 2, dedupe_within_step: true };
        let mut held = BTreeSet::new();
        held.insert(PacketKey { kind: PacketKind::RouteRequest, sequence: 1, step: 3 });

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(policy.next(&mut rng, PacketKind::RouteRequest, 3, &held), 2);
        }
    }

    #[test]
    fn test_sequence_collisions_tolerated_by_default() {
        let policy = SequencePolicy { max_sequence: 1, dedupe_within_step: false };
        let mut held = BTreeSet::new();
        held.insert(PacketKey { kind: PacketKind::RouteRequest, sequence: 1, step: 0 });

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(policy.next(&mut rng, PacketKind::RouteRequest, 0, &held), 1);
    }
}
