//! PS-AODV Core - Route Discovery and Eavesdropping Model for Vehicular Networks
//!
//! This library simulates three things on top of an external mobility source:
//! 1. **Route discovery**: AODV-style RREQ / RREP / HELLO events per vehicle
//! 2. **Pseudonym rotation**: PS-AODV's periodic identity refresh
//! 3. **Passive eavesdropping**: fixed stations with a radio range that try
//!    to intercept or link control traffic
//!
//! All per-run state lives in a [`SimulationSession`]; protocol and privacy
//! counters are aggregated in [`Metrics`].

pub mod config;
pub mod eavesdrop;
pub mod geometry;
pub mod identity;
pub mod metrics;
pub mod packet;
pub mod protocol;
pub mod session;

// Re-export key types for convenience
pub use config::{ConfigError, ProtocolConfig, Variant};
pub use eavesdrop::{EavesdropStation, Eavesdropper, Interception, PreventionModel};
pub use identity::{IdentityManager, Pseudonym, VehicleState};
pub use metrics::{MetricEvent, Metrics, MetricsReport};
pub use packet::{Packet, PacketKey, PacketKind, SequencePolicy};
pub use protocol::{DeliveryPolicy, ProtocolEngine, StochasticTriggers, TriggerPolicy};
pub use session::{RunReport, SimulationSession, StepOutcome, VehicleReport};
