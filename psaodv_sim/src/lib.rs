//! PS-AODV Simulation Harness
//!
//! Drives a [`psaodv_core::SimulationSession`] against a mobility source in
//! lock-step and collects the results.
//!
//! # Pieces
//!
//! - **Randomness**: all entropy derived from a single 64-bit seed
//!   ([`SimContext`]); protocol and traffic use separate streams
//! - **Mobility**: [`SyntheticTraffic`] generates seeded vehicle flows for the
//!   built-in [`scenarios`]; recorded traces replay through
//!   [`psaodv_env::TraceReplay`]
//! - **Lifecycle**: [`SimulationRunner`] advances the source, stops on
//!   exhaustion, step cap, interrupt or source failure, and always closes the
//!   source once
//!
//! # Usage
//!
//! ```ignore
//! use psaodv_core::{ProtocolConfig, SimulationSession};
//! use psaodv_sim::{scenarios::ScenarioId, SimulationRunner, SyntheticTraffic};
//!
//! let traffic = ScenarioId::Corridor.traffic_config(30);
//! let mut source = SyntheticTraffic::new(&traffic, 42)?;
//! let mut session = SimulationSession::new(ProtocolConfig::psaodv())?;
//!
//! let outcome = SimulationRunner::new(42).run(&mut session, &mut source);
//! println!("{}", outcome.report.metrics);
//! ```

mod context;
mod error;
mod exporter;
mod runner;
pub mod scenarios;
mod traffic;

pub use context::{derive_seed, SimContext};
pub use error::SimError;
pub use exporter::{ExportedRun, RunExport};
pub use runner::{RunOutcome, RunnerConfig, SimulationRunner, Termination, REFERENCE_PSAODV_MAX_STEPS};
pub use traffic::{Lane, SyntheticTraffic, SyntheticVehicle, TrafficConfig};
