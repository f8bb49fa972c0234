//! PS-AODV Environment Abstraction Layer
//!
//! This crate isolates the protocol engine from whatever produces vehicle
//! movement. A mobility source is anything that can:
//! - List the vehicles present in the current step
//! - Report the 2-D position of a present vehicle
//! - Advance simulated time by one step
//! - Tell the caller how many vehicles are still expected
//!
//! The protocol core only ever talks to [`MobilitySource`], so the same
//! engine runs against a recorded trace ([`TraceReplay`]) or the seeded
//! synthetic traffic generator in `psaodv_sim`.
//!
//! # Example
//!
//! ```ignore
//! use psaodv_env::MobilitySource;
//!
//! fn drive<M: MobilitySource>(source: &mut M) -> Result<(), psaodv_env::EnvError> {
//!     while source.remaining_expected_nodes() > 0 {
//!         source.advance_step()?;
//!         for id in source.active_node_ids() {
//!             let _pos = source.position(&id);
//!         }
//!     }
//!     source.close()
//! }
//! ```

mod error;
mod mobility;
mod replay;
mod types;

pub use error::EnvError;
pub use mobility::{MobilitySource, Snapshot};
pub use replay::TraceReplay;
pub use types::{Position, PositionSample, VehicleId};
