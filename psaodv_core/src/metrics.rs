//! PS-AODV Metrics Module
//! ======================
//!
//! Run-scoped accumulation of protocol and privacy counters:
//! - **Protocol**: PRREQ / PRREP / HELLO counts, total route packets
//! - **Privacy**: pseudonym refreshes, eavesdropping attempts, preventions,
//!   interceptions and linked observations
//! - **Delivery**: confirmed deliveries and route-discovery latencies
//!
//! Counters only ever grow through [`Metrics::record`]; a new run starts
//! from a fresh [`Metrics`].

use serde::{Deserialize, Serialize};

/// One observable occurrence during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    PseudonymRefreshed,
    RouteRequestSent,
    RouteReplySent,
    KeepAliveSent,

    /// A vehicle was inside a station's range this step
    EavesdropAttempt,

    /// An attempt judged unable to link the vehicle's identity
    EavesdropPrevented,

    /// A station linked two sightings of the same pseudonym
    EavesdropLinked,

    /// A (station, packet) pair reported for the first time
    Interception,

    /// Delivery confirmation for a route-discovery packet
    DeliveryConfirmed,

    /// A route request was answered after `latency_steps` steps
    RouteDiscovered { latency_steps: u64 },
}

/// Accumulated counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub pseudonym_refreshes: u64,
    pub prreq_count: u64,
    pub prrep_count: u64,
    pub hello_count: u64,
    pub eavesdropping_attempts: u64,
    pub eavesdropping_prevented: u64,
    pub linked_observations: u64,
    pub interceptions: u64,
    pub successful_deliveries: u64,

    /// Route-discovery packets (PRREQ + PRREP); HELLO beacons are excluded
    pub total_packets: u64,

    /// Steps between a route request and the reply that answered it
    pub route_discovery_times: Vec<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event.
    pub fn record(&mut self, event: MetricEvent) {
        match event {
            MetricEvent::PseudonymRefreshed => self.pseudonym_refreshes += 1,
            MetricEvent::RouteRequestSent => {
                self.prreq_count += 1;
                self.total_packets += 1;
            }
            MetricEvent::RouteReplySent => {
                self.prrep_count += 1;
                self.total_packets += 1;
            }
            MetricEvent::KeepAliveSent => self.hello_count += 1,
            MetricEvent::EavesdropAttempt => self.eavesdropping_attempts += 1,
            MetricEvent::EavesdropPrevented => self.eavesdropping_prevented += 1,
            MetricEvent::EavesdropLinked => self.linked_observations += 1,
            MetricEvent::Interception => self.interceptions += 1,
            MetricEvent::DeliveryConfirmed => self.successful_deliveries += 1,
            MetricEvent::RouteDiscovered { latency_steps } => {
                self.route_discovery_times.push(latency_steps)
            }
        }
    }

    /// Packet delivery ratio in [0, 1]; exactly 0 when nothing was sent.
    pub fn pdr(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        (self.successful_deliveries as f64 / self.total_packets as f64).clamp(0.0, 1.0)
    }

    /// Produces the final report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            counters: self.clone(),
            pdr: self.pdr(),
            mean_discovery_latency: mean(&self.route_discovery_times),
            delivery_unconfirmed: self.total_packets > 0 && self.successful_deliveries == 0,
        }
    }
}

fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<u64>() as f64 / values.len() as f64)
    }
}

/// End-of-run metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub counters: Metrics,

    /// Packet delivery ratio
    pub pdr: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_discovery_latency: Option<f64>,

    /// Route packets were sent but no delivery was ever confirmed, so the
    /// PDR is 0 by construction rather than by measurement
    pub delivery_unconfirmed: bool,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counters;
        writeln!(f, "Total Pseudonym Refreshes: {}", c.pseudonym_refreshes)?;
        writeln!(f, "Total PRREQ Packets: {}", c.prreq_count)?;
        writeln!(f, "Total PRREP Packets: {}", c.prrep_count)?;
        writeln!(f, "Total HELLO Messages: {}", c.hello_count)?;
        writeln!(f, "Eavesdropping Attempts: {}", c.eavesdropping_attempts)?;
        writeln!(f, "Eavesdropping Prevented: {}", c.eavesdropping_prevented)?;
        writeln!(f, "Linked Observations: {}", c.linked_observations)?;
        writeln!(f, "Interceptions: {}", c.interceptions)?;
        write!(f, "Packet Delivery Ratio (PDR): {:.2}", self.pdr)?;
        if self.delivery_unconfirmed {
            write!(f, " (no delivery confirmations)")?;
        }
        writeln!(f)?;
        write!(f, "Route Discovery Times: {:?}", c.route_discovery_times)
    }
}
