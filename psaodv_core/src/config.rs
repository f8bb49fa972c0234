//! Protocol configuration.
//!
//! Defaults reproduce the reference behaviour: 10% route-request chance,
//! 5% route-reply chance, HELLO every 10 steps, pseudonym refresh every
//! 50 steps, sequence numbers drawn from 1..=10000, two eavesdropping
//! stations with a 300 m range.

use crate::eavesdrop::{EavesdropStation, PreventionModel};
use crate::packet::SequencePolicy;
use crate::protocol::DeliveryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which flavour of the routing protocol is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Plain AODV: real identities on the air, per-packet interception
    Plain,

    /// PS-AODV: rotating pseudonyms, route logs, prevention accounting
    Pseudonymous,
}

impl Variant {
    /// Returns both variants, plain first.
    pub fn all() -> [Variant; 2] {
        [Variant::Plain, Variant::Pseudonymous]
    }

    /// Returns the short protocol name.
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Plain => "aodv",
            Variant::Pseudonymous => "psaodv",
        }
    }

    pub fn is_pseudonymous(&self) -> bool {
        matches!(self, Variant::Pseudonymous)
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aodv" | "plain" => Ok(Variant::Plain),
            "psaodv" | "ps-aodv" | "pseudonymous" => Ok(Variant::Pseudonymous),
            _ => Err(format!("Unknown variant: {}", s)),
        }
    }
}

/// Invalid protocol configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a probability in [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("{0} interval must be at least one step")]
    ZeroInterval(&'static str),

    #[error("Sequence range must contain at least one value")]
    EmptySequenceRange,

    #[error("Station {id} has invalid range {range}")]
    StationRange { id: String, range: f64 },
}

/// Configuration for one protocol run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol flavour
    pub variant: Variant,

    /// Per-vehicle, per-step chance of starting route discovery
    pub request_probability: f64,

    /// Per-vehicle, per-step chance of answering with a route reply
    pub reply_probability: f64,

    /// Steps between HELLO broadcasts
    pub hello_interval: u64,

    /// Steps between pseudonym refreshes (pseudonymous variant only)
    pub refresh_interval: u64,

    /// Sequence number generation
    pub sequence: SequencePolicy,

    /// Delivery confirmation for route-discovery packets
    pub delivery: DeliveryPolicy,

    /// How pseudonymous observations are judged
    pub prevention: PreventionModel,

    /// Passive listeners
    pub stations: Vec<EavesdropStation>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Pseudonymous,
            request_probability: 0.10,
            reply_probability: 0.05,
            hello_interval: 10,
            refresh_interval: 50,
            sequence: SequencePolicy::default(),
            delivery: DeliveryPolicy::Never,
            prevention: PreventionModel::AssumeUnlinkable,
            stations: EavesdropStation::reference_set(),
        }
    }
}

impl ProtocolConfig {
    /// Reference configuration for plain AODV.
    pub fn aodv() -> Self {
        Self::default().with_variant(Variant::Plain)
    }

    /// Reference configuration for PS-AODV.
    pub fn psaodv() -> Self {
        Self::default().with_variant(Variant::Pseudonymous)
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the route-request probability.
    pub fn with_request_probability(mut self, p: f64) -> Self {
        self.request_probability = p;
        self
    }

    /// Sets the route-reply probability.
    pub fn with_reply_probability(mut self, p: f64) -> Self {
        self.reply_probability = p;
        self
    }

    pub fn with_hello_interval(mut self, steps: u64) -> Self {
        self.hello_interval = steps;
        self
    }

    pub fn with_refresh_interval(mut self, steps: u64) -> Self {
        self.refresh_interval = steps;
        self
    }

    pub fn with_sequence(mut self, sequence: SequencePolicy) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_prevention(mut self, prevention: PreventionModel) -> Self {
        self.prevention = prevention;
        self
    }

    /// Replaces the eavesdropping stations.
    pub fn with_stations(mut self, stations: Vec<EavesdropStation>) -> Self {
        self.stations = stations;
        self
    }

    /// Checks every bound before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("request_probability", self.request_probability)?;
        check_probability("reply_probability", self.reply_probability)?;
        if let DeliveryPolicy::Probability(p) = self.delivery {
            check_probability("delivery probability", p)?;
        }

        if self.hello_interval == 0 {
            return Err(ConfigError::ZeroInterval("HELLO"));
        }
        if self.refresh_interval == 0 {
            return Err(ConfigError::ZeroInterval("Pseudonym refresh"));
        }
        if self.sequence.max_sequence == 0 {
            return Err(ConfigError::EmptySequenceRange);
        }

        for station in &self.stations {
            if !station.range.is_finite() || station.range <= 0.0 {
                return Err(ConfigError::StationRange {
                    id: station.id.clone(),
                    range: station.range,
                });
            }
        }

        Ok(())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference() {
        let config = ProtocolConfig::default();

        assert_eq!(config.variant, Variant::Pseudonymous);
        assert_eq!(config.request_probability, 0.10);
        assert_eq!(config.reply_probability, 0.05);
        assert_eq!(config.hello_interval, 10);
        assert_eq!(config.refresh_interval, 50);
        assert_eq!(config.sequence.max_sequence, 10_000);
        assert!(!config.sequence.dedupe_within_step);
        assert_eq!(config.delivery, DeliveryPolicy::Never);
        assert_eq!(config.stations.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let config = ProtocolConfig::aodv().with_request_probability(1.5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Probability { name: "request_probability", value: 1.5 })
        );

        // NaN is not in [0, 1]
        let config = ProtocolConfig::aodv().with_reply_probability(f64::NAN);
        assert!(config.validate().is_err());

        let config = ProtocolConfig::aodv().with_delivery(DeliveryPolicy::Probability(-0.1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        assert_eq!(
            ProtocolConfig::psaodv().with_hello_interval(0).validate(),
            Err(ConfigError::ZeroInterval("HELLO"))
        );
        assert!(ProtocolConfig::psaodv().with_refresh_interval(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_station() {
        let config = ProtocolConfig::aodv()
            .with_stations(vec![EavesdropStation::new("eav9", 0.0, 0.0, -5.0)]);
        assert!(matches!(config.validate(), Err(ConfigError::StationRange { .. })));
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("AODV".parse::<Variant>(), Ok(Variant::Plain));
        assert_eq!("ps-aodv".parse::<Variant>(), Ok(Variant::Pseudonymous));
        assert!("olsr".parse::<Variant>().is_err());
        assert_eq!(Variant::Pseudonymous.to_string(), "psaodv");
    }
}
