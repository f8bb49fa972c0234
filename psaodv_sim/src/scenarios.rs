//! Synthetic traffic scenarios laid out around the reference stations.
//!
//! All coordinates share the frame of the reference deployment:
//! `eav1` at (4429.02, 2834.03) and `eav2` at (4343.50, 2501.99).

use crate::traffic::{Lane, TrafficConfig};
use nalgebra::Vector2;
use psaodv_env::Position;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Two-way east-west road passing straight through eav1
    Corridor,

    /// Crossing roads past both stations plus a vehicle parked near eav1
    Crossroads,

    /// Densely spaced northbound column passing both stations
    Convoy,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Corridor, ScenarioId::Crossroads, ScenarioId::Convoy]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Corridor => "corridor",
            ScenarioId::Crossroads => "crossroads",
            ScenarioId::Convoy => "convoy",
        }
    }

    /// Returns a short description.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Corridor => "East-west traffic driving through eav1's coverage",
            ScenarioId::Crossroads => "Crossing flows past eav1 and eav2, one parked vehicle in range",
            ScenarioId::Convoy => "Tight northbound column, two departures per station pass",
        }
    }

    /// Default number of moving vehicles.
    pub fn default_vehicles(&self) -> usize {
        match self {
            ScenarioId::Corridor => 30,
            ScenarioId::Crossroads => 40,
            ScenarioId::Convoy => 25,
        }
    }

    /// Builds the traffic layout with `vehicles` moving vehicles.
    pub fn traffic_config(&self, vehicles: usize) -> TrafficConfig {
        match self {
            ScenarioId::Corridor => TrafficConfig {
                lanes: vec![
                    Lane::new(Position::new(3800.0, 2834.03), Vector2::new(1.0, 0.0)),
                    Lane::new(Position::new(5000.0, 2840.0), Vector2::new(-1.0, 0.0)),
                ],
                vehicles,
                spawn_interval: 4,
                lifetime_steps: 90,
                ..TrafficConfig::default()
            },
            ScenarioId::Crossroads => TrafficConfig {
                lanes: vec![
                    Lane::new(Position::new(4343.50, 2000.0), Vector2::new(0.0, 1.0)),
                    Lane::new(Position::new(3900.0, 2834.03), Vector2::new(1.0, 0.0)),
                    Lane::new(Position::new(4900.0, 2501.99), Vector2::new(-1.0, 0.0)),
                ],
                vehicles,
                spawn_interval: 3,
                lifetime_steps: 80,
                heading_noise_std: 0.01,
                parked: vec![Position::new(4529.02, 2834.03)],
                parked_steps: 150,
                ..TrafficConfig::default()
            },
            ScenarioId::Convoy => TrafficConfig {
                lanes: vec![Lane::new(Position::new(4343.50, 2100.0), Vector2::new(0.0, 1.0))],
                vehicles,
                spawn_interval: 2,
                lifetime_steps: 70,
                mean_speed: 15.0,
                speed_std: 0.5,
                ..TrafficConfig::default()
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corridor" => Ok(ScenarioId::Corridor),
            "crossroads" | "crossing" => Ok(ScenarioId::Crossroads),
            "convoy" | "platoon" => Ok(ScenarioId::Convoy),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
