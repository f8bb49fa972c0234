//! Common types shared by mobility sources and the protocol core.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// 2-D position in meters (network coordinates of the mobility source).
pub type Position = Point2<f64>;

/// Stable external identifier of a vehicle.
///
/// Owned by the mobility source; the protocol core never mints these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    /// Creates a VehicleId from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VehicleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One floating-car-data record: where a vehicle was at a given step.
///
/// This is the line format of the JSON trace consumed by [`crate::TraceReplay`]:
///
/// ```text
/// {"step":0,"id":"veh0","x":4429.02,"y":2600.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub step: u64,
    pub id: VehicleId,
    pub x: f64,
    pub y: f64,
}

impl PositionSample {
    /// Returns the sample's coordinate as a [`Position`].
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_id_display() {
        let id = VehicleId::from("flow0.12");
        assert_eq!(id.to_string(), "flow0.12");
        assert_eq!(id.as_str(), "flow0.12");
    }

    #[test]
    fn test_position_sample_json() {
        let sample: PositionSample =
            serde_json::from_str(r#"{"step":3,"id":"veh7","x":1.5,"y":-2.0}"#).unwrap();

        assert_eq!(sample.step, 3);
        assert_eq!(sample.id, VehicleId::from("veh7"));
        assert_eq!(sample.position(), Position::new(1.5, -2.0));
    }
}
