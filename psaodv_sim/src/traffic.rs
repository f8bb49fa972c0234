//! Synthetic traffic generator.
//!
//! A seeded stand-in for an external traffic simulator:
//! - Vehicles depart one after another onto straight lanes
//! - Each drives at its own constant speed with optional heading noise
//! - Each leaves the network after a fixed number of steps
//! - Parked vehicles sit still for the whole run

use nalgebra::{Rotation2, Vector2};
use psaodv_env::{EnvError, MobilitySource, Position, VehicleId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// A straight lane: vehicles start at `start` and drive along `direction`.
#[derive(Debug, Clone)]
pub struct Lane {
    pub start: Position,
    pub direction: Vector2<f64>,
}

impl Lane {
    /// Creates a lane; `direction` is normalized.
    pub fn new(start: Position, direction: Vector2<f64>) -> Self {
        Self {
            start,
            direction: direction.normalize(),
        }
    }
}

/// Shape of the generated traffic.
#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub lanes: Vec<Lane>,

    /// Moving vehicles to generate
    pub vehicles: usize,

    /// Steps between consecutive departures
    pub spawn_interval: u64,

    /// Steps each moving vehicle stays in the network
    pub lifetime_steps: u64,

    /// Mean speed in meters per step
    pub mean_speed: f64,

    /// Standard deviation of the per-vehicle speed
    pub speed_std: f64,

    /// Standard deviation of the per-step heading change (radians)
    pub heading_noise_std: f64,

    /// Stationary vehicles, present for `parked_steps` from step 0
    pub parked: Vec<Position>,
    pub parked_steps: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            lanes: vec![Lane::new(Position::new(0.0, 0.0), Vector2::new(1.0, 0.0))],
            vehicles: 20,
            spawn_interval: 5,
            lifetime_steps: 90,
            mean_speed: 14.0, // ~50 km/h at one step per second
            speed_std: 2.0,
            heading_noise_std: 0.0,
            parked: Vec::new(),
            parked_steps: 0,
        }
    }
}

impl TrafficConfig {
    pub fn with_vehicles(mut self, vehicles: usize) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn with_lifetime(mut self, steps: u64) -> Self {
        self.lifetime_steps = steps;
        self
    }

    pub fn with_heading_noise(mut self, std_dev: f64) -> Self {
        self.heading_noise_std = std_dev;
        self
    }
}

/// One generated vehicle.
#[derive(Debug, Clone)]
pub struct SyntheticVehicle {
    pub id: VehicleId,

    /// First step the vehicle is present
    pub depart: u64,

    /// First step the vehicle is gone
    pub arrive: u64,

    pub position: Position,

    /// Displacement per step
    pub velocity: Vector2<f64>,
}

impl SyntheticVehicle {
    pub fn is_active(&self, step: u64) -> bool {
        self.depart <= step && step < self.arrive
    }
}

/// Seeded kinematic mobility source.
pub struct SyntheticTraffic {
    vehicles: Vec<SyntheticVehicle>,

    /// RNG for heading noise (separate from the protocol stream)
    rng: ChaCha8Rng,

    heading_noise: Option<Normal<f64>>,

    /// Step currently exposed (None before the first advance)
    current: Option<u64>,

    /// Fault injection: advancing to this step fails
    fail_at: Option<u64>,

    closed: bool,
}

impl SyntheticTraffic {
    /// Generates the vehicle population for `config`.
    pub fn new(config: &TrafficConfig, seed: u64) -> Result<Self, EnvError> {
        if config.lanes.is_empty() && config.vehicles > 0 {
            return Err(EnvError::unavailable("traffic config has vehicles but no lanes"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let speed = Normal::new(config.mean_speed, config.speed_std.max(0.0))
            .map_err(|e| EnvError::unavailable(format!("invalid speed distribution: {}", e)))?;
        let heading_noise = if config.heading_noise_std > 0.0 {
            Some(
                Normal::new(0.0, config.heading_noise_std)
                    .map_err(|e| EnvError::unavailable(format!("invalid heading noise: {}", e)))?,
            )
        } else {
            None
        };

        let mut vehicles = Vec::with_capacity(config.vehicles + config.parked.len());

        for i in 0..config.vehicles {
            let lane = &config.lanes[rng.gen_range(0..config.lanes.len())];
            let depart = i as u64 * config.spawn_interval;
            let vehicle_speed = speed.sample(&mut rng).max(0.1);

            vehicles.push(SyntheticVehicle {
                id: VehicleId::new(format!("veh{}", i)),
                depart,
                arrive: depart + config.lifetime_steps,
                position: lane.start,
                velocity: lane.direction * vehicle_speed,
            });
        }

        for (i, position) in config.parked.iter().enumerate() {
            vehicles.push(SyntheticVehicle {
                id: VehicleId::new(format!("parked{}", i)),
                depart: 0,
                arrive: config.parked_steps,
                position: *position,
                velocity: Vector2::zeros(),
            });
        }

        debug!("Generated {} synthetic vehicles", vehicles.len());

        Ok(Self {
            vehicles,
            rng,
            heading_noise,
            current: None,
            fail_at: None,
            closed: false,
        })
    }

    /// Makes `advance_step` fail when it would reach `step`.
    pub fn with_failure_at(mut self, step: u64) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn vehicles(&self) -> &[SyntheticVehicle] {
        &self.vehicles
    }

    pub fn current_step(&self) -> Option<u64> {
        self.current
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn find(&self, id: &VehicleId) -> Option<&SyntheticVehicle> {
        self.vehicles.iter().find(|v| &v.id == id)
    }
}

impl MobilitySource for SyntheticTraffic {
    fn active_node_ids(&self) -> Vec<VehicleId> {
        let Some(step) = self.current else {
            return Vec::new();
        };
        self.vehicles
            .iter()
            .filter(|v| v.is_active(step))
            .map(|v| v.id.clone())
            .collect()
    }

    fn position(&self, id: &VehicleId) -> Option<Position> {
        let step = self.current?;
        self.find(id)
            .filter(|v| v.is_active(step))
            .map(|v| v.position)
    }

    fn advance_step(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::unavailable("synthetic traffic is closed"));
        }

        let next = self.current.map_or(0, |step| step + 1);
        if self.fail_at == Some(next) {
            return Err(EnvError::unavailable(format!("injected failure at step {}", next)));
        }

        for vehicle in &mut self.vehicles {
            // Vehicles stand at their lane start on their departure step
            if vehicle.depart < next && next < vehicle.arrive {
                if let Some(noise) = &self.heading_noise {
                    let turn = Rotation2::new(noise.sample(&mut self.rng));
                    vehicle.velocity = turn * vehicle.velocity;
                }
                vehicle.position += vehicle.velocity;
            }
        }

        self.current = Some(next);
        Ok(())
    }

    fn remaining_expected_nodes(&self) -> usize {
        if self.closed {
            return 0;
        }
        match self.current {
            None => self.vehicles.iter().filter(|v| v.arrive > 0).count(),
            Some(step) => self.vehicles.iter().filter(|v| v.arrive > step + 1).count(),
        }
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::AlreadyClosed);
        }
        self.closed = true;
        debug!("Synthetic traffic closed");
        Ok(())
    }
}
