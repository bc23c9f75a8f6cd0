//! Live aircraft telemetry read by the manager's derived queries.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::geo::GeoPoint;

/// Read-side view of the simulated aircraft
pub trait Airplane: Send + Sync {
    fn position(&self) -> GeoPoint;

    fn ground_speed_knots(&self) -> f64;

    fn is_on_ground(&self) -> bool;

    /// Position of the waypoint the GPS is currently steering to, if any
    fn next_waypoint_position(&self) -> Option<GeoPoint>;
}

/// Snapshot of the values an [`Airplane`] reports
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AirplaneTelemetry {
    pub position: GeoPoint,
    pub ground_speed_knots: f64,
    pub on_ground: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_waypoint: Option<GeoPoint>,
}

/// Airplane whose telemetry is set directly (CLI, tests)
#[derive(Debug, Default)]
pub struct SimulatedAirplane {
    telemetry: RwLock<AirplaneTelemetry>,
}

impl SimulatedAirplane {
    pub fn new(telemetry: AirplaneTelemetry) -> Self {
        Self {
            telemetry: RwLock::new(telemetry),
        }
    }

    pub fn telemetry(&self) -> AirplaneTelemetry {
        *self.telemetry.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn update(&self, f: impl FnOnce(&mut AirplaneTelemetry)) {
        let mut telemetry = self.telemetry.write().unwrap_or_else(|e| e.into_inner());
        f(&mut telemetry);
    }
}

impl Airplane for SimulatedAirplane {
    fn position(&self) -> GeoPoint {
        self.telemetry().position
    }

    fn ground_speed_knots(&self) -> f64 {
        self.telemetry().ground_speed_knots
    }

    fn is_on_ground(&self) -> bool {
        self.telemetry().on_ground
    }

    fn next_waypoint_position(&self) -> Option<GeoPoint> {
        self.telemetry().next_waypoint
    }
}
