//! The simulator's authoritative flight plan engine, as seen by a manager.
//!
//! Only the master manager calls the mutating half of [`SimulatorInterface`]; every
//! manager calls the read side ([`SimulatorInterface::sync_from_game`] and
//! [`SimulatorInterface::get_active_leg`]) to resync.

mod memory;

pub use memory::{InMemorySimulator, SimCall};

use anyhow::Result;
use async_trait::async_trait;

use crate::flight_plan::{AirwaySequence, FlightPlanLeg};
use crate::geo::GeoPoint;
use crate::navdata::Waypoint;

/// A leg as the simulator reports it
#[derive(Debug, Clone, PartialEq)]
pub struct GameLeg {
    pub fix: Waypoint,
    /// Intermediate path points before the fix (turns, arcs)
    pub path: Vec<GeoPoint>,
}

impl GameLeg {
    pub fn direct(fix: Waypoint) -> Self {
        Self {
            fix,
            path: Vec::new(),
        }
    }
}

/// A loaded procedure as the simulator reports it
#[derive(Debug, Clone, PartialEq)]
pub struct GameProcedure {
    pub name: String,
    pub procedure_index: i32,
    pub transition_index: i32,
    pub runway_transition_index: i32,
    pub legs: Vec<GameLeg>,
}

/// Snapshot of the simulator's flight plan and direct-to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameFlightPlan {
    pub origin: Option<Waypoint>,
    pub departure: Option<GameProcedure>,
    pub enroute: Vec<GameLeg>,
    pub arrival: Option<GameProcedure>,
    pub approach: Option<GameProcedure>,
    pub destination: Option<Waypoint>,
    pub direct_to: Option<Waypoint>,
}

impl GameFlightPlan {
    /// Number of legs preceding the approach, in the same order a local plan flattens them
    pub fn legs_before_approach(&self) -> usize {
        usize::from(self.origin.is_some())
            + self.departure.as_ref().map_or(0, |p| p.legs.len())
            + self.enroute.len()
            + self.arrival.as_ref().map_or(0, |p| p.legs.len())
    }

    pub fn leg_count(&self) -> usize {
        self.legs_before_approach()
            + self.approach.as_ref().map_or(0, |p| p.legs.len())
            + usize::from(self.destination.is_some())
    }
}

#[async_trait]
pub trait SimulatorInterface: Send + Sync {
    async fn set_origin(&self, icao: &str) -> Result<()>;

    async fn remove_origin(&self) -> Result<()>;

    async fn set_destination(&self, icao: &str) -> Result<()>;

    async fn remove_destination(&self) -> Result<()>;

    async fn load_departure(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()>;

    async fn remove_departure(&self) -> Result<()>;

    async fn load_arrival(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()>;

    async fn remove_arrival(&self) -> Result<()>;

    async fn load_approach(&self, procedure_index: i32, transition_index: i32) -> Result<()>;

    async fn remove_approach(&self) -> Result<()>;

    /// Insert `leg` into the simulator's enroute list at `enroute_leg_index`
    async fn sync_enroute_leg(&self, leg: &FlightPlanLeg, enroute_leg_index: usize) -> Result<()>;

    /// Insert every leg of `sequence` starting at `enroute_leg_index`
    async fn sync_enroute_airway_sequence(
        &self,
        sequence: &AirwaySequence,
        enroute_leg_index: usize,
    ) -> Result<()>;

    async fn remove_leg(&self, leg: &FlightPlanLeg, enroute_leg_index: usize) -> Result<()>;

    async fn remove_airway_sequence(
        &self,
        sequence: &AirwaySequence,
        enroute_leg_index: usize,
    ) -> Result<()>;

    async fn clear_flight_plan(&self) -> Result<()>;

    async fn activate_approach(&self) -> Result<()>;

    async fn deactivate_approach(&self) -> Result<()>;

    /// Make the leg at `leg_index` (flight order, all segments) the active leg
    async fn set_active_leg(&self, leg_index: usize) -> Result<()>;

    async fn sync_from_game(&self) -> Result<GameFlightPlan>;

    /// Index of the active leg in flight order, if any
    async fn get_active_leg(&self) -> Result<Option<usize>>;
}
