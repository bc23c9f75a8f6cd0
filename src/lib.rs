//! fpsync - flight plan synchronization between the instruments of a simulated cockpit
//!
//! Each instrument owns a [`manager::FlightPlanManager`]. Edits travel over a
//! [`sync::SyncHandler`] bus as request events; a single master instrument applies them
//! to the simulator through [`simulator::SimulatorInterface`] and confirms, after which
//! every instrument resyncs its copy of the active flight plan from the simulator.

pub mod airplane;
pub mod cockpit;
pub mod config;
pub mod console;
pub mod direct_to;
pub mod errors;
pub mod flight_plan;
pub mod geo;
pub mod log_format;
pub mod manager;
pub mod metrics;
pub mod navdata;
pub mod simulator;
pub mod sync;

pub use errors::{FlightPlanError, Result};
pub use manager::FlightPlanManager;
pub use sync::{SyncEvent, SyncHandler};
