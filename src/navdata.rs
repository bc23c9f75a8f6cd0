//! Navigation data: waypoints, airways and airport procedures keyed by ICAO.
//!
//! The flight plan manager never builds waypoints itself; it asks a [`WaypointSource`]
//! to resolve the ICAO strings carried by sync events. [`NavDatabase`] is the in-memory
//! implementation used by the simulator and the CLI, loadable from a TOML file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointKind {
    Airport,
    Vor,
    Ndb,
    Intersection,
    User,
}

/// A named transition into or out of a procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    pub fixes: Vec<String>,
}

/// A departure, arrival or approach procedure
///
/// `transitions` are the enroute transitions of a departure/arrival, or the
/// approach transitions of an approach. `runway_transitions` are unused for approaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub fixes: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub runway_transitions: Vec<Transition>,
}

/// Procedures published for an airport
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AirportProcedures {
    #[serde(default)]
    pub departures: Vec<Procedure>,
    #[serde(default)]
    pub arrivals: Vec<Procedure>,
    #[serde(default)]
    pub approaches: Vec<Procedure>,
}

#[derive(Debug, Clone)]
pub struct Waypoint {
    pub icao: String,
    pub ident: String,
    pub kind: WaypointKind,
    pub location: GeoPoint,
    /// Names of the airways this waypoint lies on
    pub airways: Vec<String>,
    /// Only present for airports
    pub procedures: Option<AirportProcedures>,
}

/// Waypoints are identified by ICAO alone
impl PartialEq for Waypoint {
    fn eq(&self, other: &Self) -> bool {
        self.icao == other.icao
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident)
    }
}

impl Waypoint {
    pub fn new(icao: &str, kind: WaypointKind, location: GeoPoint) -> Self {
        Self {
            icao: icao.to_string(),
            ident: icao.to_string(),
            kind,
            location,
            airways: Vec::new(),
            procedures: if kind == WaypointKind::Airport {
                Some(AirportProcedures::default())
            } else {
                None
            },
        }
    }

    pub fn airport(icao: &str, lat: f64, lon: f64) -> Self {
        Self::new(icao, WaypointKind::Airport, GeoPoint::new(lat, lon))
    }

    pub fn intersection(icao: &str, lat: f64, lon: f64) -> Self {
        Self::new(icao, WaypointKind::Intersection, GeoPoint::new(lat, lon))
    }

    pub fn with_procedures(mut self, procedures: AirportProcedures) -> Self {
        self.procedures = Some(procedures);
        self
    }

    pub fn is_airport(&self) -> bool {
        self.kind == WaypointKind::Airport
    }

    pub fn departures(&self) -> &[Procedure] {
        self.procedures
            .as_ref()
            .map(|p| p.departures.as_slice())
            .unwrap_or_default()
    }

    pub fn arrivals(&self) -> &[Procedure] {
        self.procedures
            .as_ref()
            .map(|p| p.arrivals.as_slice())
            .unwrap_or_default()
    }

    pub fn approaches(&self) -> &[Procedure] {
        self.procedures
            .as_ref()
            .map(|p| p.approaches.as_slice())
            .unwrap_or_default()
    }

    pub fn is_on_airway(&self, name: &str) -> bool {
        self.airways.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airway {
    pub name: String,
    /// Fix ICAOs in published order
    pub fixes: Vec<String>,
}

impl Airway {
    /// Fixes flown when joining at `enter` and leaving at `exit`, excluding the entry
    /// fix and including the exit fix. Works in either direction along the airway.
    pub fn path_between(&self, enter: &str, exit: &str) -> Option<Vec<String>> {
        let from = self.fixes.iter().position(|f| f == enter)?;
        let to = self.fixes.iter().position(|f| f == exit)?;
        if from == to {
            return None;
        }

        let path = if from < to {
            self.fixes[from + 1..=to].to_vec()
        } else {
            self.fixes[to..from].iter().rev().cloned().collect()
        };
        Some(path)
    }
}

/// Resolves ICAO strings and airway names to navigation data
#[async_trait]
pub trait WaypointSource: Send + Sync {
    async fn get_waypoint(&self, icao: &str) -> Result<Waypoint>;

    async fn get_airway(&self, name: &str) -> Result<Airway>;
}

/// Waypoint entry in the navdata TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlWaypoint {
    pub icao: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    pub kind: WaypointKind,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub airways: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedures: Option<AirportProcedures>,
}

impl From<TomlWaypoint> for Waypoint {
    fn from(t: TomlWaypoint) -> Self {
        let mut waypoint = Waypoint::new(&t.icao, t.kind, GeoPoint::new(t.lat, t.lon));
        if let Some(ident) = t.ident {
            waypoint.ident = ident;
        }
        waypoint.airways = t.airways;
        if t.procedures.is_some() {
            waypoint.procedures = t.procedures;
        }
        waypoint
    }
}

/// Top-level navdata file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavDataFile {
    #[serde(default)]
    pub waypoints: Vec<TomlWaypoint>,
    #[serde(default)]
    pub airways: Vec<Airway>,
}

/// In-memory navigation database
#[derive(Debug, Clone, Default)]
pub struct NavDatabase {
    waypoints: HashMap<String, Waypoint>,
    airways: HashMap<String, Airway>,
}

impl NavDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load navdata from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let db = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        info!(
            "Loaded {} waypoints and {} airways from {}",
            db.waypoints.len(),
            db.airways.len(),
            path.display()
        );
        Ok(db)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: NavDataFile = toml::from_str(contents)?;
        let mut db = Self::new();
        for waypoint in file.waypoints {
            db.add_waypoint(waypoint.into());
        }
        for airway in file.airways {
            db.add_airway(airway);
        }
        Ok(db)
    }

    pub fn add_waypoint(&mut self, waypoint: Waypoint) -> &mut Self {
        self.waypoints.insert(waypoint.icao.clone(), waypoint);
        self
    }

    pub fn add_airway(&mut self, airway: Airway) -> &mut Self {
        self.airways.insert(airway.name.clone(), airway);
        self
    }

    pub fn waypoint(&self, icao: &str) -> Option<&Waypoint> {
        self.waypoints.get(icao)
    }

    pub fn airway(&self, name: &str) -> Option<&Airway> {
        self.airways.get(name)
    }

    /// Resolve a list of fix ICAOs, failing on the first unknown one
    pub fn resolve_all(&self, icaos: &[String]) -> Result<Vec<Waypoint>> {
        icaos
            .iter()
            .map(|icao| {
                self.waypoint(icao)
                    .cloned()
                    .with_context(|| format!("Unknown waypoint {icao}"))
            })
            .collect()
    }
}

#[async_trait]
impl WaypointSource for NavDatabase {
    async fn get_waypoint(&self, icao: &str) -> Result<Waypoint> {
        self.waypoint(icao)
            .cloned()
            .with_context(|| format!("Unknown waypoint {icao}"))
    }

    async fn get_airway(&self, name: &str) -> Result<Airway> {
        self.airway(name)
            .cloned()
            .with_context(|| format!("Unknown airway {name}"))
    }
}
