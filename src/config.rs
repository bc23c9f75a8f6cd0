//! Cockpit configuration: which sync transport to use, where the navdata lives,
//! which instruments exist and which of them is the master.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::airplane::AirplaneTelemetry;
use crate::geo::GeoPoint;

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process broadcast channel, for a single-process cockpit
    #[default]
    Local,
    Nats,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Nats => write!(f, "nats"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: String,
    #[serde(default)]
    pub master: bool,
}

/// Initial airplane state, flattened for the TOML file
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TomlAirplane {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ground_speed_knots: f64,
    #[serde(default = "default_on_ground")]
    pub on_ground: bool,
}

fn default_on_ground() -> bool {
    true
}

impl From<TomlAirplane> for AirplaneTelemetry {
    fn from(t: TomlAirplane) -> Self {
        AirplaneTelemetry {
            position: GeoPoint::new(t.lat, t.lon),
            ground_speed_knots: t.ground_speed_knots,
            on_ground: t.on_ground,
            next_waypoint: None,
        }
    }
}

/// Top-level config file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpsyncConfigFile {
    #[serde(default)]
    pub transport: TransportKind,
    /// Falls back to `NATS_URL`, then [`DEFAULT_NATS_URL`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nats_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_prefix: Option<String>,
    /// Relative paths are resolved against the config file's directory
    pub navdata: PathBuf,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub airplane: TomlAirplane,
}

impl FpsyncConfigFile {
    /// Load and validate config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let mut config: FpsyncConfigFile =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate().with_context(|| format!("Invalid config {:?}", path))?;

        if config.navdata.is_relative()
            && let Some(dir) = path.parent()
        {
            config.navdata = dir.join(&config.navdata);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
    }

    /// Exactly one master, at least one instrument, ids unique and non-empty
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            bail!("No instruments configured");
        }

        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                bail!("Instrument id must not be empty");
            }
            if !seen.insert(instrument.id.as_str()) {
                bail!("Duplicate instrument id '{}'", instrument.id);
            }
        }

        let masters: Vec<&str> = self
            .instruments
            .iter()
            .filter(|i| i.master)
            .map(|i| i.id.as_str())
            .collect();
        match masters.len() {
            1 => Ok(()),
            0 => bail!("No master instrument configured"),
            _ => bail!("More than one master instrument: {}", masters.join(", ")),
        }
    }

    pub fn master_id(&self) -> Option<&str> {
        self.instruments
            .iter()
            .find(|i| i.master)
            .map(|i| i.id.as_str())
    }

    pub fn nats_url(&self) -> String {
        self.nats_url
            .clone()
            .or_else(|| std::env::var("NATS_URL").ok())
            .unwrap_or_else(|| DEFAULT_NATS_URL.to_string())
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` argument
/// 2. `FPSYNC_CONFIG` env var
/// 3. `./fpsync.toml`
pub fn config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var("FPSYNC_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("./fpsync.toml")
}
