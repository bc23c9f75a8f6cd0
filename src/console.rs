//! Line-oriented cockpit console used by `fpsync run` and `fpsync script`.
//!
//! Every editing command is issued on the selected instrument, exactly as a pilot
//! pressing keys on that display would; the sync bus carries it to the master.

use anyhow::{Context, Result, anyhow, bail};
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;

use crate::cockpit::Cockpit;
use crate::flight_plan::Segment;
use crate::geo::{GeoPoint, radians_to_nm};
use crate::manager::FlightPlanManager;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Select the instrument subsequent commands are issued on
    On(String),
    /// `None` removes
    Origin(Option<String>),
    Destination(Option<String>),
    Departure(Option<(i32, i32, i32)>),
    Arrival(Option<(i32, i32, i32)>),
    Approach(Option<(i32, i32)>),
    Insert {
        icao: String,
        index: Option<usize>,
    },
    Airway {
        name: String,
        enter: String,
        exit: String,
        index: Option<usize>,
    },
    Remove(usize),
    Clear,
    ActivateApproach,
    DeactivateApproach,
    Leg(usize),
    /// Direct-to set on the simulator side, as the sim's own GPS would
    DirectTo(Option<String>),
    Telemetry {
        lat: f64,
        lon: f64,
        ground_speed_knots: f64,
        on_ground: bool,
    },
    Show(Option<String>),
    Status,
    Wait(Duration),
    Help,
}

fn parse<T: FromStr>(token: &str, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    token
        .parse()
        .map_err(|e| anyhow!("Invalid {what} '{token}': {e}"))
}

fn optional_ident(args: &[&str], usage: &str) -> Result<Option<String>> {
    match args {
        ["-"] => Ok(None),
        [icao] => Ok(Some(icao.to_uppercase())),
        _ => bail!("usage: {usage}"),
    }
}

fn optional_index(arg: Option<&&str>) -> Result<Option<usize>> {
    arg.map(|i| parse(i, "index")).transpose()
}

fn parse_bool(token: &str) -> Result<bool> {
    match token {
        "1" | "true" | "yes" | "ground" => Ok(true),
        "0" | "false" | "no" | "air" => Ok(false),
        _ => bail!("Invalid on-ground flag '{token}'"),
    }
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            bail!("Empty command");
        };

        let command = match (name, args) {
            ("on", [id]) => ConsoleCommand::On(id.to_string()),
            ("origin", _) => ConsoleCommand::Origin(optional_ident(args, "origin <ICAO|->")?),
            ("dest", _) => ConsoleCommand::Destination(optional_ident(args, "dest <ICAO|->")?),
            ("departure", ["-"]) => ConsoleCommand::Departure(None),
            ("departure", [p, e, r]) => ConsoleCommand::Departure(Some((
                parse(p, "procedure index")?,
                parse(e, "enroute transition index")?,
                parse(r, "runway transition index")?,
            ))),
            ("arrival", ["-"]) => ConsoleCommand::Arrival(None),
            ("arrival", [p, e, r]) => ConsoleCommand::Arrival(Some((
                parse(p, "procedure index")?,
                parse(e, "enroute transition index")?,
                parse(r, "runway transition index")?,
            ))),
            ("approach", ["-"]) => ConsoleCommand::Approach(None),
            ("approach", [p, t]) => ConsoleCommand::Approach(Some((
                parse(p, "procedure index")?,
                parse(t, "transition index")?,
            ))),
            ("insert", [icao, rest @ ..]) if rest.len() <= 1 => ConsoleCommand::Insert {
                icao: icao.to_uppercase(),
                index: optional_index(rest.first())?,
            },
            ("airway", [name, enter, exit, rest @ ..]) if rest.len() <= 1 => {
                ConsoleCommand::Airway {
                    name: name.to_uppercase(),
                    enter: enter.to_uppercase(),
                    exit: exit.to_uppercase(),
                    index: optional_index(rest.first())?,
                }
            }
            ("remove", [index]) => ConsoleCommand::Remove(parse(index, "index")?),
            ("clear", []) => ConsoleCommand::Clear,
            ("activate-approach", []) => ConsoleCommand::ActivateApproach,
            ("deactivate-approach", []) => ConsoleCommand::DeactivateApproach,
            ("leg", [index]) => ConsoleCommand::Leg(parse(index, "leg index")?),
            ("dto", _) => ConsoleCommand::DirectTo(optional_ident(args, "dto <ICAO|->")?),
            ("telemetry", [lat, lon, gs, ground]) => ConsoleCommand::Telemetry {
                lat: parse(lat, "latitude")?,
                lon: parse(lon, "longitude")?,
                ground_speed_knots: parse(gs, "ground speed")?,
                on_ground: parse_bool(ground)?,
            },
            ("show", []) => ConsoleCommand::Show(None),
            ("show", [id]) => ConsoleCommand::Show(Some(id.to_string())),
            ("status", []) => ConsoleCommand::Status,
            ("wait", [ms]) => ConsoleCommand::Wait(Duration::from_millis(parse(ms, "delay")?)),
            ("help", []) => ConsoleCommand::Help,
            _ => bail!("Unknown or malformed command '{}' (try 'help')", line.trim()),
        };
        Ok(command)
    }
}

pub const HELP: &str = "\
on <ID>                           select instrument
origin <ICAO|->                   set or remove origin
dest <ICAO|->                     set or remove destination
departure <p> <e> <r> | -         load or remove departure
arrival <p> <e> <r> | -           load or remove arrival
approach <p> <t> | -              load or remove approach
insert <ICAO> [idx]               insert enroute waypoint
airway <NAME> <ENTER> <EXIT> [idx] insert airway sequence
remove <idx>                      remove enroute element
clear                             clear the flight plan
activate-approach                 activate the loaded approach
deactivate-approach               deactivate the approach
leg <idx>                         set the active leg
dto <ICAO|->                      direct-to in the simulator
telemetry <lat> <lon> <gs> <gnd>  update the airplane
show [ID]                         show an instrument's active plan
status                            show every instrument
wait <ms>                         pause
";

/// Console state: the cockpit and the instrument commands are issued on
pub struct Console<'a> {
    cockpit: &'a Cockpit,
    selected: String,
}

impl<'a> Console<'a> {
    /// Starts on the master instrument
    pub fn new(cockpit: &'a Cockpit) -> Result<Self> {
        let selected = cockpit
            .master()
            .context("Cockpit has no master instrument")?
            .instrument_id()
            .to_string();
        Ok(Self { cockpit, selected })
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    fn manager(&self, id: &str) -> Result<&'a FlightPlanManager> {
        self.cockpit
            .manager(id)
            .with_context(|| format!("Unknown instrument '{id}'"))
    }

    /// Parse and run one input line; blank lines and `#` comments do nothing
    pub async fn execute_line(&mut self, line: &str) -> Result<String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(String::new());
        }
        let command: ConsoleCommand = line.parse()?;
        self.execute(command).await
    }

    /// Run one command and return what to print
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String> {
        let manager = self.manager(&self.selected)?;
        let segment = Segment::Enroute;

        match command {
            ConsoleCommand::On(id) => {
                self.manager(&id)?;
                self.selected = id;
                return Ok(format!("now on {}", self.selected));
            }
            ConsoleCommand::Origin(Some(icao)) => manager.set_active_origin_icao(&icao)?,
            ConsoleCommand::Origin(None) => manager.remove_active_origin()?,
            ConsoleCommand::Destination(Some(icao)) => manager.set_active_destination_icao(&icao)?,
            ConsoleCommand::Destination(None) => manager.remove_active_destination()?,
            ConsoleCommand::Departure(Some((p, e, r))) => manager.load_departure_to_active(p, e, r)?,
            ConsoleCommand::Departure(None) => manager.remove_departure_from_active()?,
            ConsoleCommand::Arrival(Some((p, e, r))) => manager.load_arrival_to_active(p, e, r)?,
            ConsoleCommand::Arrival(None) => manager.remove_arrival_from_active()?,
            ConsoleCommand::Approach(Some((p, t))) => manager.load_approach_to_active(p, t)?,
            ConsoleCommand::Approach(None) => manager.remove_approach_from_active()?,
            ConsoleCommand::Insert { icao, index } => {
                manager.add_waypoint_icao_to_active(segment, &icao, index)?
            }
            ConsoleCommand::Airway {
                name,
                enter,
                exit,
                index,
            } => manager.add_airway_sequence_to_active(segment, &name, &enter, &exit, index)?,
            ConsoleCommand::Remove(index) => manager.remove_from_active(segment, index)?,
            ConsoleCommand::Clear => manager.clear_active_plan()?,
            ConsoleCommand::ActivateApproach => manager.activate_approach().await?,
            ConsoleCommand::DeactivateApproach => manager.deactivate_approach().await?,
            ConsoleCommand::Leg(index) => manager.set_active_leg(index).await?,
            ConsoleCommand::DirectTo(target) => {
                self.cockpit.simulator().set_direct_to(target.as_deref())?;
                self.cockpit.resync_all(false).await;
            }
            ConsoleCommand::Telemetry {
                lat,
                lon,
                ground_speed_knots,
                on_ground,
            } => self.cockpit.airplane().update(|t| {
                t.position = GeoPoint::new(lat, lon);
                t.ground_speed_knots = ground_speed_knots;
                t.on_ground = on_ground;
            }),
            ConsoleCommand::Show(id) => {
                let id = id.unwrap_or_else(|| self.selected.clone());
                return Ok(describe(self.manager(&id)?).await);
            }
            ConsoleCommand::Status => return Ok(self.status()),
            ConsoleCommand::Wait(delay) => tokio::time::sleep(delay).await,
            ConsoleCommand::Help => return Ok(HELP.to_string()),
        }
        Ok(String::new())
    }

    fn status(&self) -> String {
        let mut out = String::new();
        for m in self.cockpit.managers() {
            let _ = writeln!(
                out,
                "{:<8} {:<8} legs={:<3} locked={:<5} dropped={} handled={} synced={}",
                m.instrument_id(),
                if m.is_master() { "master" } else { "follower" },
                m.active_plan().leg_count(),
                m.is_locked(),
                m.dropped_requests(),
                m.events_handled(),
                m.last_active_sync_time()
                    .map(|t| t.format("%H:%M:%S%.3f").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            );
        }
        out
    }
}

fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
        }
        None => "--:--:--".to_string(),
    }
}

fn format_nm(distance: Option<f64>) -> String {
    distance
        .map(|d| format!("{d:.1} nm"))
        .unwrap_or_else(|| "-".to_string())
}

/// Active plan and derived values as the instrument currently sees them
pub async fn describe(manager: &FlightPlanManager) -> String {
    let plan = manager.active_plan();
    let active_index = manager.active_leg_index_cached();
    let mut out = String::new();

    let _ = writeln!(out, "[{}] {}", manager.instrument_id(), plan);
    for (i, leg) in plan.legs().enumerate() {
        let marker = if Some(i) == active_index { ">" } else { " " };
        let _ = writeln!(
            out,
            "{marker} {i:>2} {:<8} {:<11} {:>7.1} nm",
            leg.fix.ident,
            leg.segment.to_string(),
            radians_to_nm(leg.cumulative_distance)
        );
    }

    if let Some(target) = manager.direct_to().destination() {
        let _ = writeln!(
            out,
            "direct-to {}: {} ete {}",
            target.ident,
            format_nm(manager.distance_to_direct_to().await),
            format_duration(manager.time_to_direct_to().await)
        );
    }
    let _ = writeln!(
        out,
        "active leg fix: {} ete {}",
        format_nm(manager.distance_to_active_leg_fix().await),
        format_duration(manager.time_to_active_leg_fix().await)
    );
    let _ = writeln!(
        out,
        "destination: {} ete {}",
        format_nm(manager.distance_to_destination().await),
        format_duration(manager.time_to_destination().await)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit_commands() {
        assert_eq!(
            "origin kjfk".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Origin(Some("KJFK".to_string()))
        );
        assert_eq!(
            "dest -".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Destination(None)
        );
        assert_eq!(
            "departure 0 -1 1".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Departure(Some((0, -1, 1)))
        );
        assert_eq!(
            "approach 2 0".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Approach(Some((2, 0)))
        );
        assert_eq!(
            "insert MERIT".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Insert {
                icao: "MERIT".to_string(),
                index: None
            }
        );
        assert_eq!(
            "airway j75 deezz merit 1".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Airway {
                name: "J75".to_string(),
                enter: "DEEZZ".to_string(),
                exit: "MERIT".to_string(),
                index: Some(1)
            }
        );
    }

    #[test]
    fn test_parse_cockpit_commands() {
        assert_eq!(
            "  on   mfd ".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::On("mfd".to_string())
        );
        assert_eq!(
            "telemetry 40.5 -73.2 250 air"
                .parse::<ConsoleCommand>()
                .unwrap(),
            ConsoleCommand::Telemetry {
                lat: 40.5,
                lon: -73.2,
                ground_speed_knots: 250.0,
                on_ground: false
            }
        );
        assert_eq!(
            "wait 150".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Wait(Duration::from_millis(150))
        );
        assert_eq!(
            "show".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Show(None)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("departure 0 1".parse::<ConsoleCommand>().is_err());
        assert!("remove x".parse::<ConsoleCommand>().is_err());
        assert!("insert A B C".parse::<ConsoleCommand>().is_err());
        assert!("telemetry 1 2 3 maybe".parse::<ConsoleCommand>().is_err());
        assert!("fly".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(None), "--:--:--");
        assert_eq!(
            format_duration(Some(Duration::from_secs(3725))),
            "01:02:05"
        );
    }
}
