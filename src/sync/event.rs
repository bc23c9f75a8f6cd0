//! Sync events and their JSON wire form.
//!
//! On the wire an event is a flat JSON object:
//!
//! ```json
//! {"sourceID":"mfd","command":0,"type":4,"airwayName":"J5","enterICAO":"SEA","exitICAO":"BTG","index":2}
//! ```
//!
//! `command` and `type` are integers, payload fields are present only for the event
//! types that use them, and unknown fields are ignored on receipt.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{FlightPlanError, Result, malformed_event};

/// Whether an event asks the master to act or reports that it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Request = 0,
    Confirmation = 1,
}

impl TryFrom<u8> for Command {
    type Error = FlightPlanError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Command::Request),
            1 => Ok(Command::Confirmation),
            other => Err(malformed_event(format!("unknown command {other}"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Request => write!(f, "REQUEST"),
            Command::Confirmation => write!(f, "CONFIRMATION"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SetOrigin = 0,
    SetDestination = 1,
    SetDeparture = 2,
    EnrouteInsertWaypoint = 3,
    EnrouteInsertAirway = 4,
    EnrouteRemoveIndex = 5,
    SetArrival = 6,
    SetApproach = 7,
    ClearFlightPlan = 8,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::SetOrigin,
        EventType::SetDestination,
        EventType::SetDeparture,
        EventType::EnrouteInsertWaypoint,
        EventType::EnrouteInsertAirway,
        EventType::EnrouteRemoveIndex,
        EventType::SetArrival,
        EventType::SetApproach,
        EventType::ClearFlightPlan,
    ];

    /// Name used in logs and as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SetOrigin => "set_origin",
            EventType::SetDestination => "set_destination",
            EventType::SetDeparture => "set_departure",
            EventType::EnrouteInsertWaypoint => "enroute_insert_waypoint",
            EventType::EnrouteInsertAirway => "enroute_insert_airway",
            EventType::EnrouteRemoveIndex => "enroute_remove_index",
            EventType::SetArrival => "set_arrival",
            EventType::SetApproach => "set_approach",
            EventType::ClearFlightPlan => "clear_flight_plan",
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = FlightPlanError;

    fn try_from(value: u8) -> Result<Self> {
        EventType::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| malformed_event(format!("unknown event type {value}")))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation carried by an event, with the fields its type requires.
///
/// An empty `icao` on `SetOrigin`/`SetDestination`, or a negative `procedure_index`
/// on a procedure event, requests removal.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPayload {
    SetOrigin {
        icao: String,
    },
    SetDestination {
        icao: String,
    },
    SetDeparture {
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    },
    EnrouteInsertWaypoint {
        icao: String,
        /// Enroute element index; `None` appends
        index: Option<usize>,
    },
    EnrouteInsertAirway {
        airway_name: String,
        enter_icao: String,
        exit_icao: String,
        index: Option<usize>,
    },
    EnrouteRemoveIndex {
        index: usize,
    },
    SetArrival {
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    },
    SetApproach {
        procedure_index: i32,
        transition_index: i32,
    },
    ClearFlightPlan,
}

impl SyncPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            SyncPayload::SetOrigin { .. } => EventType::SetOrigin,
            SyncPayload::SetDestination { .. } => EventType::SetDestination,
            SyncPayload::SetDeparture { .. } => EventType::SetDeparture,
            SyncPayload::EnrouteInsertWaypoint { .. } => EventType::EnrouteInsertWaypoint,
            SyncPayload::EnrouteInsertAirway { .. } => EventType::EnrouteInsertAirway,
            SyncPayload::EnrouteRemoveIndex { .. } => EventType::EnrouteRemoveIndex,
            SyncPayload::SetArrival { .. } => EventType::SetArrival,
            SyncPayload::SetApproach { .. } => EventType::SetApproach,
            SyncPayload::ClearFlightPlan => EventType::ClearFlightPlan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub struct SyncEvent {
    /// Instrument that fired the event
    pub source_id: String,
    pub command: Command,
    pub payload: SyncPayload,
}

impl SyncEvent {
    pub fn request(source_id: impl Into<String>, payload: SyncPayload) -> Self {
        Self {
            source_id: source_id.into(),
            command: Command::Request,
            payload,
        }
    }

    /// Confirmation of this event's operation, sent by `source_id`
    pub fn confirm(&self, source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            command: Command::Confirmation,
            payload: self.payload.clone(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: WireEvent = serde_json::from_slice(bytes).map_err(malformed_event)?;
        SyncEvent::try_from(wire)
    }
}

/// Flat JSON representation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "sourceID")]
    source_id: String,
    command: u8,
    #[serde(rename = "type")]
    event_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icao: Option<String>,
    #[serde(
        rename = "airwayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    airway_name: Option<String>,
    #[serde(rename = "enterICAO", default, skip_serializing_if = "Option::is_none")]
    enter_icao: Option<String>,
    #[serde(rename = "exitICAO", default, skip_serializing_if = "Option::is_none")]
    exit_icao: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(
        rename = "procedureIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    procedure_index: Option<i32>,
    #[serde(
        rename = "enrouteTransitionIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    enroute_transition_index: Option<i32>,
    #[serde(
        rename = "runwayTransitionIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    runway_transition_index: Option<i32>,
    #[serde(
        rename = "transitionIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    transition_index: Option<i32>,
}

fn required<T>(value: Option<T>, field: &str, event_type: EventType) -> Result<T> {
    value.ok_or_else(|| malformed_event(format!("{event_type} event without {field}")))
}

impl From<SyncEvent> for WireEvent {
    fn from(event: SyncEvent) -> Self {
        let mut wire = WireEvent {
            source_id: event.source_id,
            command: event.command as u8,
            event_type: event.payload.event_type() as u8,
            ..Default::default()
        };

        match event.payload {
            SyncPayload::SetOrigin { icao } | SyncPayload::SetDestination { icao } => {
                wire.icao = Some(icao);
            }
            SyncPayload::SetDeparture {
                procedure_index,
                enroute_transition_index,
                runway_transition_index,
            }
            | SyncPayload::SetArrival {
                procedure_index,
                enroute_transition_index,
                runway_transition_index,
            } => {
                wire.procedure_index = Some(procedure_index);
                wire.enroute_transition_index = Some(enroute_transition_index);
                wire.runway_transition_index = Some(runway_transition_index);
            }
            SyncPayload::EnrouteInsertWaypoint { icao, index } => {
                wire.icao = Some(icao);
                wire.index = index;
            }
            SyncPayload::EnrouteInsertAirway {
                airway_name,
                enter_icao,
                exit_icao,
                index,
            } => {
                wire.airway_name = Some(airway_name);
                wire.enter_icao = Some(enter_icao);
                wire.exit_icao = Some(exit_icao);
                wire.index = index;
            }
            SyncPayload::EnrouteRemoveIndex { index } => {
                wire.index = Some(index);
            }
            SyncPayload::SetApproach {
                procedure_index,
                transition_index,
            } => {
                wire.procedure_index = Some(procedure_index);
                wire.transition_index = Some(transition_index);
            }
            SyncPayload::ClearFlightPlan => {}
        }

        wire
    }
}

impl TryFrom<WireEvent> for SyncEvent {
    type Error = FlightPlanError;

    fn try_from(wire: WireEvent) -> Result<Self> {
        let command = Command::try_from(wire.command)?;
        let event_type = EventType::try_from(wire.event_type)?;

        let payload = match event_type {
            EventType::SetOrigin => SyncPayload::SetOrigin {
                icao: required(wire.icao, "icao", event_type)?,
            },
            EventType::SetDestination => SyncPayload::SetDestination {
                icao: required(wire.icao, "icao", event_type)?,
            },
            EventType::SetDeparture => SyncPayload::SetDeparture {
                procedure_index: required(wire.procedure_index, "procedureIndex", event_type)?,
                enroute_transition_index: wire.enroute_transition_index.unwrap_or(-1),
                runway_transition_index: wire.runway_transition_index.unwrap_or(-1),
            },
            EventType::EnrouteInsertWaypoint => SyncPayload::EnrouteInsertWaypoint {
                icao: required(wire.icao, "icao", event_type)?,
                index: wire.index,
            },
            EventType::EnrouteInsertAirway => SyncPayload::EnrouteInsertAirway {
                airway_name: required(wire.airway_name, "airwayName", event_type)?,
                enter_icao: required(wire.enter_icao, "enterICAO", event_type)?,
                exit_icao: required(wire.exit_icao, "exitICAO", event_type)?,
                index: wire.index,
            },
            EventType::EnrouteRemoveIndex => SyncPayload::EnrouteRemoveIndex {
                index: required(wire.index, "index", event_type)?,
            },
            EventType::SetArrival => SyncPayload::SetArrival {
                procedure_index: required(wire.procedure_index, "procedureIndex", event_type)?,
                enroute_transition_index: wire.enroute_transition_index.unwrap_or(-1),
                runway_transition_index: wire.runway_transition_index.unwrap_or(-1),
            },
            EventType::SetApproach => SyncPayload::SetApproach {
                procedure_index: required(wire.procedure_index, "procedureIndex", event_type)?,
                transition_index: wire.transition_index.unwrap_or(-1),
            },
            EventType::ClearFlightPlan => SyncPayload::ClearFlightPlan,
        };

        Ok(SyncEvent {
            source_id: wire.source_id,
            command,
            payload,
        })
    }
}
