//! Cross-instrument sync bus.
//!
//! Instruments share no memory; the only thing passed between them is the encoded
//! [`SyncEvent`], broadcast on a channel keyed by [`FLIGHT_PLAN_SYNC_KEY`].

pub mod event;
mod handler;
pub mod transport;

pub use event::{Command, EventType, SyncEvent, SyncPayload};
pub use handler::{ListenerId, SyncHandler};
pub use transport::{LocalTransport, NatsTransport, SyncTransport};

/// Channel key shared by every instrument (the NATS subject, before any prefix)
pub const FLIGHT_PLAN_SYNC_KEY: &str = "flightplan.sync";

/// Channel key under an optional environment prefix, e.g. `staging.flightplan.sync`
pub fn sync_subject(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_end_matches('.')) {
        Some(p) if !p.is_empty() => format!("{p}.{FLIGHT_PLAN_SYNC_KEY}"),
        _ => FLIGHT_PLAN_SYNC_KEY.to_string(),
    }
}
