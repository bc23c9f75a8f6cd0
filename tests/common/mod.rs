//! Common test utilities for cockpit integration tests
//!
//! [`Harness`] builds a master ("pfd") and a follower ("mfd") over an in-process
//! [`LocalTransport`] sharing one [`InMemorySimulator`], plus an observer on the same
//! bus that records every event it sees. The transport counts what is published, so
//! [`Harness::settle`] knows exactly how many events each instrument has to handle.
//!
//! # Usage
//!
//! ```no_run
//! use common::Harness;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let h = Harness::new().await;
//!     h.follower().set_active_origin_icao("KJFK").unwrap();
//!     h.settle().await;
//! }
//! ```

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use fpsync::airplane::AirplaneTelemetry;
use fpsync::cockpit::Cockpit;
use fpsync::geo::GeoPoint;
use fpsync::manager::FlightPlanManager;
use fpsync::navdata::NavDatabase;
use fpsync::simulator::InMemorySimulator;
use fpsync::sync::{Command, EventType, LocalTransport, SyncEvent, SyncHandler, SyncTransport};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The demo navdata shipped in `data/`
pub fn navdata() -> Arc<NavDatabase> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/navdata.toml");
    Arc::new(NavDatabase::load(&path).expect("Failed to load demo navdata"))
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {what}");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// [`LocalTransport`] that counts every message published on it
#[derive(Default)]
pub struct CountingTransport {
    inner: LocalTransport,
    published: AtomicU64,
}

impl CountingTransport {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTransport for CountingTransport {
    fn publish(&self, payload: Bytes) {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(payload);
    }

    async fn subscribe(&self) -> anyhow::Result<mpsc::UnboundedReceiver<Bytes>> {
        self.inner.subscribe().await
    }
}

pub struct Harness {
    pub cockpit: Cockpit,
    pub observer: Arc<SyncHandler>,
    transport: Arc<CountingTransport>,
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl Harness {
    /// Master "pfd" and follower "mfd", parked at KJFK
    pub async fn new() -> Self {
        Self::with_instruments(&[("pfd", true), ("mfd", false)]).await
    }

    pub async fn with_instruments(instruments: &[(&str, bool)]) -> Self {
        let transport = Arc::new(CountingTransport::default());
        let telemetry = AirplaneTelemetry {
            position: GeoPoint::new(40.6398, -73.7789),
            ground_speed_knots: 0.0,
            on_ground: true,
            next_waypoint: None,
        };
        let cockpit = Cockpit::build(
            navdata(),
            Arc::clone(&transport) as Arc<dyn SyncTransport>,
            instruments.iter().copied(),
            telemetry,
        )
        .await
        .expect("Failed to build cockpit");

        let observer = Arc::new(
            SyncHandler::new(Arc::clone(&transport) as Arc<dyn SyncTransport>)
                .await
                .expect("Failed to subscribe observer"),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        observer.add_listener(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            cockpit,
            observer,
            transport,
            events,
        }
    }

    pub fn sim(&self) -> &Arc<InMemorySimulator> {
        self.cockpit.simulator()
    }

    pub fn master(&self) -> &FlightPlanManager {
        self.cockpit.master().expect("no master instrument")
    }

    pub fn follower(&self) -> &FlightPlanManager {
        self.cockpit
            .managers()
            .iter()
            .find(|m| !m.is_master())
            .expect("no follower instrument")
    }

    /// Every event seen on the bus so far
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn confirmations(&self, event_type: EventType) -> Vec<SyncEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.command == Command::Confirmation && e.event_type() == event_type)
            .collect()
    }

    /// Every published event has reached the observer and been fully handled by every
    /// instrument. Instruments publish confirmations before marking the request
    /// handled, so nothing can still be on its way once this holds.
    fn quiescent(&self) -> bool {
        let published = self.transport.published();
        let seen = self.events.lock().unwrap().len() as u64;
        seen == published
            && self
                .cockpit
                .managers()
                .iter()
                .all(|m| !m.is_locked() && m.events_handled() == published)
    }

    /// Wait until every instrument has handled every event on the bus
    pub async fn settle(&self) {
        wait_until("instruments to settle", || self.quiescent()).await;
    }
}
