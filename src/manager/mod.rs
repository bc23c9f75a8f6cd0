//! Per-instrument flight plan manager.
//!
//! Every instrument owns one [`FlightPlanManager`] holding its own active and standby
//! plans and direct-to. Exactly one manager in a cockpit is the master: it is the only
//! one that mutates the simulator. Edits made on any instrument travel over the sync bus
//! as REQUEST events; the master applies them to the simulator and answers with a
//! CONFIRMATION, and every manager then resyncs its active plan from the simulator.

mod commands;
mod queries;
mod saga;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::airplane::Airplane;
use crate::direct_to::DirectTo;
use crate::errors::Result;
use crate::flight_plan::FlightPlan;
use crate::navdata::WaypointSource;
use crate::simulator::SimulatorInterface;
use crate::sync::{Command, ListenerId, SyncEvent, SyncHandler};

/// Everything a manager reads when answering queries, replaced or edited under one lock
#[derive(Debug, Default)]
pub(crate) struct PlanState {
    pub(crate) active: FlightPlan,
    pub(crate) standby: FlightPlan,
    pub(crate) direct_to: DirectTo,
    /// Index into `active.legs()` reported by the simulator at the last resync
    pub(crate) active_leg_cached: Option<usize>,
    pub(crate) last_active_sync_time: Option<DateTime<Utc>>,
}

pub(crate) struct ManagerInner {
    instrument_id: String,
    is_master: bool,
    sync: Arc<SyncHandler>,
    simulator: Arc<dyn SimulatorInterface>,
    waypoints: Arc<dyn WaypointSource>,
    airplane: Arc<dyn Airplane>,
    state: RwLock<PlanState>,
    is_locked: AtomicBool,
    dropped_requests: AtomicU64,
    events_handled: AtomicU64,
    /// Confirmations waiting for the replication worker, in delivery order
    replication: mpsc::UnboundedSender<SyncEvent>,
    listener: OnceLock<ListenerId>,
}

impl ManagerInner {
    fn read_state(&self) -> RwLockReadGuard<'_, PlanState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PlanState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.get() {
            self.sync.remove_listener(*id);
        }
    }
}

/// Held while a master mutation sequence is in flight; releases the lock on drop.
///
/// Owned so it can be claimed on the dispatch task and moved into the task that
/// performs the mutation.
struct MutationLock {
    inner: Arc<ManagerInner>,
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        self.inner.is_locked.store(false, Ordering::Release);
    }
}

/// Handle to one instrument's flight plan manager. Clones share the same manager.
#[derive(Clone)]
pub struct FlightPlanManager {
    inner: Arc<ManagerInner>,
}

impl FlightPlanManager {
    /// Create a manager and subscribe it to `sync`.
    ///
    /// Received events are sorted on the sync handler's dispatch task, in delivery
    /// order: a master claims its mutation lock there and runs the request on its own
    /// task, a follower queues the confirmation for a single replication worker. Must
    /// be called from within a tokio runtime. The subscription ends when the last
    /// handle is dropped.
    pub fn new(
        instrument_id: impl Into<String>,
        is_master: bool,
        sync: Arc<SyncHandler>,
        simulator: Arc<dyn SimulatorInterface>,
        waypoints: Arc<dyn WaypointSource>,
        airplane: Arc<dyn Airplane>,
    ) -> Self {
        let (replication, replication_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            instrument_id: instrument_id.into(),
            is_master,
            sync: Arc::clone(&sync),
            simulator,
            waypoints,
            airplane,
            state: RwLock::new(PlanState::default()),
            is_locked: AtomicBool::new(false),
            dropped_requests: AtomicU64::new(0),
            events_handled: AtomicU64::new(0),
            replication,
            listener: OnceLock::new(),
        });

        tokio::spawn(replication_worker(Arc::downgrade(&inner), replication_rx));

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let id = sync.add_listener(move |event| {
            if let Some(inner) = weak.upgrade() {
                FlightPlanManager { inner }.dispatch(event);
            }
        });
        let _ = inner.listener.set(id);

        info!(
            instrument = %inner.instrument_id,
            "Flight plan manager started as {}",
            if is_master { "master" } else { "follower" }
        );
        Self { inner }
    }

    pub fn instrument_id(&self) -> &str {
        &self.inner.instrument_id
    }

    pub fn is_master(&self) -> bool {
        self.inner.is_master
    }

    /// Whether a master mutation sequence is in flight
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked.load(Ordering::Acquire)
    }

    /// Requests dropped because they arrived while locked
    pub fn dropped_requests(&self) -> u64 {
        self.inner.dropped_requests.load(Ordering::Relaxed)
    }

    /// Sync events fully processed by this manager, ignored ones included
    pub fn events_handled(&self) -> u64 {
        self.inner.events_handled.load(Ordering::Acquire)
    }

    /// Copy of the active flight plan
    pub fn active_plan(&self) -> FlightPlan {
        self.inner.read_state().active.clone()
    }

    pub fn standby_plan(&self) -> FlightPlan {
        self.inner.read_state().standby.clone()
    }

    /// Edit the standby plan in place; it is never shared with the active plan
    pub fn edit_standby<R>(&self, edit: impl FnOnce(&mut FlightPlan) -> R) -> R {
        edit(&mut self.inner.write_state().standby)
    }

    pub fn direct_to(&self) -> DirectTo {
        self.inner.read_state().direct_to.clone()
    }

    pub fn last_active_sync_time(&self) -> Option<DateTime<Utc>> {
        self.inner.read_state().last_active_sync_time
    }

    /// Replace the active plan and direct-to from the simulator.
    ///
    /// The enroute segment keeps its local airway structure unless
    /// `force_enroute_sync` is set or its fixes disagree with the simulator's.
    pub async fn sync_active_from_game(&self, force_enroute_sync: bool) -> Result<()> {
        self.inner.write_state().last_active_sync_time = Some(Utc::now());

        let game = self.inner.simulator.sync_from_game().await?;
        let active_leg = self.inner.simulator.get_active_leg().await?;

        let mut state = self.inner.write_state();
        let replaced = state.active.apply_game_snapshot(&game, force_enroute_sync);
        state.direct_to.set(game.direct_to);
        let leg_count = state.active.leg_count();
        state.active_leg_cached = active_leg.filter(|i| *i < leg_count);

        metrics::counter!("flightplan.manager.resyncs_total").increment(1);
        debug!(
            instrument = %self.inner.instrument_id,
            enroute_replaced = replaced,
            "Resynced active plan: {}",
            state.active
        );
        Ok(())
    }

    fn try_lock(&self) -> Option<MutationLock> {
        self.inner
            .is_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MutationLock {
                inner: Arc::clone(&self.inner),
            })
    }

    fn mark_handled(&self) {
        self.inner.events_handled.fetch_add(1, Ordering::AcqRel);
    }

    /// Runs on the dispatch task, so every ordering decision follows delivery order
    fn dispatch(&self, event: &SyncEvent) {
        // Requests are for the master, confirmations for everyone else
        if (event.command == Command::Request) != self.inner.is_master {
            self.mark_handled();
            return;
        }

        if !self.inner.is_master {
            if self.inner.replication.send(event.clone()).is_err() {
                self.mark_handled();
            }
            return;
        }

        // First come, first served: a request arriving while locked is dropped here
        let Some(lock) = self.try_lock() else {
            self.drop_request(event);
            self.mark_handled();
            return;
        };
        let manager = self.clone();
        let event = event.clone();
        tokio::spawn(async move {
            manager.execute_request(&event, lock).await;
            manager.mark_handled();
        });
    }
}

/// Replays confirmations one at a time, in the order they were delivered
async fn replication_worker(
    manager: Weak<ManagerInner>,
    mut confirmations: mpsc::UnboundedReceiver<SyncEvent>,
) {
    while let Some(event) = confirmations.recv().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        let manager = FlightPlanManager { inner };
        manager.replicate_confirmation(&event).await;
        manager.mark_handled();
    }
}
