use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::event::SyncEvent;
use super::transport::SyncTransport;
use crate::errors::{FlightPlanError, Result};

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handle returned by [`SyncHandler::add_listener`], used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// One instrument's endpoint on the sync bus.
///
/// Fired events are encoded and broadcast to every instrument on the transport,
/// including this one. Received events are decoded and passed to every listener in
/// subscription order; undecodable messages are logged and dropped.
pub struct SyncHandler {
    transport: Arc<dyn SyncTransport>,
    listeners: Arc<RwLock<Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    pump: JoinHandle<()>,
}

impl SyncHandler {
    /// Subscribe to `transport` and start dispatching received events
    pub async fn new(transport: Arc<dyn SyncTransport>) -> Result<Self> {
        let mut receiver = transport
            .subscribe()
            .await
            .map_err(|e| FlightPlanError::Transport(format!("{e:#}")))?;
        let listeners: Arc<RwLock<Vec<(ListenerId, Listener)>>> = Arc::default();

        let dispatch_to = Arc::clone(&listeners);
        let pump = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                let event = match SyncEvent::decode(&payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Dropping undecodable sync message: {}", e);
                        metrics::counter!("flightplan.sync.decode_error_total").increment(1);
                        continue;
                    }
                };
                metrics::counter!("flightplan.sync.received_total").increment(1);
                debug!(
                    "Received {} {} from {}",
                    event.command,
                    event.event_type(),
                    event.source_id
                );

                // Listeners may add or remove listeners, so call them outside the lock
                let current: Vec<Listener> = dispatch_to
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                for listener in current {
                    listener(&event);
                }
            }
            debug!("Sync transport closed, dispatch stopped");
        });

        Ok(Self {
            transport,
            listeners,
            next_id: AtomicU64::new(0),
            pump,
        })
    }

    /// Broadcast `event` to every instrument, this one included
    pub fn fire_event(&self, event: &SyncEvent) -> Result<()> {
        let payload = event.encode()?;
        debug!(
            "Firing {} {} from {}",
            event.command,
            event.event_type(),
            event.source_id
        );
        self.transport.publish(payload.into());
        Ok(())
    }

    pub fn add_listener(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether a listener with this id was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Drop for SyncHandler {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
