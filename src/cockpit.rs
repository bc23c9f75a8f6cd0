//! Wires a configured cockpit: one sync transport, a sync handler and flight plan
//! manager per instrument, all sharing one simulator and airplane.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::airplane::{AirplaneTelemetry, SimulatedAirplane};
use crate::config::{FpsyncConfigFile, TransportKind};
use crate::manager::FlightPlanManager;
use crate::navdata::NavDatabase;
use crate::simulator::InMemorySimulator;
use crate::sync::{LocalTransport, NatsTransport, SyncHandler, SyncTransport, sync_subject};

pub struct Cockpit {
    navdata: Arc<NavDatabase>,
    simulator: Arc<InMemorySimulator>,
    airplane: Arc<SimulatedAirplane>,
    managers: Vec<FlightPlanManager>,
}

impl Cockpit {
    /// Build every instrument from `config` and run an initial resync on each
    pub async fn from_config(config: &FpsyncConfigFile) -> Result<Self> {
        let navdata = Arc::new(NavDatabase::load(&config.navdata)?);

        let transport: Arc<dyn SyncTransport> = match config.transport {
            TransportKind::Local => Arc::new(LocalTransport::new()),
            TransportKind::Nats => {
                let url = config.nats_url();
                let subject = sync_subject(config.subject_prefix.as_deref());
                Arc::new(NatsTransport::connect(&url, &subject, "fpsync").await?)
            }
        };
        info!("Using {} sync transport", config.transport);

        let cockpit = Self::build(
            navdata,
            transport,
            config.instruments.iter().map(|i| (i.id.as_str(), i.master)),
            config.airplane.into(),
        )
        .await?;
        cockpit.resync_all(true).await;
        Ok(cockpit)
    }

    /// Build instruments over an existing transport and navdata
    pub async fn build<'a>(
        navdata: Arc<NavDatabase>,
        transport: Arc<dyn SyncTransport>,
        instruments: impl IntoIterator<Item = (&'a str, bool)>,
        telemetry: AirplaneTelemetry,
    ) -> Result<Self> {
        let simulator = Arc::new(InMemorySimulator::new(Arc::clone(&navdata)));
        let airplane = Arc::new(SimulatedAirplane::new(telemetry));

        let mut managers = Vec::new();
        for (id, master) in instruments {
            let sync = SyncHandler::new(Arc::clone(&transport))
                .await
                .with_context(|| format!("Failed to subscribe instrument {id} to the sync bus"))?;
            managers.push(FlightPlanManager::new(
                id,
                master,
                Arc::new(sync),
                simulator.clone(),
                navdata.clone(),
                airplane.clone(),
            ));
        }

        Ok(Self {
            navdata,
            simulator,
            airplane,
            managers,
        })
    }

    pub fn navdata(&self) -> &Arc<NavDatabase> {
        &self.navdata
    }

    pub fn simulator(&self) -> &Arc<InMemorySimulator> {
        &self.simulator
    }

    pub fn airplane(&self) -> &Arc<SimulatedAirplane> {
        &self.airplane
    }

    pub fn managers(&self) -> &[FlightPlanManager] {
        &self.managers
    }

    pub fn manager(&self, id: &str) -> Option<&FlightPlanManager> {
        self.managers.iter().find(|m| m.instrument_id() == id)
    }

    pub fn master(&self) -> Option<&FlightPlanManager> {
        self.managers.iter().find(|m| m.is_master())
    }

    /// Resync every instrument; failures are logged and do not stop the others
    pub async fn resync_all(&self, force_enroute_sync: bool) {
        for manager in &self.managers {
            if let Err(e) = manager.sync_active_from_game(force_enroute_sync).await {
                warn!(
                    instrument = manager.instrument_id(),
                    "Failed to resync active plan: {}", e
                );
            }
        }
    }
}
