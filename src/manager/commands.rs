use anyhow::{Context, bail};
use std::future::Future;
use tracing::{debug, error, info, warn};

use super::{FlightPlanManager, MutationLock};
use super::saga::EnrouteInsertSaga;
use crate::errors::{FlightPlanError, Result, invalid_argument};
use crate::flight_plan::{FlightPlan, FlightPlanElement, Segment};
use crate::navdata::Waypoint;
use crate::sync::{SyncEvent, SyncPayload};

/// What a master request did to the simulator
enum Outcome {
    Applied,
    /// Nothing to do; no confirmation is sent
    Skipped,
}

fn require_icao(icao: &str, what: &str) -> Result<()> {
    if icao.is_empty() {
        return Err(invalid_argument(format!("Invalid waypoint ICAO to {what}")));
    }
    Ok(())
}

fn require_enroute(segment: Segment, what: &str) -> Result<()> {
    if segment != Segment::Enroute {
        return Err(invalid_argument(format!(
            "Cannot {what} a non-enroute segment ({segment})"
        )));
    }
    Ok(())
}

fn require_procedure_index(index: i32, available: usize, what: &str) -> Result<()> {
    let in_range = usize::try_from(index).is_ok_and(|i| i < available);
    if !in_range {
        return Err(invalid_argument(format!(
            "Invalid {what} index {index} ({available} available)"
        )));
    }
    Ok(())
}

/// Public mutators. Each validates against the local active plan, fires a REQUEST and
/// returns without waiting for the master; the outcome shows up on the next resync.
impl FlightPlanManager {
    fn request(&self, payload: SyncPayload) -> Result<()> {
        let event = SyncEvent::request(self.inner.instrument_id.clone(), payload);
        self.inner.sync.fire_event(&event)?;
        metrics::counter!("flightplan.manager.requests_fired_total").increment(1);
        Ok(())
    }

    /// `None` removes the origin
    pub fn set_active_origin(&self, waypoint: Option<&Waypoint>) -> Result<()> {
        match waypoint {
            Some(waypoint) => self.set_active_origin_icao(&waypoint.icao),
            None => self.remove_active_origin(),
        }
    }

    pub fn set_active_origin_icao(&self, icao: &str) -> Result<()> {
        require_icao(icao, "set as origin")?;
        self.request(SyncPayload::SetOrigin {
            icao: icao.to_string(),
        })
    }

    pub fn remove_active_origin(&self) -> Result<()> {
        self.request(SyncPayload::SetOrigin {
            icao: String::new(),
        })
    }

    /// `None` removes the destination
    pub fn set_active_destination(&self, waypoint: Option<&Waypoint>) -> Result<()> {
        match waypoint {
            Some(waypoint) => self.set_active_destination_icao(&waypoint.icao),
            None => self.remove_active_destination(),
        }
    }

    pub fn set_active_destination_icao(&self, icao: &str) -> Result<()> {
        require_icao(icao, "set as destination")?;
        self.request(SyncPayload::SetDestination {
            icao: icao.to_string(),
        })
    }

    pub fn remove_active_destination(&self) -> Result<()> {
        self.request(SyncPayload::SetDestination {
            icao: String::new(),
        })
    }

    pub fn add_waypoint_to_active(
        &self,
        segment: Segment,
        waypoint: &Waypoint,
        index: Option<usize>,
    ) -> Result<()> {
        self.add_waypoint_icao_to_active(segment, &waypoint.icao, index)
    }

    /// Insert before the enroute element at `index`, or append when `None`
    pub fn add_waypoint_icao_to_active(
        &self,
        segment: Segment,
        icao: &str,
        index: Option<usize>,
    ) -> Result<()> {
        require_icao(icao, "add to the flight plan")?;
        require_enroute(segment, "add waypoint to")?;
        self.require_insert_index(index)?;
        self.request(SyncPayload::EnrouteInsertWaypoint {
            icao: icao.to_string(),
            index,
        })
    }

    /// Insert the part of `airway` between `enter` (exclusive) and `exit` (inclusive)
    pub fn add_airway_sequence_to_active(
        &self,
        segment: Segment,
        airway: &str,
        enter: &str,
        exit: &str,
        index: Option<usize>,
    ) -> Result<()> {
        require_enroute(segment, "add airway to")?;
        if airway.is_empty() {
            return Err(invalid_argument("Invalid airway name"));
        }
        require_icao(enter, "enter an airway at")?;
        require_icao(exit, "exit an airway at")?;
        self.require_insert_index(index)?;
        self.request(SyncPayload::EnrouteInsertAirway {
            airway_name: airway.to_string(),
            enter_icao: enter.to_string(),
            exit_icao: exit.to_string(),
            index,
        })
    }

    /// Remove the enroute element at `index`
    pub fn remove_from_active(&self, segment: Segment, index: usize) -> Result<()> {
        require_enroute(segment, "remove element from")?;
        let len = self.inner.read_state().active.enroute().len();
        if index >= len {
            return Err(invalid_argument(format!(
                "Enroute index {index} out of range (len {len})"
            )));
        }
        self.request(SyncPayload::EnrouteRemoveIndex { index })
    }

    pub fn load_departure_to_active(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()> {
        let available = {
            let state = self.inner.read_state();
            if !state.active.is_origin_airport() {
                return Err(invalid_argument(
                    "Cannot add departure to a flight plan without an origin airport",
                ));
            }
            state.active.origin_waypoint().map_or(0, |w| w.departures().len())
        };
        require_procedure_index(procedure_index, available, "departure")?;
        self.request(SyncPayload::SetDeparture {
            procedure_index,
            enroute_transition_index,
            runway_transition_index,
        })
    }

    pub fn remove_departure_from_active(&self) -> Result<()> {
        self.request(SyncPayload::SetDeparture {
            procedure_index: -1,
            enroute_transition_index: -1,
            runway_transition_index: -1,
        })
    }

    pub fn load_arrival_to_active(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()> {
        let available = self.destination_procedures("arrival", |w| w.arrivals().len())?;
        require_procedure_index(procedure_index, available, "arrival")?;
        self.request(SyncPayload::SetArrival {
            procedure_index,
            enroute_transition_index,
            runway_transition_index,
        })
    }

    pub fn remove_arrival_from_active(&self) -> Result<()> {
        self.request(SyncPayload::SetArrival {
            procedure_index: -1,
            enroute_transition_index: -1,
            runway_transition_index: -1,
        })
    }

    pub fn load_approach_to_active(&self, procedure_index: i32, transition_index: i32) -> Result<()> {
        let available = self.destination_procedures("approach", |w| w.approaches().len())?;
        require_procedure_index(procedure_index, available, "approach")?;
        self.request(SyncPayload::SetApproach {
            procedure_index,
            transition_index,
        })
    }

    pub fn remove_approach_from_active(&self) -> Result<()> {
        self.request(SyncPayload::SetApproach {
            procedure_index: -1,
            transition_index: -1,
        })
    }

    pub fn clear_active_plan(&self) -> Result<()> {
        self.request(SyncPayload::ClearFlightPlan)
    }

    fn require_insert_index(&self, index: Option<usize>) -> Result<()> {
        let len = self.inner.read_state().active.enroute().len();
        match index {
            Some(i) if i > len => Err(invalid_argument(format!(
                "Enroute index {i} out of range (len {len})"
            ))),
            _ => Ok(()),
        }
    }

    fn destination_procedures(&self, what: &str, count: impl Fn(&Waypoint) -> usize) -> Result<usize> {
        let state = self.inner.read_state();
        if !state.active.is_destination_airport() {
            return Err(invalid_argument(format!(
                "Cannot add {what} to a flight plan without a destination airport"
            )));
        }
        Ok(state.active.destination_waypoint().map_or(0, count))
    }
}

/// Handling of received events
impl FlightPlanManager {
    /// Master side: a REQUEST that arrived while a mutation was in flight
    pub(super) fn drop_request(&self, event: &SyncEvent) {
        self.inner
            .dropped_requests
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        metrics::counter!("flightplan.manager.dropped_requests_total").increment(1);
        warn!(
            instrument = %self.inner.instrument_id,
            "Dropping {} request from {}: a mutation is already in flight",
            event.event_type(),
            event.source_id
        );
    }

    /// Master side: apply a REQUEST to the simulator under `lock`, confirm it, then resync
    pub(super) async fn execute_request(&self, event: &SyncEvent, lock: MutationLock) {
        let event_type = event.event_type();
        match self.apply_request(&event.payload).await {
            Ok(Outcome::Applied) => {
                let confirmation = event.confirm(self.inner.instrument_id.clone());
                if let Err(e) = self.inner.sync.fire_event(&confirmation) {
                    error!("Failed to fire {} confirmation: {}", event_type, e);
                }
                metrics::counter!("flightplan.manager.requests_applied_total").increment(1);
                info!(
                    instrument = %self.inner.instrument_id,
                    "Applied {} request from {}",
                    event_type,
                    event.source_id
                );
            }
            Ok(Outcome::Skipped) => {
                debug!("Nothing to apply for {} request", event_type);
            }
            Err(e) => {
                metrics::counter!("flightplan.manager.requests_failed_total").increment(1);
                error!(
                    instrument = %self.inner.instrument_id,
                    "Failed to apply {} request from {}: {:#}",
                    event_type,
                    event.source_id,
                    e
                );
            }
        }
        drop(lock);

        self.resync_logged().await;
    }

    /// Follower side: mirror enroute edits locally, then verify against the simulator
    pub(super) async fn replicate_confirmation(&self, event: &SyncEvent) {
        if let Err(e) = self.replicate_enroute(&event.payload).await {
            warn!(
                instrument = %self.inner.instrument_id,
                "Could not replicate {} locally: {:#}",
                event.event_type(),
                e
            );
        }
        self.resync_logged().await;
    }

    async fn resync_logged(&self) {
        if let Err(e) = self.sync_active_from_game(false).await {
            error!(
                instrument = %self.inner.instrument_id,
                "Failed to sync active flight plan from simulator: {}",
                e
            );
        }
    }

    async fn apply_request(&self, payload: &SyncPayload) -> anyhow::Result<Outcome> {
        let simulator = &self.inner.simulator;
        match payload {
            SyncPayload::SetOrigin { icao } if icao.is_empty() => simulator.remove_origin().await?,
            SyncPayload::SetOrigin { icao } => simulator.set_origin(icao).await?,
            SyncPayload::SetDestination { icao } if icao.is_empty() => {
                simulator.remove_destination().await?
            }
            SyncPayload::SetDestination { icao } => simulator.set_destination(icao).await?,
            SyncPayload::SetDeparture {
                procedure_index, ..
            } if *procedure_index < 0 => simulator.remove_departure().await?,
            SyncPayload::SetDeparture {
                procedure_index,
                enroute_transition_index,
                runway_transition_index,
            } => {
                simulator
                    .load_departure(
                        *procedure_index,
                        *enroute_transition_index,
                        *runway_transition_index,
                    )
                    .await?
            }
            SyncPayload::SetArrival {
                procedure_index, ..
            } if *procedure_index < 0 => simulator.remove_arrival().await?,
            SyncPayload::SetArrival {
                procedure_index,
                enroute_transition_index,
                runway_transition_index,
            } => {
                simulator
                    .load_arrival(
                        *procedure_index,
                        *enroute_transition_index,
                        *runway_transition_index,
                    )
                    .await?
            }
            SyncPayload::SetApproach {
                procedure_index, ..
            } if *procedure_index < 0 => simulator.remove_approach().await?,
            SyncPayload::SetApproach {
                procedure_index,
                transition_index,
            } => {
                simulator
                    .load_approach(*procedure_index, *transition_index)
                    .await?
            }
            SyncPayload::EnrouteInsertWaypoint { icao, index } => {
                let waypoint = self.inner.waypoints.get_waypoint(icao).await?;
                let at = self
                    .inner
                    .write_state()
                    .active
                    .insert_waypoint(Segment::Enroute, waypoint, *index)?;
                self.push_inserted_element(at).await?;
            }
            SyncPayload::EnrouteInsertAirway {
                airway_name,
                enter_icao,
                exit_icao,
                index,
            } => {
                let path = self
                    .resolve_airway_path(airway_name, enter_icao, exit_icao)
                    .await?;
                let at = self.inner.write_state().active.insert_airway(
                    Segment::Enroute,
                    airway_name,
                    path,
                    *index,
                )?;
                self.push_inserted_element(at).await?;
            }
            SyncPayload::EnrouteRemoveIndex { index } => {
                return self.remove_enroute_element(*index).await;
            }
            SyncPayload::ClearFlightPlan => {
                simulator.clear_flight_plan().await?;
                // Other segments come back from the simulator on resync
                self.inner.write_state().active.clear_enroute();
            }
        }
        Ok(Outcome::Applied)
    }

    /// Push the locally inserted enroute element at `index` to the simulator, removing
    /// it again if the simulator rejects it
    async fn push_inserted_element(&self, index: usize) -> anyhow::Result<()> {
        let (element, leg_offset) = {
            let state = self.inner.read_state();
            let element = state
                .active
                .enroute()
                .get(index)
                .cloned()
                .context("Inserted enroute element disappeared")?;
            (element, state.active.enroute_leg_offset(index))
        };

        let saga = EnrouteInsertSaga::begin(&self.inner, index, element.clone());
        match &element {
            FlightPlanElement::Leg(leg) => {
                self.inner
                    .simulator
                    .sync_enroute_leg(leg, leg_offset)
                    .await?
            }
            FlightPlanElement::AirwaySequence(sequence) => {
                self.inner
                    .simulator
                    .sync_enroute_airway_sequence(sequence, leg_offset)
                    .await?
            }
        }
        saga.commit();
        Ok(())
    }

    async fn remove_enroute_element(&self, index: usize) -> anyhow::Result<Outcome> {
        let found = {
            let state = self.inner.read_state();
            state
                .active
                .enroute()
                .get(index)
                .cloned()
                .map(|element| (element, state.active.enroute_leg_offset(index)))
        };
        let Some((element, leg_offset)) = found else {
            return Ok(Outcome::Skipped);
        };

        match &element {
            FlightPlanElement::Leg(leg) => self.inner.simulator.remove_leg(leg, leg_offset).await?,
            FlightPlanElement::AirwaySequence(sequence) => {
                self.inner
                    .simulator
                    .remove_airway_sequence(sequence, leg_offset)
                    .await?
            }
        }

        let mut state = self.inner.write_state();
        if state
            .active
            .enroute()
            .get(index)
            .is_some_and(|e| e.same_route(&element))
        {
            state.active.remove_enroute_element(index);
        }
        Ok(Outcome::Applied)
    }

    /// Apply a confirmed enroute edit to the local plan only
    async fn replicate_enroute(&self, payload: &SyncPayload) -> anyhow::Result<()> {
        match payload {
            SyncPayload::EnrouteInsertWaypoint { icao, index } => {
                let waypoint = self.inner.waypoints.get_waypoint(icao).await?;
                self.inner
                    .write_state()
                    .active
                    .insert_waypoint(Segment::Enroute, waypoint, *index)?;
            }
            SyncPayload::EnrouteInsertAirway {
                airway_name,
                enter_icao,
                exit_icao,
                index,
            } => {
                let path = self
                    .resolve_airway_path(airway_name, enter_icao, exit_icao)
                    .await?;
                self.inner.write_state().active.insert_airway(
                    Segment::Enroute,
                    airway_name,
                    path,
                    *index,
                )?;
            }
            SyncPayload::EnrouteRemoveIndex { index } => {
                self.inner
                    .write_state()
                    .active
                    .remove_by_index(Segment::Enroute, *index, 1)?;
            }
            SyncPayload::ClearFlightPlan => {
                self.inner.write_state().active.clear_enroute();
            }
            SyncPayload::SetOrigin { .. }
            | SyncPayload::SetDestination { .. }
            | SyncPayload::SetDeparture { .. }
            | SyncPayload::SetArrival { .. }
            | SyncPayload::SetApproach { .. } => {}
        }
        Ok(())
    }

    /// Waypoints flown along `airway_name` after `enter` up to and including `exit`
    async fn resolve_airway_path(
        &self,
        airway_name: &str,
        enter: &str,
        exit: &str,
    ) -> anyhow::Result<Vec<Waypoint>> {
        let waypoints = &self.inner.waypoints;
        let entry = waypoints.get_waypoint(enter).await?;
        if !entry.is_on_airway(airway_name) {
            bail!("{enter} is not on airway {airway_name}");
        }

        let airway = waypoints.get_airway(airway_name).await?;
        let fixes = airway
            .path_between(enter, exit)
            .with_context(|| format!("No path along {airway_name} from {enter} to {exit}"))?;

        let mut path = Vec::with_capacity(fixes.len());
        for icao in &fixes {
            path.push(waypoints.get_waypoint(icao).await?);
        }
        Ok(path)
    }
}

/// Operations sent straight to the simulator rather than over the sync bus. Only the
/// master may call them; errors are returned to the caller.
impl FlightPlanManager {
    fn require_master(&self, operation: &str) -> Result<()> {
        if !self.inner.is_master {
            warn!(
                instrument = %self.inner.instrument_id,
                "Refusing {} on a follower",
                operation
            );
            return Err(FlightPlanError::NotMaster(self.inner.instrument_id.clone()));
        }
        Ok(())
    }

    /// Run `call` against the simulator and resync whether or not it succeeded
    async fn direct(
        &self,
        operation: &str,
        call: impl Future<Output = anyhow::Result<()>>,
    ) -> Result<()> {
        self.require_master(operation)?;
        let result = call.await;
        let resync = self.sync_active_from_game(false).await;
        result?;
        resync
    }

    pub async fn activate_approach(&self) -> Result<()> {
        self.direct(
            "activate approach",
            self.inner.simulator.activate_approach(),
        )
        .await
    }

    pub async fn deactivate_approach(&self) -> Result<()> {
        self.direct(
            "deactivate approach",
            self.inner.simulator.deactivate_approach(),
        )
        .await
    }

    /// Make the leg at `leg_index` (flight order) of the active plan the active leg
    pub async fn set_active_leg(&self, leg_index: usize) -> Result<()> {
        let count = self.inner.read_state().active.leg_count();
        if leg_index >= count {
            return Err(invalid_argument(format!(
                "Leg index {leg_index} out of range ({count} legs)"
            )));
        }
        self.direct(
            "set active leg",
            self.inner.simulator.set_active_leg(leg_index),
        )
        .await
    }

    /// Replace the active plan with a copy of `plan` and push it to the simulator
    pub async fn copy_to_active(&self, plan: &FlightPlan) -> Result<()> {
        self.require_master("copy to active")?;
        self.inner.write_state().active.copy_from(plan);
        self.sync_active_to_game().await
    }

    pub async fn activate_standby(&self) -> Result<()> {
        let standby = self.standby_plan();
        self.copy_to_active(&standby).await
    }

    /// Rebuild the simulator's flight plan from the local active plan, then resync
    pub async fn sync_active_to_game(&self) -> Result<()> {
        self.require_master("sync active to game")?;
        let plan = self.active_plan();
        let result = self.push_plan(&plan).await;
        let resync = self.sync_active_from_game(false).await;
        result?;
        resync
    }

    async fn push_plan(&self, plan: &FlightPlan) -> anyhow::Result<()> {
        let simulator = &self.inner.simulator;
        simulator.clear_flight_plan().await?;

        if let Some(origin) = plan.origin_waypoint() {
            simulator.set_origin(&origin.icao).await?;
        }
        if let Some(destination) = plan.destination_waypoint() {
            simulator.set_destination(&destination.icao).await?;
        }
        if let Some(departure) = plan.departure() {
            simulator
                .load_departure(
                    departure.procedure_index,
                    departure.transition_index,
                    departure.runway_transition_index,
                )
                .await?;
        }
        if let Some(arrival) = plan.arrival() {
            simulator
                .load_arrival(
                    arrival.procedure_index,
                    arrival.transition_index,
                    arrival.runway_transition_index,
                )
                .await?;
        }
        if let Some(approach) = plan.approach() {
            simulator
                .load_approach(approach.procedure_index, approach.transition_index)
                .await?;
        }

        let mut leg_offset = 0;
        for element in plan.enroute() {
            match element {
                FlightPlanElement::Leg(leg) => simulator.sync_enroute_leg(leg, leg_offset).await?,
                FlightPlanElement::AirwaySequence(sequence) => {
                    simulator
                        .sync_enroute_airway_sequence(sequence, leg_offset)
                        .await?
                }
            }
            leg_offset += element.leg_count();
        }

        info!(
            instrument = %self.inner.instrument_id,
            "Pushed active plan to simulator: {}",
            plan
        );
        Ok(())
    }
}
