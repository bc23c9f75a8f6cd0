use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{GameFlightPlan, GameLeg, GameProcedure, SimulatorInterface};
use crate::flight_plan::{AirwaySequence, FlightPlanLeg};
use crate::navdata::{NavDatabase, Procedure, Transition, Waypoint};

/// A mutating call received by [`InMemorySimulator`], in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    SetOrigin(String),
    RemoveOrigin,
    SetDestination(String),
    RemoveDestination,
    LoadDeparture(i32, i32, i32),
    RemoveDeparture,
    LoadArrival(i32, i32, i32),
    RemoveArrival,
    LoadApproach(i32, i32),
    RemoveApproach,
    SyncEnrouteLeg { icao: String, index: usize },
    SyncEnrouteAirwaySequence { airway: String, index: usize },
    RemoveLeg { icao: String, index: usize },
    RemoveAirwaySequence { airway: String, index: usize },
    ClearFlightPlan,
    ActivateApproach,
    DeactivateApproach,
    SetActiveLeg(usize),
}

type FailurePredicate = Box<dyn Fn(&SimCall) -> bool + Send>;

#[derive(Debug, Default)]
struct GameState {
    plan: GameFlightPlan,
    active_leg: Option<usize>,
    approach_active: bool,
}

impl GameState {
    /// Keep the active leg pointing inside the plan after an edit
    fn clamp_active_leg(&mut self) {
        let count = self.plan.leg_count();
        self.active_leg = match self.active_leg {
            _ if count < 2 => None,
            None if self.plan.direct_to.is_some() => None,
            None => Some(1),
            Some(i) if i >= count => Some(count - 1),
            other => other,
        };
    }
}

/// Simulator flight plan engine kept entirely in memory.
///
/// Stands in for the real simulator in the CLI and in tests. Every mutating call is
/// recorded before it is applied, failures can be injected per call, and mutations
/// can be held at a gate to exercise calls that overlap in time.
pub struct InMemorySimulator {
    navdata: Arc<NavDatabase>,
    state: Mutex<GameState>,
    calls: Mutex<Vec<SimCall>>,
    reads: Mutex<usize>,
    failures: Mutex<Vec<FailurePredicate>>,
    reads_failing: AtomicBool,
    gate: watch::Sender<bool>,
}

impl InMemorySimulator {
    pub fn new(navdata: Arc<NavDatabase>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            navdata,
            state: Mutex::new(GameState::default()),
            calls: Mutex::new(Vec::new()),
            reads: Mutex::new(0),
            failures: Mutex::new(Vec::new()),
            reads_failing: AtomicBool::new(false),
            gate,
        }
    }

    pub fn navdata(&self) -> &Arc<NavDatabase> {
        &self.navdata
    }

    /// Mutating calls received so far
    pub fn calls(&self) -> Vec<SimCall> {
        lock(&self.calls).clone()
    }

    pub fn mutation_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of `sync_from_game` reads served
    pub fn read_count(&self) -> usize {
        *lock(&self.reads)
    }

    pub fn snapshot(&self) -> GameFlightPlan {
        lock(&self.state).plan.clone()
    }

    pub fn active_leg(&self) -> Option<usize> {
        lock(&self.state).active_leg
    }

    pub fn is_approach_active(&self) -> bool {
        lock(&self.state).approach_active
    }

    /// Fail the next call matching `predicate` (once)
    pub fn fail_next(&self, predicate: impl Fn(&SimCall) -> bool + Send + 'static) {
        lock(&self.failures).push(Box::new(predicate));
    }

    /// Fail every `sync_from_game` read while `failing` is set
    pub fn fail_reads(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every subsequent mutating call until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Direct-to entered on the simulator side (cockpit knob, not the sync bus)
    pub fn set_direct_to(&self, icao: Option<&str>) -> Result<()> {
        let target = icao.map(|icao| self.resolve(icao)).transpose()?;
        let mut state = lock(&self.state);
        // An off-plan target leaves no active leg until the direct-to is cancelled
        if let Some(target) = &target {
            state.active_leg = state.plan_fix_index(target);
        }
        state.plan.direct_to = target;
        Ok(())
    }

    fn resolve(&self, icao: &str) -> Result<Waypoint> {
        self.navdata
            .waypoint(icao)
            .cloned()
            .with_context(|| format!("Unknown waypoint {icao}"))
    }

    /// Record `call`, wait at the gate, then run `apply` against the game state
    async fn mutate<T>(
        &self,
        call: SimCall,
        apply: impl FnOnce(&Self, &mut GameState) -> Result<T>,
    ) -> Result<T> {
        lock(&self.calls).push(call.clone());

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| anyhow!("simulator gate closed"))?;

        let injected = {
            let mut failures = lock(&self.failures);
            failures
                .iter()
                .position(|p| p(&call))
                .map(|i| failures.remove(i))
                .is_some()
        };
        if injected {
            warn!("Injected failure for {:?}", call);
            bail!("Simulator rejected {:?}", call);
        }

        let mut state = lock(&self.state);
        let result = apply(self, &mut *state)?;
        state.clamp_active_leg();
        debug!("Applied {:?}", call);
        Ok(result)
    }

    /// Resolve consecutive fix lists into one procedure, merging a fix shared at a seam
    fn build_procedure(
        &self,
        name: &str,
        indices: (i32, i32, i32),
        fixes: &[&[String]],
    ) -> Result<GameProcedure> {
        let mut legs = Vec::new();
        for chunk in fixes {
            for waypoint in self.navdata.resolve_all(chunk)? {
                if legs.last().is_some_and(|l: &GameLeg| l.fix == waypoint) {
                    continue;
                }
                legs.push(GameLeg::direct(waypoint));
            }
        }
        Ok(GameProcedure {
            name: name.to_string(),
            procedure_index: indices.0,
            transition_index: indices.1,
            runway_transition_index: indices.2,
            legs,
        })
    }
}

impl GameState {
    fn plan_fix_index(&self, waypoint: &Waypoint) -> Option<usize> {
        let plan = &self.plan;
        plan.origin
            .iter()
            .chain(plan.departure.iter().flat_map(|p| p.legs.iter().map(|l| &l.fix)))
            .chain(plan.enroute.iter().map(|l| &l.fix))
            .chain(plan.arrival.iter().flat_map(|p| p.legs.iter().map(|l| &l.fix)))
            .chain(plan.approach.iter().flat_map(|p| p.legs.iter().map(|l| &l.fix)))
            .chain(plan.destination.iter())
            .position(|w| w == waypoint)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn pick<'a>(procedures: &'a [Procedure], index: i32, what: &str) -> Result<&'a Procedure> {
    usize::try_from(index)
        .ok()
        .and_then(|i| procedures.get(i))
        .with_context(|| format!("No {what} at index {index}"))
}

/// Fixes of the transition at `index`; a negative index selects no transition
fn transition<'a>(transitions: &'a [Transition], index: i32, what: &str) -> Result<&'a [String]> {
    if index < 0 {
        return Ok(&[]);
    }
    usize::try_from(index)
        .ok()
        .and_then(|i| transitions.get(i))
        .map(|t| t.fixes.as_slice())
        .with_context(|| format!("No {what} at index {index}"))
}

fn enroute_range(plan: &GameFlightPlan, index: usize, legs: &[FlightPlanLeg]) -> Result<()> {
    let end = index + legs.len();
    let current = plan
        .enroute
        .get(index..end)
        .with_context(|| format!("Enroute range {index}..{end} out of range"))?;
    if current.iter().zip(legs).any(|(game, leg)| game.fix != leg.fix) {
        bail!("Enroute legs at {index} do not match the requested removal");
    }
    Ok(())
}

#[async_trait]
impl SimulatorInterface for InMemorySimulator {
    async fn set_origin(&self, icao: &str) -> Result<()> {
        self.mutate(SimCall::SetOrigin(icao.to_string()), |sim, state| {
            state.plan.origin = Some(sim.resolve(icao)?);
            state.plan.departure = None;
            Ok(())
        })
        .await
    }

    async fn remove_origin(&self) -> Result<()> {
        self.mutate(SimCall::RemoveOrigin, |_, state| {
            state.plan.origin = None;
            state.plan.departure = None;
            Ok(())
        })
        .await
    }

    async fn set_destination(&self, icao: &str) -> Result<()> {
        self.mutate(SimCall::SetDestination(icao.to_string()), |sim, state| {
            state.plan.destination = Some(sim.resolve(icao)?);
            state.plan.arrival = None;
            state.plan.approach = None;
            state.approach_active = false;
            Ok(())
        })
        .await
    }

    async fn remove_destination(&self) -> Result<()> {
        self.mutate(SimCall::RemoveDestination, |_, state| {
            state.plan.destination = None;
            state.plan.arrival = None;
            state.plan.approach = None;
            state.approach_active = false;
            Ok(())
        })
        .await
    }

    async fn load_departure(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()> {
        let call = SimCall::LoadDeparture(
            procedure_index,
            enroute_transition_index,
            runway_transition_index,
        );
        self.mutate(call, |sim, state| {
            let origin = state.plan.origin.as_ref().context("No origin loaded")?;
            let procedure = pick(origin.departures(), procedure_index, "departure")?;
            let runway = transition(
                &procedure.runway_transitions,
                runway_transition_index,
                "runway transition",
            )?;
            let enroute = transition(
                &procedure.transitions,
                enroute_transition_index,
                "enroute transition",
            )?;
            let departure = sim.build_procedure(
                &procedure.name,
                (
                    procedure_index,
                    enroute_transition_index,
                    runway_transition_index,
                ),
                &[runway, &procedure.fixes, enroute],
            )?;
            state.plan.departure = Some(departure);
            Ok(())
        })
        .await
    }

    async fn remove_departure(&self) -> Result<()> {
        self.mutate(SimCall::RemoveDeparture, |_, state| {
            state.plan.departure = None;
            Ok(())
        })
        .await
    }

    async fn load_arrival(
        &self,
        procedure_index: i32,
        enroute_transition_index: i32,
        runway_transition_index: i32,
    ) -> Result<()> {
        let call = SimCall::LoadArrival(
            procedure_index,
            enroute_transition_index,
            runway_transition_index,
        );
        self.mutate(call, |sim, state| {
            let destination = state
                .plan
                .destination
                .as_ref()
                .context("No destination loaded")?;
            let procedure = pick(destination.arrivals(), procedure_index, "arrival")?;
            let enroute = transition(
                &procedure.transitions,
                enroute_transition_index,
                "enroute transition",
            )?;
            let runway = transition(
                &procedure.runway_transitions,
                runway_transition_index,
                "runway transition",
            )?;
            let arrival = sim.build_procedure(
                &procedure.name,
                (
                    procedure_index,
                    enroute_transition_index,
                    runway_transition_index,
                ),
                &[enroute, &procedure.fixes, runway],
            )?;
            state.plan.arrival = Some(arrival);
            Ok(())
        })
        .await
    }

    async fn remove_arrival(&self) -> Result<()> {
        self.mutate(SimCall::RemoveArrival, |_, state| {
            state.plan.arrival = None;
            Ok(())
        })
        .await
    }

    async fn load_approach(&self, procedure_index: i32, transition_index: i32) -> Result<()> {
        let call = SimCall::LoadApproach(procedure_index, transition_index);
        self.mutate(call, |sim, state| {
            let destination = state
                .plan
                .destination
                .as_ref()
                .context("No destination loaded")?;
            let procedure = pick(destination.approaches(), procedure_index, "approach")?;
            let approach_transition =
                transition(&procedure.transitions, transition_index, "approach transition")?;
            let approach = sim.build_procedure(
                &procedure.name,
                (procedure_index, transition_index, -1),
                &[approach_transition, &procedure.fixes],
            )?;
            state.plan.approach = Some(approach);
            state.approach_active = false;
            Ok(())
        })
        .await
    }

    async fn remove_approach(&self) -> Result<()> {
        self.mutate(SimCall::RemoveApproach, |_, state| {
            state.plan.approach = None;
            state.approach_active = false;
            Ok(())
        })
        .await
    }

    async fn sync_enroute_leg(&self, leg: &FlightPlanLeg, enroute_leg_index: usize) -> Result<()> {
        let call = SimCall::SyncEnrouteLeg {
            icao: leg.fix.icao.clone(),
            index: enroute_leg_index,
        };
        self.mutate(call, |_, state| {
            if enroute_leg_index > state.plan.enroute.len() {
                bail!("Enroute leg index {enroute_leg_index} out of range");
            }
            state.plan.enroute.insert(
                enroute_leg_index,
                GameLeg {
                    fix: leg.fix.clone(),
                    path: leg.path.clone(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn sync_enroute_airway_sequence(
        &self,
        sequence: &AirwaySequence,
        enroute_leg_index: usize,
    ) -> Result<()> {
        let call = SimCall::SyncEnrouteAirwaySequence {
            airway: sequence.airway_name.clone(),
            index: enroute_leg_index,
        };
        self.mutate(call, |_, state| {
            if enroute_leg_index > state.plan.enroute.len() {
                bail!("Enroute leg index {enroute_leg_index} out of range");
            }
            let legs = sequence.legs.iter().map(|l| GameLeg {
                fix: l.fix.clone(),
                path: l.path.clone(),
            });
            state
                .plan
                .enroute
                .splice(enroute_leg_index..enroute_leg_index, legs);
            Ok(())
        })
        .await
    }

    async fn remove_leg(&self, leg: &FlightPlanLeg, enroute_leg_index: usize) -> Result<()> {
        let call = SimCall::RemoveLeg {
            icao: leg.fix.icao.clone(),
            index: enroute_leg_index,
        };
        self.mutate(call, |_, state| {
            enroute_range(&state.plan, enroute_leg_index, std::slice::from_ref(leg))?;
            state.plan.enroute.remove(enroute_leg_index);
            Ok(())
        })
        .await
    }

    async fn remove_airway_sequence(
        &self,
        sequence: &AirwaySequence,
        enroute_leg_index: usize,
    ) -> Result<()> {
        let call = SimCall::RemoveAirwaySequence {
            airway: sequence.airway_name.clone(),
            index: enroute_leg_index,
        };
        self.mutate(call, |_, state| {
            enroute_range(&state.plan, enroute_leg_index, &sequence.legs)?;
            state
                .plan
                .enroute
                .drain(enroute_leg_index..enroute_leg_index + sequence.legs.len());
            Ok(())
        })
        .await
    }

    async fn clear_flight_plan(&self) -> Result<()> {
        self.mutate(SimCall::ClearFlightPlan, |_, state| {
            *state = GameState::default();
            Ok(())
        })
        .await
    }

    async fn activate_approach(&self) -> Result<()> {
        self.mutate(SimCall::ActivateApproach, |_, state| {
            let has_legs = state
                .plan
                .approach
                .as_ref()
                .is_some_and(|a| !a.legs.is_empty());
            if !has_legs {
                bail!("No approach loaded");
            }
            state.approach_active = true;
            state.active_leg = Some(state.plan.legs_before_approach());
            state.plan.direct_to = None;
            Ok(())
        })
        .await
    }

    async fn deactivate_approach(&self) -> Result<()> {
        self.mutate(SimCall::DeactivateApproach, |_, state| {
            state.approach_active = false;
            Ok(())
        })
        .await
    }

    async fn set_active_leg(&self, leg_index: usize) -> Result<()> {
        self.mutate(SimCall::SetActiveLeg(leg_index), |_, state| {
            let count = state.plan.leg_count();
            if leg_index >= count {
                bail!("Leg index {leg_index} out of range ({count} legs)");
            }
            state.active_leg = Some(leg_index);
            state.plan.direct_to = None;
            Ok(())
        })
        .await
    }

    async fn sync_from_game(&self) -> Result<GameFlightPlan> {
        *lock(&self.reads) += 1;
        if self.reads_failing.load(Ordering::SeqCst) {
            bail!("Simulator flight plan unavailable");
        }
        Ok(self.snapshot())
    }

    async fn get_active_leg(&self) -> Result<Option<usize>> {
        Ok(self.active_leg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight_plan::Segment;
    use crate::navdata::AirportProcedures;
    use std::time::Duration;

    fn navdata() -> Arc<NavDatabase> {
        let departure = Procedure {
            name: "DEEZZ5".to_string(),
            fixes: vec!["CANDR".into(), "DEEZZ".into()],
            transitions: vec![Transition {
                name: "HEERO".to_string(),
                fixes: vec!["DEEZZ".into(), "HEERO".into()],
            }],
            runway_transitions: vec![Transition {
                name: "RW04L".to_string(),
                fixes: vec!["JFK04".into(), "CANDR".into()],
            }],
        };

        let mut db = NavDatabase::new();
        db.add_waypoint(
            Waypoint::airport("KJFK", 40.64, -73.78).with_procedures(AirportProcedures {
                departures: vec![departure],
                ..Default::default()
            }),
        )
        .add_waypoint(Waypoint::intersection("JFK04", 40.66, -73.76))
        .add_waypoint(Waypoint::intersection("CANDR", 40.75, -73.60))
        .add_waypoint(Waypoint::intersection("DEEZZ", 40.90, -73.40))
        .add_waypoint(Waypoint::intersection("HEERO", 41.10, -73.10))
        .add_waypoint(Waypoint::airport("KBOS", 42.36, -71.01));
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_departure_fix_order_merges_shared_fixes() {
        let sim = InMemorySimulator::new(navdata());
        sim.set_origin("KJFK").await.unwrap();
        sim.load_departure(0, 0, 0).await.unwrap();

        let plan = sim.sync_from_game().await.unwrap();
        let fixes: Vec<_> = plan
            .departure
            .unwrap()
            .legs
            .iter()
            .map(|l| l.fix.icao.clone())
            .collect();
        assert_eq!(fixes, vec!["JFK04", "CANDR", "DEEZZ", "HEERO"]);
    }

    #[tokio::test]
    async fn test_negative_transition_selects_none() {
        let sim = InMemorySimulator::new(navdata());
        sim.set_origin("KJFK").await.unwrap();
        sim.load_departure(0, -1, -1).await.unwrap();

        let plan = sim.snapshot();
        assert_eq!(plan.departure.unwrap().legs.len(), 2);
    }

    #[tokio::test]
    async fn test_departure_without_origin_fails_but_is_recorded() {
        let sim = InMemorySimulator::new(navdata());
        assert!(sim.load_departure(0, -1, -1).await.is_err());
        assert_eq!(sim.calls(), vec![SimCall::LoadDeparture(0, -1, -1)]);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let sim = InMemorySimulator::new(navdata());
        sim.fail_next(|c| matches!(c, SimCall::SetOrigin(_)));

        assert!(sim.set_origin("KJFK").await.is_err());
        assert!(sim.snapshot().origin.is_none());
        sim.set_origin("KJFK").await.unwrap();
        assert_eq!(sim.snapshot().origin.unwrap().icao, "KJFK");
    }

    #[tokio::test]
    async fn test_remove_leg_checks_fix() {
        let sim = InMemorySimulator::new(navdata());
        let leg = FlightPlanLeg::new(Waypoint::intersection("CANDR", 40.75, -73.60), Segment::Enroute);
        sim.sync_enroute_leg(&leg, 0).await.unwrap();

        let other = FlightPlanLeg::new(Waypoint::intersection("DEEZZ", 40.9, -73.4), Segment::Enroute);
        assert!(sim.remove_leg(&other, 0).await.is_err());
        sim.remove_leg(&leg, 0).await.unwrap();
        assert!(sim.snapshot().enroute.is_empty());
    }

    #[tokio::test]
    async fn test_paused_mutation_waits_for_resume() {
        let sim = Arc::new(InMemorySimulator::new(navdata()));
        sim.pause();

        let task = {
            let sim = Arc::clone(&sim);
            tokio::spawn(async move { sim.set_destination("KBOS").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sim.mutation_count(), 1);
        assert!(sim.snapshot().destination.is_none());

        sim.resume();
        task.await.unwrap().unwrap();
        assert_eq!(sim.snapshot().destination.unwrap().icao, "KBOS");
    }

    #[tokio::test]
    async fn test_set_active_leg_cancels_direct_to() {
        let sim = InMemorySimulator::new(navdata());
        sim.set_origin("KJFK").await.unwrap();
        sim.set_destination("KBOS").await.unwrap();
        sim.set_direct_to(Some("KBOS")).unwrap();
        assert_eq!(sim.active_leg(), Some(1));
        assert!(sim.snapshot().direct_to.is_some());

        sim.set_active_leg(1).await.unwrap();
        assert!(sim.snapshot().direct_to.is_none());
        assert!(sim.set_active_leg(5).await.is_err());
    }
}
