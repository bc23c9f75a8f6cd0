//! Derived navigation queries.
//!
//! Each query comes in two forms: `*_cached` answers from the state of the last resync
//! without waiting, and the plain async form resyncs first. Both compute the answer the
//! same way. Distances are in nautical miles; `None` means "not applicable" (no active
//! leg, no destination, on the ground...), which is not the same as zero.

use std::time::Duration;
use tracing::warn;

use super::{FlightPlanManager, PlanState};
use crate::airplane::Airplane;
use crate::flight_plan::FlightPlanLeg;
use crate::geo::radians_to_nm;
use crate::navdata::Waypoint;

impl PlanState {
    pub(crate) fn active_leg(&self) -> Option<&FlightPlanLeg> {
        self.active_leg_cached.and_then(|i| self.active.leg(i))
    }

    /// Leg of the active plan terminating at the direct-to target
    pub(crate) fn direct_to_leg(&self) -> Option<&FlightPlanLeg> {
        let target = self.direct_to.destination()?;
        self.active.legs().find(|leg| &leg.fix == target)
    }

    /// The plan destination, unless a direct-to to an off-plan waypoint overrides it
    pub(crate) fn destination_waypoint(&self) -> Option<&Waypoint> {
        if self.direct_to.is_active() && self.direct_to_leg().is_none() {
            self.direct_to.destination()
        } else {
            self.active.destination_waypoint()
        }
    }

    /// Remaining distance to the active leg's fix, in great-arc radians
    pub(crate) fn distance_to_active_leg_fix(&self, airplane: &dyn Airplane) -> Option<f64> {
        let leg = self.active_leg()?;
        let position = airplane.position();

        if self.direct_to.is_active() {
            return Some(position.distance(&leg.fix.location));
        }

        // Steps up to and including the one the GPS is currently steering to are
        // counted as completed; the plane's distance to that step's endpoint is added back
        let next_waypoint = airplane.next_waypoint_position();
        let mut completed = 0.0;
        let mut current = None;
        for step in &leg.steps {
            completed += step.distance;
            current = Some(step);
            if next_waypoint.is_some_and(|p| step.endpoint.coincides_with(&p)) {
                break;
            }
        }

        let endpoint = current.map_or(leg.endpoint(), |s| s.endpoint);
        Some(leg.distance - completed + position.distance(&endpoint))
    }

    pub(crate) fn distance_to_destination(&self, airplane: &dyn Airplane) -> Option<f64> {
        if let Some(target) = self.direct_to.destination() {
            let mut distance = airplane.position().distance(&target.location);
            if let Some(leg) = self.direct_to_leg() {
                distance += self.active.total_distance() - leg.cumulative_distance;
            }
            return Some(distance);
        }

        if self.active.destination().is_none() {
            return None;
        }

        let to_fix = self.distance_to_active_leg_fix(airplane).unwrap_or(0.0);
        let after_fix = self.active.total_distance()
            - self.active_leg().map_or(0.0, |leg| leg.cumulative_distance);
        Some(to_fix + after_fix)
    }

    pub(crate) fn distance_to_direct_to(&self, airplane: &dyn Airplane) -> Option<f64> {
        let target = self.direct_to.destination()?;
        Some(airplane.position().distance(&target.location))
    }
}

/// Time to cover `distance_nm` at the current ground speed.
///
/// `None` on the ground, without a distance, or at a ground speed of zero or less.
fn time_to(airplane: &dyn Airplane, distance_nm: Option<f64>) -> Option<Duration> {
    if airplane.is_on_ground() {
        return None;
    }
    let distance_nm = distance_nm?;
    let ground_speed = airplane.ground_speed_knots();
    if ground_speed <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(distance_nm / ground_speed * 3600.0).ok()
}

impl FlightPlanManager {
    /// Resync before answering a fresh query; on failure answer from the last resync
    async fn refresh(&self) {
        if let Err(e) = self.sync_active_from_game(false).await {
            warn!(
                instrument = %self.inner.instrument_id,
                "Resync failed, answering from cached state: {}",
                e
            );
        }
    }

    fn airplane(&self) -> &dyn Airplane {
        self.inner.airplane.as_ref()
    }

    pub fn origin_waypoint_cached(&self) -> Option<Waypoint> {
        self.inner.read_state().active.origin_waypoint().cloned()
    }

    pub async fn origin_waypoint(&self) -> Option<Waypoint> {
        self.refresh().await;
        self.origin_waypoint_cached()
    }

    pub fn destination_waypoint_cached(&self) -> Option<Waypoint> {
        self.inner.read_state().destination_waypoint().cloned()
    }

    pub async fn destination_waypoint(&self) -> Option<Waypoint> {
        self.refresh().await;
        self.destination_waypoint_cached()
    }

    pub fn active_leg_cached(&self) -> Option<FlightPlanLeg> {
        self.inner.read_state().active_leg().cloned()
    }

    pub async fn active_leg(&self) -> Option<FlightPlanLeg> {
        self.refresh().await;
        self.active_leg_cached()
    }

    /// Index of the active leg in flight order
    pub fn active_leg_index_cached(&self) -> Option<usize> {
        self.inner.read_state().active_leg_cached
    }

    pub fn direct_to_leg_cached(&self) -> Option<FlightPlanLeg> {
        self.inner.read_state().direct_to_leg().cloned()
    }

    pub async fn direct_to_leg(&self) -> Option<FlightPlanLeg> {
        self.refresh().await;
        self.direct_to_leg_cached()
    }

    pub fn distance_to_active_leg_fix_cached(&self) -> Option<f64> {
        self.inner
            .read_state()
            .distance_to_active_leg_fix(self.airplane())
            .map(radians_to_nm)
    }

    pub async fn distance_to_active_leg_fix(&self) -> Option<f64> {
        self.refresh().await;
        self.distance_to_active_leg_fix_cached()
    }

    pub fn time_to_active_leg_fix_cached(&self) -> Option<Duration> {
        time_to(self.airplane(), self.distance_to_active_leg_fix_cached())
    }

    pub async fn time_to_active_leg_fix(&self) -> Option<Duration> {
        self.refresh().await;
        self.time_to_active_leg_fix_cached()
    }

    pub fn distance_to_destination_cached(&self) -> Option<f64> {
        self.inner
            .read_state()
            .distance_to_destination(self.airplane())
            .map(radians_to_nm)
    }

    pub async fn distance_to_destination(&self) -> Option<f64> {
        self.refresh().await;
        self.distance_to_destination_cached()
    }

    pub fn time_to_destination_cached(&self) -> Option<Duration> {
        time_to(self.airplane(), self.distance_to_destination_cached())
    }

    pub async fn time_to_destination(&self) -> Option<Duration> {
        self.refresh().await;
        self.time_to_destination_cached()
    }

    pub fn distance_to_direct_to_cached(&self) -> Option<f64> {
        self.inner
            .read_state()
            .distance_to_direct_to(self.airplane())
            .map(radians_to_nm)
    }

    pub async fn distance_to_direct_to(&self) -> Option<f64> {
        self.refresh().await;
        self.distance_to_direct_to_cached()
    }

    pub fn time_to_direct_to_cached(&self) -> Option<Duration> {
        time_to(self.airplane(), self.distance_to_direct_to_cached())
    }

    pub async fn time_to_direct_to(&self) -> Option<Duration> {
        self.refresh().await;
        self.time_to_direct_to_cached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airplane::{AirplaneTelemetry, SimulatedAirplane};
    use crate::geo::GeoPoint;
    use crate::simulator::{GameFlightPlan, GameLeg};

    fn airborne(lat: f64, lon: f64, ground_speed_knots: f64) -> SimulatedAirplane {
        SimulatedAirplane::new(AirplaneTelemetry {
            position: GeoPoint::new(lat, lon),
            ground_speed_knots,
            on_ground: false,
            next_waypoint: None,
        })
    }

    /// ORIG (0,0) -> AAA (0,1) -> BBB (0,2) -> DEST (0,3) along the equator
    fn equator_plan() -> PlanState {
        let game = GameFlightPlan {
            origin: Some(Waypoint::airport("ORIG", 0.0, 0.0)),
            enroute: vec![
                GameLeg::direct(Waypoint::intersection("AAA", 0.0, 1.0)),
                GameLeg::direct(Waypoint::intersection("BBB", 0.0, 2.0)),
            ],
            destination: Some(Waypoint::airport("DEST", 0.0, 3.0)),
            ..Default::default()
        };
        let mut state = PlanState::default();
        state.active.apply_game_snapshot(&game, true);
        state
    }

    fn degree() -> f64 {
        GeoPoint::new(0.0, 0.0).distance(&GeoPoint::new(0.0, 1.0))
    }

    #[test]
    fn test_no_active_leg_means_no_distance() {
        let state = equator_plan();
        let plane = airborne(0.0, 0.5, 120.0);
        assert_eq!(state.distance_to_active_leg_fix(&plane), None);
        // Whole plan remains when no leg is active
        let total = state.distance_to_destination(&plane).unwrap();
        assert!((total - 3.0 * degree()).abs() < 1e-9);
    }

    #[test]
    fn test_distance_to_destination_along_plan() {
        let mut state = equator_plan();
        state.active_leg_cached = Some(1);
        let plane = airborne(0.0, 0.5, 120.0);

        let to_fix = state.distance_to_active_leg_fix(&plane).unwrap();
        assert!((to_fix - 0.5 * degree()).abs() < 1e-9);

        let to_dest = state.distance_to_destination(&plane).unwrap();
        assert!((to_dest - 2.5 * degree()).abs() < 1e-9);
    }

    #[test]
    fn test_gps_next_waypoint_selects_path_step() {
        let game = GameFlightPlan {
            origin: Some(Waypoint::airport("ORIG", 0.0, 0.0)),
            enroute: vec![GameLeg {
                fix: Waypoint::intersection("ARC", 0.0, 2.0),
                path: vec![GeoPoint::new(0.0, 1.0)],
            }],
            ..Default::default()
        };
        let mut state = PlanState::default();
        state.active.apply_game_snapshot(&game, true);
        state.active_leg_cached = Some(1);

        // Steering to the intermediate point: its step counts, the step after it remains
        let plane = SimulatedAirplane::new(AirplaneTelemetry {
            position: GeoPoint::new(0.0, 0.25),
            ground_speed_knots: 100.0,
            on_ground: false,
            next_waypoint: Some(GeoPoint::new(0.0, 1.0)),
        });
        let distance = state.distance_to_active_leg_fix(&plane).unwrap();
        assert!((distance - 1.75 * degree()).abs() < 1e-9);
    }

    #[test]
    fn test_direct_to_target_in_plan_adds_remaining_plan() {
        let mut state = equator_plan();
        let aaa = state.active.leg(1).unwrap().fix.clone();
        state.direct_to.activate(aaa);
        state.active_leg_cached = Some(1);
        let plane = airborne(1.0, 0.0, 120.0);

        let direct = plane.position().distance(&GeoPoint::new(0.0, 1.0));
        let to_dest = state.distance_to_destination(&plane).unwrap();
        assert!((to_dest - (direct + 2.0 * degree())).abs() < 1e-9);
        assert_eq!(state.distance_to_active_leg_fix(&plane), Some(direct));
        assert_eq!(state.destination_waypoint().unwrap().icao, "DEST");
    }

    #[test]
    fn test_direct_to_off_plan_replaces_destination() {
        let mut state = equator_plan();
        state
            .direct_to
            .activate(Waypoint::intersection("OFF", 5.0, 5.0));
        let plane = airborne(5.0, 4.0, 120.0);

        assert_eq!(state.destination_waypoint().unwrap().icao, "OFF");
        assert!(state.direct_to_leg().is_none());
        let to_dest = state.distance_to_destination(&plane).unwrap();
        assert_eq!(Some(to_dest), state.distance_to_direct_to(&plane));
    }

    #[test]
    fn test_time_policy() {
        let one_hour_nm = 120.0;
        assert_eq!(
            time_to(&airborne(0.0, 0.0, 120.0), Some(one_hour_nm)),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(time_to(&airborne(0.0, 0.0, 0.0), Some(one_hour_nm)), None);
        assert_eq!(time_to(&airborne(0.0, 0.0, -5.0), Some(one_hour_nm)), None);
        assert_eq!(time_to(&airborne(0.0, 0.0, 120.0), None), None);

        let parked = SimulatedAirplane::new(AirplaneTelemetry {
            ground_speed_knots: 120.0,
            on_ground: true,
            ..Default::default()
        });
        assert_eq!(time_to(&parked, Some(one_hour_nm)), None);
    }
}
