//! Local flight plan model held by each manager.
//!
//! A flight plan is made of six segments flown in order: origin, departure, enroute,
//! arrival, approach and destination. Only the enroute segment is edited locally; the
//! others are always taken from the simulator on resync.

mod leg;

pub use leg::{AirwaySequence, FlightPlanElement, FlightPlanLeg, LegStep};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, invalid_argument};
use crate::geo::radians_to_nm;
use crate::navdata::Waypoint;
use crate::simulator::{GameFlightPlan, GameProcedure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Origin,
    Departure,
    Enroute,
    Arrival,
    Approach,
    Destination,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Origin => write!(f, "origin"),
            Segment::Departure => write!(f, "departure"),
            Segment::Enroute => write!(f, "enroute"),
            Segment::Arrival => write!(f, "arrival"),
            Segment::Approach => write!(f, "approach"),
            Segment::Destination => write!(f, "destination"),
        }
    }
}

/// A loaded departure, arrival or approach with the indices it was loaded with
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureSegment {
    pub name: String,
    pub procedure_index: i32,
    /// Enroute transition for departures/arrivals, approach transition for approaches
    pub transition_index: i32,
    pub runway_transition_index: i32,
    pub legs: Vec<FlightPlanLeg>,
}

impl ProcedureSegment {
    fn from_game(procedure: &GameProcedure, segment: Segment) -> Self {
        Self {
            name: procedure.name.clone(),
            procedure_index: procedure.procedure_index,
            transition_index: procedure.transition_index,
            runway_transition_index: procedure.runway_transition_index,
            legs: procedure
                .legs
                .iter()
                .map(|l| FlightPlanLeg::from_game(l, segment))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightPlan {
    origin: Option<FlightPlanLeg>,
    departure: Option<ProcedureSegment>,
    enroute: Vec<FlightPlanElement>,
    arrival: Option<ProcedureSegment>,
    approach: Option<ProcedureSegment>,
    destination: Option<FlightPlanLeg>,
}

impl FlightPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<&FlightPlanLeg> {
        self.origin.as_ref()
    }

    pub fn origin_waypoint(&self) -> Option<&Waypoint> {
        self.origin.as_ref().map(|l| &l.fix)
    }

    pub fn destination(&self) -> Option<&FlightPlanLeg> {
        self.destination.as_ref()
    }

    pub fn destination_waypoint(&self) -> Option<&Waypoint> {
        self.destination.as_ref().map(|l| &l.fix)
    }

    pub fn is_origin_airport(&self) -> bool {
        self.origin_waypoint().is_some_and(Waypoint::is_airport)
    }

    pub fn is_destination_airport(&self) -> bool {
        self.destination_waypoint().is_some_and(Waypoint::is_airport)
    }

    pub fn departure(&self) -> Option<&ProcedureSegment> {
        self.departure.as_ref()
    }

    pub fn arrival(&self) -> Option<&ProcedureSegment> {
        self.arrival.as_ref()
    }

    pub fn approach(&self) -> Option<&ProcedureSegment> {
        self.approach.as_ref()
    }

    pub fn enroute(&self) -> &[FlightPlanElement] {
        &self.enroute
    }

    pub fn set_origin(&mut self, waypoint: Option<Waypoint>) {
        self.origin = waypoint.map(|w| FlightPlanLeg::new(w, Segment::Origin));
        self.recompute_distances();
    }

    pub fn set_destination(&mut self, waypoint: Option<Waypoint>) {
        self.destination = waypoint.map(|w| FlightPlanLeg::new(w, Segment::Destination));
        self.recompute_distances();
    }

    /// Every leg in flight order, airway sequences flattened
    pub fn legs(&self) -> impl Iterator<Item = &FlightPlanLeg> {
        self.origin
            .iter()
            .chain(self.departure.iter().flat_map(|p| p.legs.iter()))
            .chain(self.enroute.iter().flat_map(|e| e.legs().iter()))
            .chain(self.arrival.iter().flat_map(|p| p.legs.iter()))
            .chain(self.approach.iter().flat_map(|p| p.legs.iter()))
            .chain(self.destination.iter())
    }

    fn legs_mut(&mut self) -> impl Iterator<Item = &mut FlightPlanLeg> {
        self.origin
            .iter_mut()
            .chain(self.departure.iter_mut().flat_map(|p| p.legs.iter_mut()))
            .chain(self.enroute.iter_mut().flat_map(|e| e.legs_mut().iter_mut()))
            .chain(self.arrival.iter_mut().flat_map(|p| p.legs.iter_mut()))
            .chain(self.approach.iter_mut().flat_map(|p| p.legs.iter_mut()))
            .chain(self.destination.iter_mut())
    }

    pub fn leg_count(&self) -> usize {
        self.legs().count()
    }

    pub fn leg(&self, index: usize) -> Option<&FlightPlanLeg> {
        self.legs().nth(index)
    }

    /// Total path length in great-arc radians
    pub fn total_distance(&self) -> f64 {
        self.legs().last().map(|l| l.cumulative_distance).unwrap_or(0.0)
    }

    pub fn total_distance_nm(&self) -> f64 {
        radians_to_nm(self.total_distance())
    }

    /// Number of enroute legs preceding the enroute element at `index`
    pub fn enroute_leg_offset(&self, index: usize) -> usize {
        self.enroute.iter().take(index).map(|e| e.leg_count()).sum()
    }

    pub fn enroute_fix_icaos(&self) -> Vec<&str> {
        self.enroute
            .iter()
            .flat_map(|e| e.legs().iter())
            .map(|l| l.fix.icao.as_str())
            .collect()
    }

    fn ensure_enroute(segment: Segment, what: &str) -> Result<()> {
        if segment != Segment::Enroute {
            return Err(invalid_argument(format!(
                "Cannot {what} a non-enroute segment ({segment})"
            )));
        }
        Ok(())
    }

    fn insertion_index(&self, index: Option<usize>) -> Result<usize> {
        match index {
            None => Ok(self.enroute.len()),
            Some(i) if i <= self.enroute.len() => Ok(i),
            Some(i) => Err(invalid_argument(format!(
                "Enroute index {i} out of range (len {})",
                self.enroute.len()
            ))),
        }
    }

    /// Insert a single waypoint leg; returns the element index it landed at
    pub fn insert_waypoint(
        &mut self,
        segment: Segment,
        waypoint: Waypoint,
        index: Option<usize>,
    ) -> Result<usize> {
        Self::ensure_enroute(segment, "add waypoint to")?;
        let at = self.insertion_index(index)?;
        self.enroute.insert(
            at,
            FlightPlanElement::Leg(FlightPlanLeg::new(waypoint, Segment::Enroute)),
        );
        self.recompute_distances();
        Ok(at)
    }

    /// Insert an airway sequence made of `path` (entry excluded, exit included)
    pub fn insert_airway(
        &mut self,
        segment: Segment,
        airway_name: &str,
        path: Vec<Waypoint>,
        index: Option<usize>,
    ) -> Result<usize> {
        Self::ensure_enroute(segment, "add airway to")?;
        if path.is_empty() {
            return Err(invalid_argument(format!("Empty path along airway {airway_name}")));
        }
        let at = self.insertion_index(index)?;
        let sequence = AirwaySequence {
            airway_name: airway_name.to_string(),
            legs: path
                .into_iter()
                .map(|w| FlightPlanLeg::new(w, Segment::Enroute))
                .collect(),
        };
        self.enroute.insert(at, FlightPlanElement::AirwaySequence(sequence));
        self.recompute_distances();
        Ok(at)
    }

    /// Remove `count` elements starting at `index`
    pub fn remove_by_index(
        &mut self,
        segment: Segment,
        index: usize,
        count: usize,
    ) -> Result<Vec<FlightPlanElement>> {
        Self::ensure_enroute(segment, "remove elements from")?;
        let end = index.saturating_add(count);
        if end > self.enroute.len() {
            return Err(invalid_argument(format!(
                "Enroute range {index}..{end} out of range (len {})",
                self.enroute.len()
            )));
        }
        let removed: Vec<_> = self.enroute.drain(index..end).collect();
        self.recompute_distances();
        Ok(removed)
    }

    pub fn remove_enroute_element(&mut self, index: usize) -> Option<FlightPlanElement> {
        if index >= self.enroute.len() {
            return None;
        }
        let removed = self.enroute.remove(index);
        self.recompute_distances();
        Some(removed)
    }

    pub fn clear_enroute(&mut self) {
        self.enroute.clear();
        self.recompute_distances();
    }

    /// Replace this plan's contents with a copy of `other`
    pub fn copy_from(&mut self, other: &FlightPlan) {
        *self = other.clone();
    }

    /// Replace the plan from a simulator snapshot.
    ///
    /// The enroute segment is only replaced when `force_enroute_sync` is set or its
    /// fixes no longer match the simulator's, so locally built airway sequences
    /// survive a resync that agrees with them. Returns whether the enroute was replaced.
    pub fn apply_game_snapshot(&mut self, game: &GameFlightPlan, force_enroute_sync: bool) -> bool {
        self.origin = game
            .origin
            .clone()
            .map(|w| FlightPlanLeg::new(w, Segment::Origin));
        self.departure = game
            .departure
            .as_ref()
            .map(|p| ProcedureSegment::from_game(p, Segment::Departure));
        self.arrival = game
            .arrival
            .as_ref()
            .map(|p| ProcedureSegment::from_game(p, Segment::Arrival));
        self.approach = game
            .approach
            .as_ref()
            .map(|p| ProcedureSegment::from_game(p, Segment::Approach));
        self.destination = game
            .destination
            .clone()
            .map(|w| FlightPlanLeg::new(w, Segment::Destination));

        let game_fixes: Vec<&str> = game.enroute.iter().map(|l| l.fix.icao.as_str()).collect();
        let replace = force_enroute_sync || self.enroute_fix_icaos() != game_fixes;
        if replace {
            self.enroute = game
                .enroute
                .iter()
                .map(|l| FlightPlanElement::Leg(FlightPlanLeg::from_game(l, Segment::Enroute)))
                .collect();
        }

        self.recompute_distances();
        replace
    }

    fn recompute_distances(&mut self) {
        let mut previous = None;
        let mut cumulative = 0.0;
        for leg in self.legs_mut() {
            cumulative += leg.recompute(previous, cumulative);
            previous = Some(leg.endpoint());
        }
    }
}

impl fmt::Display for FlightPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(origin) = &self.origin {
            parts.push(origin.fix.ident.clone());
        }
        if let Some(departure) = &self.departure {
            parts.push(format!("[{}]", departure.name));
        }
        parts.extend(self.enroute.iter().map(FlightPlanElement::describe));
        if let Some(arrival) = &self.arrival {
            parts.push(format!("[{}]", arrival.name));
        }
        if let Some(approach) = &self.approach {
            parts.push(format!("[{}]", approach.name));
        }
        if let Some(destination) = &self.destination {
            parts.push(destination.fix.ident.clone());
        }

        if parts.is_empty() {
            write!(f, "(empty)")
        } else {
            write!(f, "{} ({:.1} nm)", parts.join(" "), self.total_distance_nm())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::simulator::GameLeg;

    fn wp(icao: &str, lat: f64, lon: f64) -> Waypoint {
        Waypoint::intersection(icao, lat, lon)
    }

    fn game_leg(icao: &str, lat: f64, lon: f64) -> GameLeg {
        GameLeg {
            fix: wp(icao, lat, lon),
            path: Vec::new(),
        }
    }

    #[test]
    fn test_cumulative_distances_follow_leg_order() {
        let mut plan = FlightPlan::new();
        plan.set_origin(Some(Waypoint::airport("ORIG", 0.0, 0.0)));
        plan.insert_waypoint(Segment::Enroute, wp("AAA", 1.0, 0.0), None)
            .unwrap();
        plan.insert_waypoint(Segment::Enroute, wp("BBB", 2.0, 0.0), None)
            .unwrap();
        plan.set_destination(Some(Waypoint::airport("DEST", 3.0, 0.0)));

        let legs: Vec<_> = plan.legs().collect();
        assert_eq!(legs.len(), 4);
        assert_eq!(legs[0].cumulative_distance, 0.0);
        let one_degree = GeoPoint::new(0.0, 0.0).distance(&GeoPoint::new(1.0, 0.0));
        assert!((legs[1].cumulative_distance - one_degree).abs() < 1e-9);
        assert!((plan.total_distance() - 3.0 * one_degree).abs() < 1e-9);
    }

    #[test]
    fn test_insert_rejects_non_enroute_segment() {
        let mut plan = FlightPlan::new();
        let err = plan
            .insert_waypoint(Segment::Departure, wp("AAA", 1.0, 0.0), None)
            .unwrap_err();
        assert!(err.to_string().contains("non-enroute"));
        assert!(plan.enroute().is_empty());
    }

    #[test]
    fn test_insert_at_index_and_remove_range() {
        let mut plan = FlightPlan::new();
        plan.insert_waypoint(Segment::Enroute, wp("AAA", 1.0, 0.0), None)
            .unwrap();
        plan.insert_waypoint(Segment::Enroute, wp("CCC", 3.0, 0.0), None)
            .unwrap();
        let at = plan
            .insert_waypoint(Segment::Enroute, wp("BBB", 2.0, 0.0), Some(1))
            .unwrap();
        assert_eq!(at, 1);
        assert_eq!(plan.enroute_fix_icaos(), vec!["AAA", "BBB", "CCC"]);

        assert!(
            plan.insert_waypoint(Segment::Enroute, wp("ZZZ", 0.0, 0.0), Some(9))
                .is_err()
        );

        let removed = plan.remove_by_index(Segment::Enroute, 0, 2).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(plan.enroute_fix_icaos(), vec!["CCC"]);
        assert!(plan.remove_by_index(Segment::Enroute, 0, 2).is_err());
    }

    #[test]
    fn test_airway_sequence_counts_as_one_element() {
        let mut plan = FlightPlan::new();
        plan.insert_waypoint(Segment::Enroute, wp("ENTER", 1.0, 0.0), None)
            .unwrap();
        plan.insert_airway(
            Segment::Enroute,
            "J5",
            vec![wp("MID", 2.0, 0.0), wp("EXIT", 3.0, 0.0)],
            None,
        )
        .unwrap();
        plan.insert_waypoint(Segment::Enroute, wp("AFTER", 4.0, 0.0), None)
            .unwrap();

        assert_eq!(plan.enroute().len(), 3);
        assert_eq!(plan.leg_count(), 4);
        assert_eq!(plan.enroute_leg_offset(2), 3);
        assert_eq!(plan.enroute()[1].describe(), "J5.EXIT");
    }

    #[test]
    fn test_snapshot_keeps_matching_enroute_structure() {
        let mut plan = FlightPlan::new();
        plan.insert_airway(
            Segment::Enroute,
            "J5",
            vec![wp("MID", 2.0, 0.0), wp("EXIT", 3.0, 0.0)],
            None,
        )
        .unwrap();

        let game = GameFlightPlan {
            enroute: vec![game_leg("MID", 2.0, 0.0), game_leg("EXIT", 3.0, 0.0)],
            destination: Some(Waypoint::airport("DEST", 4.0, 0.0)),
            ..Default::default()
        };

        assert!(!plan.apply_game_snapshot(&game, false));
        assert!(matches!(
            plan.enroute()[0],
            FlightPlanElement::AirwaySequence(_)
        ));
        assert_eq!(plan.destination_waypoint().unwrap().icao, "DEST");

        assert!(plan.apply_game_snapshot(&game, true));
        assert_eq!(plan.enroute().len(), 2);
        assert!(matches!(plan.enroute()[0], FlightPlanElement::Leg(_)));
    }

    #[test]
    fn test_snapshot_replaces_diverged_enroute() {
        let mut plan = FlightPlan::new();
        plan.insert_waypoint(Segment::Enroute, wp("OLD", 1.0, 0.0), None)
            .unwrap();

        let game = GameFlightPlan {
            enroute: vec![game_leg("NEW", 2.0, 0.0)],
            ..Default::default()
        };
        assert!(plan.apply_game_snapshot(&game, false));
        assert_eq!(plan.enroute_fix_icaos(), vec!["NEW"]);
    }

    #[test]
    fn test_leg_path_points_become_steps() {
        let mut plan = FlightPlan::new();
        plan.set_origin(Some(Waypoint::airport("ORIG", 0.0, 0.0)));
        let game = GameFlightPlan {
            origin: Some(Waypoint::airport("ORIG", 0.0, 0.0)),
            enroute: vec![GameLeg {
                fix: wp("ARC", 0.0, 2.0),
                path: vec![GeoPoint::new(0.5, 1.0)],
            }],
            ..Default::default()
        };
        plan.apply_game_snapshot(&game, true);

        let leg = plan.leg(1).unwrap();
        assert_eq!(leg.steps.len(), 2);
        let sum: f64 = leg.steps.iter().map(|s| s.distance).sum();
        assert!((leg.distance - sum).abs() < 1e-12);
        assert!(leg.distance > GeoPoint::new(0.0, 0.0).distance(&GeoPoint::new(0.0, 2.0)));
    }
}
