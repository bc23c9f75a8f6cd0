use crate::geo::GeoPoint;
use crate::navdata::Waypoint;
use crate::simulator::GameLeg;

use super::Segment;

/// One great-arc piece of a leg's path
#[derive(Debug, Clone, PartialEq)]
pub struct LegStep {
    pub endpoint: GeoPoint,
    /// Length of this step in great-arc radians
    pub distance: f64,
}

/// A flight plan leg terminating at `fix`
///
/// Distances are in great-arc radians and are maintained by the owning
/// [`FlightPlan`](super::FlightPlan); they are zero on a detached leg.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightPlanLeg {
    pub fix: Waypoint,
    pub segment: Segment,
    /// Intermediate path points flown before reaching the fix
    pub path: Vec<GeoPoint>,
    pub steps: Vec<LegStep>,
    pub distance: f64,
    /// Distance from the start of the flight plan to this leg's fix
    pub cumulative_distance: f64,
}

impl FlightPlanLeg {
    pub fn new(fix: Waypoint, segment: Segment) -> Self {
        let endpoint = fix.location;
        Self {
            fix,
            segment,
            path: Vec::new(),
            steps: vec![LegStep {
                endpoint,
                distance: 0.0,
            }],
            distance: 0.0,
            cumulative_distance: 0.0,
        }
    }

    pub fn from_game(leg: &GameLeg, segment: Segment) -> Self {
        let mut this = Self::new(leg.fix.clone(), segment);
        this.path = leg.path.clone();
        this
    }

    pub fn endpoint(&self) -> GeoPoint {
        self.fix.location
    }

    /// Rebuild the steps from `start` (the previous leg's terminator, if any) and
    /// return the leg length
    pub(super) fn recompute(&mut self, start: Option<GeoPoint>, cumulative_before: f64) -> f64 {
        let mut previous = start;
        self.steps = self
            .path
            .iter()
            .copied()
            .chain(std::iter::once(self.fix.location))
            .map(|endpoint| {
                let distance = previous.map(|p| p.distance(&endpoint)).unwrap_or(0.0);
                previous = Some(endpoint);
                LegStep { endpoint, distance }
            })
            .collect();

        self.distance = self.steps.iter().map(|s| s.distance).sum();
        self.cumulative_distance = cumulative_before + self.distance;
        self.distance
    }
}

/// Legs joined along a named airway
#[derive(Debug, Clone, PartialEq)]
pub struct AirwaySequence {
    pub airway_name: String,
    pub legs: Vec<FlightPlanLeg>,
}

impl AirwaySequence {
    pub fn exit(&self) -> Option<&Waypoint> {
        self.legs.last().map(|l| &l.fix)
    }
}

/// An element of the enroute segment
#[derive(Debug, Clone, PartialEq)]
pub enum FlightPlanElement {
    Leg(FlightPlanLeg),
    AirwaySequence(AirwaySequence),
}

impl FlightPlanElement {
    pub fn legs(&self) -> &[FlightPlanLeg] {
        match self {
            FlightPlanElement::Leg(leg) => std::slice::from_ref(leg),
            FlightPlanElement::AirwaySequence(sequence) => &sequence.legs,
        }
    }

    pub(super) fn legs_mut(&mut self) -> &mut [FlightPlanLeg] {
        match self {
            FlightPlanElement::Leg(leg) => std::slice::from_mut(leg),
            FlightPlanElement::AirwaySequence(sequence) => &mut sequence.legs,
        }
    }

    pub fn leg_count(&self) -> usize {
        self.legs().len()
    }

    /// Same variant over the same fixes, ignoring computed distances
    pub fn same_route(&self, other: &FlightPlanElement) -> bool {
        let same_kind = match (self, other) {
            (FlightPlanElement::Leg(_), FlightPlanElement::Leg(_)) => true,
            (FlightPlanElement::AirwaySequence(a), FlightPlanElement::AirwaySequence(b)) => {
                a.airway_name == b.airway_name
            }
            _ => false,
        };
        same_kind
            && self.leg_count() == other.leg_count()
            && self
                .legs()
                .iter()
                .zip(other.legs())
                .all(|(a, b)| a.fix == b.fix)
    }

    /// Short label for logs and the console
    pub fn describe(&self) -> String {
        match self {
            FlightPlanElement::Leg(leg) => leg.fix.ident.clone(),
            FlightPlanElement::AirwaySequence(sequence) => format!(
                "{}.{}",
                sequence.airway_name,
                sequence.exit().map(|w| w.ident.as_str()).unwrap_or("?")
            ),
        }
    }
}
