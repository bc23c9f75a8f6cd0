use crate::navdata::Waypoint;

/// Ad hoc direct-to override; inactive until a destination is set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectTo {
    destination: Option<Waypoint>,
}

impl DirectTo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.destination.is_some()
    }

    pub fn destination(&self) -> Option<&Waypoint> {
        self.destination.as_ref()
    }

    pub fn activate(&mut self, destination: Waypoint) {
        self.destination = Some(destination);
    }

    pub fn deactivate(&mut self) {
        self.destination = None;
    }

    pub(crate) fn set(&mut self, destination: Option<Waypoint>) {
        self.destination = destination;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_by_default() {
        let mut dto = DirectTo::new();
        assert!(!dto.is_active());

        dto.activate(Waypoint::intersection("BTG", 45.81, -122.59));
        assert!(dto.is_active());
        assert_eq!(dto.destination().unwrap().icao, "BTG");

        dto.deactivate();
        assert!(dto.destination().is_none());
    }
}
