use serde::{Deserialize, Serialize};

/// Nautical miles spanned by one great-arc radian on the Earth's surface
pub const NM_PER_GREAT_ARC_RADIAN: f64 = 3440.065;

/// Two points closer than this (in great-arc radians) are treated as the same point
pub const COINCIDENT_EPSILON: f64 = 1e-6;

/// A position on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another point, in great-arc radians (haversine)
    pub fn distance(&self, other: &GeoPoint) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Great-circle distance to another point, in nautical miles
    pub fn distance_nm(&self, other: &GeoPoint) -> f64 {
        radians_to_nm(self.distance(other))
    }

    pub fn coincides_with(&self, other: &GeoPoint) -> bool {
        self.distance(other) < COINCIDENT_EPSILON
    }
}

pub fn radians_to_nm(radians: f64) -> f64 {
    radians * NM_PER_GREAT_ARC_RADIAN
}

pub fn nm_to_radians(nm: f64) -> f64 {
    nm / NM_PER_GREAT_ARC_RADIAN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_degree_of_latitude_is_sixty_nm() {
        let a = GeoPoint::new(10.0, 20.0);
        let b = GeoPoint::new(11.0, 20.0);
        let nm = a.distance_nm(&b);
        assert!((nm - 60.04).abs() < 0.05, "got {nm}");
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let sea = GeoPoint::new(47.449, -122.309);
        let pdx = GeoPoint::new(45.589, -122.597);
        assert_eq!(sea.distance(&sea), 0.0);
        assert!((sea.distance(&pdx) - pdx.distance(&sea)).abs() < 1e-12);
        assert!(sea.coincides_with(&GeoPoint::new(47.449, -122.309)));
        assert!(!sea.coincides_with(&pdx));
    }

    #[test]
    fn test_unit_conversion_roundtrip() {
        assert!((radians_to_nm(nm_to_radians(123.4)) - 123.4).abs() < 1e-9);
    }
}
