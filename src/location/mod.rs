pub mod track;

/// geographic position with altitude above mean sea level in meters
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn with_altitude(&self, altitude: f64) -> Self {
        Self {
            altitude,
            ..*self
        }
    }

    pub fn point(&self) -> geo::Point {
        geo::point!(x: self.longitude, y: self.latitude)
    }

    /// great-circle distance over the ground, in meters
    pub fn ground_distance(&self, other: &Self) -> f64 {
        use geo::HaversineDistance;
        self.point().haversine_distance(&other.point())
    }

    pub fn has_valid_coordinates(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn approx_eq(&self, other: &Self, decimal_precision: u8) -> bool {
        crate::utilities::approx_equal(self.latitude, other.latitude, decimal_precision)
            && crate::utilities::approx_equal(self.longitude, other.longitude, decimal_precision)
            && crate::utilities::approx_equal(self.altitude, other.altitude, decimal_precision)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.5}, {:.5}, {:.1} m)",
            self.latitude, self.longitude, self.altitude
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    Ascent,
    Burst,
    Descent,
    Landing,
}

impl std::fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ascent => "ascent",
            Self::Burst => "burst",
            Self::Descent => "descent",
            Self::Landing => "landing",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrajectoryPoint {
    pub position: GeoPoint,
    pub time: chrono::DateTime<chrono::Utc>,
    /// vertical speed magnitude in m/s
    pub velocity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub phase: FlightPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(GeoPoint::new(90.0, -180.0, 0.0).has_valid_coordinates());
        assert!(!GeoPoint::new(90.1, 0.0, 0.0).has_valid_coordinates());
        assert!(!GeoPoint::new(0.0, 180.5, 0.0).has_valid_coordinates());
    }

    #[test]
    fn test_ground_distance() {
        let start = GeoPoint::new(0.0, 0.0, 0.0);
        let end = GeoPoint::new(0.0, 1.0, 10000.0);

        // one degree of longitude on the equator
        let distance = start.ground_distance(&end);
        assert!((distance - 111_195.0).abs() < 200.0);
        assert_eq!(start.ground_distance(&start), 0.0);
    }
}
