pub fn overground_distances(trajectory: &[crate::location::TrajectoryPoint]) -> Vec<f64> {
    trajectory
        .windows(2)
        .map(|pair| pair[0].position.ground_distance(&pair[1].position))
        .collect()
}

/// Haversine length of the ground track, in meters
pub fn total_distance(trajectory: &[crate::location::TrajectoryPoint]) -> f64 {
    overground_distances(trajectory).iter().sum()
}

pub fn max_altitude(trajectory: &[crate::location::TrajectoryPoint]) -> Option<f64> {
    trajectory
        .iter()
        .map(|point| point.position.altitude)
        .max_by(|a, b| a.total_cmp(b))
}

pub fn mean_wind_speed(trajectory: &[crate::location::TrajectoryPoint]) -> Option<f64> {
    if trajectory.is_empty() {
        return None;
    }
    Some(trajectory.iter().map(|point| point.wind_speed).sum::<f64>() / trajectory.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FlightPhase, GeoPoint, TrajectoryPoint};

    fn point(seconds: i64, latitude: f64, altitude: f64, velocity: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            position: GeoPoint::new(latitude, -77.5, altitude),
            time: chrono::DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap(),
            velocity,
            wind_speed: 4.0,
            wind_direction: 90.0,
            phase: FlightPhase::Ascent,
        }
    }

    #[test]
    fn test_track_metrics() {
        let track = vec![
            point(0, 39.0, 100.0, 0.0),
            point(60, 39.01, 400.0, 5.0),
            point(120, 39.02, 700.0, 5.2),
        ];

        assert_eq!(max_altitude(&track), Some(700.0));
        assert_eq!(mean_wind_speed(&track), Some(4.0));

        // 0.02 degrees of latitude
        assert!((total_distance(&track) - 2_224.0).abs() < 5.0);
    }

    #[test]
    fn test_empty_track() {
        assert_eq!(max_altitude(&[]), None);
        assert_eq!(mean_wind_speed(&[]), None);
        assert_eq!(total_distance(&[]), 0.0);
    }
}
