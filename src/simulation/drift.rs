use super::SimulationError;

/// Horizontal drift at constant altitude for a fixed duration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WindDriftInput {
    pub start: crate::location::GeoPoint,
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub wind: crate::physics::wind::WindField,
    /// seconds
    pub duration: f64,
    #[serde(default = "default_phase")]
    pub phase: crate::location::FlightPhase,
}

fn default_phase() -> crate::location::FlightPhase {
    crate::location::FlightPhase::Ascent
}

impl WindDriftInput {
    pub fn validate(&self) -> Result<(), SimulationError> {
        super::validate_position(&self.start)?;
        if !(self.duration >= 0.0) {
            return Err(SimulationError::InvalidDuration {
                seconds: self.duration,
            });
        }
        super::validate_wind(&self.wind)
    }
}

pub fn calculate_wind_drift(input: &WindDriftInput) -> Result<super::PhaseResult, SimulationError> {
    input.validate()?;

    let altitude = input.start.altitude;
    let wind = input.wind.at(altitude)?;
    let point = |position: crate::location::GeoPoint, elapsed: f64| {
        crate::location::TrajectoryPoint {
            position,
            time: input.start_time + crate::utilities::seconds_to_duration(elapsed),
            velocity: 0.0,
            wind_speed: wind.speed,
            wind_direction: wind.direction,
            phase: input.phase,
        }
    };

    let mut position = input.start;
    let mut elapsed = 0.0;
    let mut recorder = super::TrajectoryRecorder::new(point(position, elapsed));
    while elapsed < input.duration {
        let dt = f64::min(super::TIME_STEP, input.duration - elapsed);
        position = crate::physics::wind::advance(&position, wind.speed, wind.direction, dt);
        elapsed += dt;
        recorder.record(point(position, elapsed));
    }

    let terminal = point(position, elapsed);
    let confidence = super::phase_confidence(true, wind.speed);
    let steps = recorder.steps();

    Ok(super::PhaseResult {
        phase: input.phase,
        trajectory: recorder.finish(terminal.clone()),
        terminal,
        duration: elapsed,
        max_velocity: 0.0,
        wind_drift_distance: crate::physics::wind::drift_distance_km(wind.speed, elapsed),
        terminal_velocity: 0.0,
        confidence,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeoPoint;
    use crate::utilities::approx_equal;

    fn input(speed: f64, direction: f64, duration: f64) -> WindDriftInput {
        WindDriftInput {
            start: GeoPoint::new(40.0, -105.0, 5000.0),
            start_time: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            wind: crate::physics::wind::WindField::constant(speed, direction),
            duration,
            phase: crate::location::FlightPhase::Ascent,
        }
    }

    #[test]
    fn test_zero_wind() {
        let input = input(0.0, 270.0, 3600.0);
        let result = calculate_wind_drift(&input).unwrap();

        assert_eq!(result.terminal.position, input.start);
        assert_eq!(result.wind_drift_distance, 0.0);
        assert_eq!(result.duration, 3600.0);
    }

    #[test]
    fn test_drift_distance() {
        let input = input(10.0, 0.0, 600.0);
        let result = calculate_wind_drift(&input).unwrap();

        assert!(approx_equal(result.wind_drift_distance, 6.0, 9));
        assert!(result.terminal.position.latitude > input.start.latitude);
        assert_eq!(result.terminal.position.altitude, input.start.altitude);

        // great-circle displacement agrees with speed times time
        let distance = input.start.ground_distance(&result.terminal.position);
        assert!((distance - 6000.0).abs() < 10.0);
    }

    #[test]
    fn test_fractional_duration() {
        let result = calculate_wind_drift(&input(5.0, 90.0, 2.5)).unwrap();
        assert_eq!(result.duration, 2.5);
        assert_eq!(result.steps, 3);
    }

    #[test]
    fn test_rejects_negative_duration() {
        let error = calculate_wind_drift(&input(5.0, 90.0, -1.0)).unwrap_err();
        assert_eq!(error.code(), "INVALID_DURATION");
    }
}
