use super::SimulationError;

/// Parachute descent from the burst point down to the landing altitude.
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DescentInput {
    /// burst position; its altitude is where the descent starts
    pub start: crate::location::GeoPoint,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub landing_altitude: f64,
    pub payload_mass: f64,
    pub parachute_area: f64,
    pub drag_coefficient: f64,
    #[serde(default)]
    pub initial_velocity: f64,
    #[serde(default)]
    pub wind: crate::physics::wind::WindField,
    #[serde(default)]
    #[serde_as(as = "Option<serde_with::DurationSeconds<i64>>")]
    pub max_flight_time: Option<chrono::Duration>,
}

impl DescentInput {
    pub fn validate(&self) -> Result<(), SimulationError> {
        super::validate_position(&self.start)?;
        if !(self.start.altitude > 0.0) {
            return Err(SimulationError::InvalidBurstAltitude {
                altitude: self.start.altitude,
            });
        }
        if !(self.payload_mass > 0.0) {
            return Err(SimulationError::InvalidPayloadMass {
                mass: self.payload_mass,
            });
        }
        if !(self.parachute_area > 0.0) {
            return Err(SimulationError::InvalidParachuteArea {
                area: self.parachute_area,
            });
        }
        if !(self.drag_coefficient > 0.0) {
            return Err(SimulationError::InvalidDragCoefficient {
                drag_coefficient: self.drag_coefficient,
            });
        }
        if !(self.landing_altitude >= 0.0) {
            return Err(SimulationError::InvalidLandingAltitude {
                altitude: self.landing_altitude,
            });
        }
        if self.start.altitude <= self.landing_altitude {
            return Err(SimulationError::BurstBelowLanding {
                burst_altitude: self.start.altitude,
                landing_altitude: self.landing_altitude,
            });
        }
        super::validate_wind(&self.wind)?;
        super::step_limit(self.max_flight_time())?;
        Ok(())
    }

    pub fn max_flight_time(&self) -> chrono::Duration {
        self.max_flight_time.unwrap_or(*crate::DEFAULT_MAX_FLIGHT_TIME)
    }

    pub fn terminal_velocity_at(&self, altitude: f64) -> Result<f64, SimulationError> {
        let density = crate::physics::atmosphere::density(altitude)?;
        Ok(crate::physics::terminal_velocity(
            self.payload_mass,
            density,
            self.parachute_area,
            self.drag_coefficient,
        )?)
    }
}

pub fn calculate_descent(input: &DescentInput) -> Result<super::PhaseResult, SimulationError> {
    input.validate()?;
    let dt = super::TIME_STEP;
    let max_steps = super::step_limit(input.max_flight_time())?;
    let max_seconds = input.max_flight_time().num_seconds() as f64;

    let mut position = input.start;
    let mut velocity = input.initial_velocity.max(0.0);
    let mut max_velocity = velocity;
    let mut elapsed = 0.0;
    let mut wind_drift_distance = 0.0;
    let mut wind = input.wind.at(position.altitude)?;

    let point = |position: crate::location::GeoPoint,
                 elapsed: f64,
                 velocity: f64,
                 wind: crate::physics::wind::WindSample,
                 phase: crate::location::FlightPhase| {
        crate::location::TrajectoryPoint {
            position,
            time: input.start_time + crate::utilities::seconds_to_duration(elapsed),
            velocity,
            wind_speed: wind.speed,
            wind_direction: wind.direction,
            phase,
        }
    };

    let mut recorder = super::TrajectoryRecorder::new(point(
        position,
        elapsed,
        velocity,
        wind,
        crate::location::FlightPhase::Burst,
    ));

    let mut landed = false;
    while recorder.steps() < max_steps && elapsed < max_seconds {
        let density = crate::physics::atmosphere::density(position.altitude)?;
        velocity = crate::physics::descent_velocity(
            velocity,
            input.payload_mass,
            density,
            input.parachute_area,
            input.drag_coefficient,
            dt,
        );
        max_velocity = f64::max(max_velocity, velocity);

        let mut altitude = position.altitude - velocity * dt;
        if altitude <= input.landing_altitude {
            altitude = input.landing_altitude;
            landed = true;
        }

        wind = input.wind.at(altitude)?;
        position = crate::physics::wind::advance(&position, wind.speed, wind.direction, dt)
            .with_altitude(altitude);
        wind_drift_distance += crate::physics::wind::drift_distance_km(wind.speed, dt);
        elapsed += dt;

        if landed {
            break;
        }
        recorder.record(point(
            position,
            elapsed,
            velocity,
            wind,
            crate::location::FlightPhase::Descent,
        ));
    }

    if !landed {
        return Err(SimulationError::ConvergenceFailed {
            altitude: position.altitude,
            target_altitude: input.landing_altitude,
            elapsed,
        });
    }

    // reported once at the landing altitude rather than averaged over the descent
    let terminal_velocity = input.terminal_velocity_at(input.landing_altitude)?;
    let terminal = point(
        position,
        elapsed,
        velocity,
        wind,
        crate::location::FlightPhase::Landing,
    );
    let confidence = super::phase_confidence(true, recorder.mean_wind_speed());
    let steps = recorder.steps() + 1;

    Ok(super::PhaseResult {
        phase: crate::location::FlightPhase::Descent,
        trajectory: recorder.finish(terminal.clone()),
        terminal,
        duration: elapsed,
        max_velocity,
        wind_drift_distance,
        terminal_velocity,
        confidence,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FlightPhase, GeoPoint};
    use crate::utilities::approx_equal;

    fn input(wind_speed: f64) -> DescentInput {
        DescentInput {
            start: GeoPoint::new(40.7128, -74.0060, 30000.0),
            start_time: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            landing_altitude: 0.0,
            payload_mass: 1.0,
            parachute_area: 2.0,
            drag_coefficient: 1.2,
            initial_velocity: 0.0,
            wind: crate::physics::wind::WindField::constant(wind_speed, 90.0),
            max_flight_time: None,
        }
    }

    #[test]
    fn test_descent_scenario() {
        let input = input(10.0);
        let result = calculate_descent(&input).unwrap();

        assert!(result.duration > 0.0);
        assert!(result.terminal_velocity > 0.0);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.terminal.position.altitude, 0.0);
        assert_eq!(result.terminal.phase, FlightPhase::Landing);
        assert_eq!(result.trajectory.first().unwrap().phase, FlightPhase::Burst);

        let landing = result.terminal.position;
        assert!(
            !approx_equal(landing.latitude, input.start.latitude, 6)
                || !approx_equal(landing.longitude, input.start.longitude, 6)
        );
        assert!(landing.longitude > input.start.longitude);

        let expected_terminal = ((2.0_f64 * 1.0 * 9.81) / (1.225 * 2.0 * 1.2)).sqrt();
        assert!(approx_equal(result.terminal_velocity, expected_terminal, 9));
    }

    #[test]
    fn test_calm_descent_lands_below_burst() {
        let input = input(0.0);
        let result = calculate_descent(&input).unwrap();

        let landing = result.terminal.position;
        assert!(approx_equal(landing.latitude, input.start.latitude, 6));
        assert!(approx_equal(landing.longitude, input.start.longitude, 6));
        assert_eq!(result.wind_drift_distance, 0.0);
    }

    #[test]
    fn test_velocity_stays_near_terminal() {
        let result = calculate_descent(&input(0.0)).unwrap();

        // thin air at burst gives the fastest fall
        let fastest = input(0.0).terminal_velocity_at(30000.0).unwrap();
        assert!(result.max_velocity <= fastest + 1e-9);
        for point in &result.trajectory {
            assert!(point.velocity >= 0.0);
        }
    }

    #[test]
    fn test_larger_parachute_descends_slower() {
        let small = calculate_descent(&input(5.0)).unwrap();
        let mut large_input = input(5.0);
        large_input.parachute_area = 4.0;
        let large = calculate_descent(&large_input).unwrap();

        assert!(large.duration > small.duration);
        assert!(large.wind_drift_distance > small.wind_drift_distance);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let cases: Vec<(Box<dyn Fn(&mut DescentInput)>, &str)> = vec![
            (Box::new(|input| input.start.latitude = -90.5), "INVALID_LATITUDE"),
            (Box::new(|input| input.start.longitude = 180.5), "INVALID_LONGITUDE"),
            (Box::new(|input| input.start.altitude = 0.0), "INVALID_BURST_ALTITUDE"),
            (Box::new(|input| input.payload_mass = -1.0), "INVALID_PAYLOAD_MASS"),
            (Box::new(|input| input.parachute_area = 0.0), "INVALID_PARACHUTE_AREA"),
            (Box::new(|input| input.drag_coefficient = 0.0), "INVALID_DRAG_COEFFICIENT"),
            (Box::new(|input| input.landing_altitude = -10.0), "INVALID_LANDING_ALTITUDE"),
            (Box::new(|input| input.landing_altitude = 30000.0), "BURST_BELOW_LANDING"),
        ];

        for (modify, code) in cases {
            let mut invalid = input(10.0);
            modify(&mut invalid);
            let error = calculate_descent(&invalid).unwrap_err();
            assert_eq!(error.code(), code);
        }

        let mut invalid = input(10.0);
        invalid.landing_altitude = 30000.0;
        assert_eq!(
            calculate_descent(&invalid).unwrap_err().to_string(),
            "Burst altitude must be higher than landing altitude"
        );
    }
}
