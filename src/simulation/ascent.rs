use super::SimulationError;

/// Buoyant ascent from the launch site toward the burst altitude.
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AscentInput {
    pub launch: crate::location::GeoPoint,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub burst_altitude: f64,
    pub payload_mass: f64,
    #[serde(default)]
    pub balloon_mass: f64,
    /// lifting-gas volume at sea-level pressure, in m^3
    pub balloon_volume: f64,
    pub drag_coefficient: f64,
    #[serde(default)]
    pub wind: crate::physics::wind::WindField,
    #[serde(default)]
    #[serde_as(as = "Option<serde_with::DurationSeconds<i64>>")]
    pub max_flight_time: Option<chrono::Duration>,
}

impl AscentInput {
    pub fn validate(&self) -> Result<(), SimulationError> {
        super::validate_position(&self.launch)?;
        if !(self.burst_altitude > 0.0) {
            return Err(SimulationError::InvalidBurstAltitude {
                altitude: self.burst_altitude,
            });
        }
        if !(self.payload_mass > 0.0) {
            return Err(SimulationError::InvalidPayloadMass {
                mass: self.payload_mass,
            });
        }
        if !(self.balloon_mass >= 0.0) {
            return Err(SimulationError::InvalidBalloonMass {
                mass: self.balloon_mass,
            });
        }
        if !(self.balloon_volume > 0.0) {
            return Err(SimulationError::InvalidBalloonVolume {
                volume: self.balloon_volume,
            });
        }
        if !(self.drag_coefficient > 0.0) {
            return Err(SimulationError::InvalidDragCoefficient {
                drag_coefficient: self.drag_coefficient,
            });
        }
        if !(self.launch.altitude >= 0.0) {
            return Err(SimulationError::InvalidLaunchAltitude {
                altitude: self.launch.altitude,
            });
        }
        if self.burst_altitude <= self.launch.altitude {
            return Err(SimulationError::BurstBelowLaunch {
                burst_altitude: self.burst_altitude,
                launch_altitude: self.launch.altitude,
            });
        }
        super::validate_wind(&self.wind)?;
        super::step_limit(self.max_flight_time())?;
        Ok(())
    }

    pub fn lifted_mass(&self) -> f64 {
        self.payload_mass + self.balloon_mass
    }

    pub fn max_flight_time(&self) -> chrono::Duration {
        self.max_flight_time.unwrap_or(*crate::DEFAULT_MAX_FLIGHT_TIME)
    }
}

/// Instantaneous vertical force balance on the balloon, in N.
pub fn net_force(input: &AscentInput, altitude: f64) -> Result<f64, crate::physics::PhysicsError> {
    let density = crate::physics::atmosphere::density(altitude)?;
    let volume = crate::physics::expanded_volume(input.balloon_volume, altitude)?;
    Ok(crate::physics::buoyancy(volume, density) - crate::physics::weight(input.lifted_mass()))
}

/// Settled ascent rate at `altitude` under the attenuated model.
pub fn steady_ascent_rate(
    input: &AscentInput,
    altitude: f64,
) -> Result<f64, crate::physics::PhysicsError> {
    let acceleration = net_force(input, altitude)? / input.lifted_mass();
    let attenuation = crate::physics::ascent_attenuation(input.drag_coefficient);
    if acceleration <= 0.0 {
        return Ok(0.0);
    }
    if attenuation >= 1.0 {
        return Err(crate::physics::PhysicsError::InvalidPhysicalParameters {
            message: format!(
                "drag coefficient {} gives no ascent attenuation",
                input.drag_coefficient
            ),
        });
    }
    Ok(acceleration * super::TIME_STEP * attenuation / (1.0 - attenuation))
}

/// One forward-Euler step of the ascent, shared by the ascent and burst-site simulators.
pub(crate) struct AscentIntegrator<'a> {
    input: &'a AscentInput,
    pub position: crate::location::GeoPoint,
    pub velocity: f64,
    pub elapsed: f64,
    pub net_force: f64,
    pub wind: crate::physics::wind::WindSample,
    pub wind_drift_distance: f64,
    pub max_velocity: f64,
}

impl<'a> AscentIntegrator<'a> {
    pub fn new(input: &'a AscentInput) -> Result<Self, SimulationError> {
        Ok(Self {
            input,
            position: input.launch,
            velocity: 0.0,
            elapsed: 0.0,
            net_force: net_force(input, input.launch.altitude)?,
            wind: input.wind.at(input.launch.altitude)?,
            wind_drift_distance: 0.0,
            max_velocity: 0.0,
        })
    }

    pub fn point(&self, phase: crate::location::FlightPhase) -> crate::location::TrajectoryPoint {
        crate::location::TrajectoryPoint {
            position: self.position,
            time: self.input.start_time + crate::utilities::seconds_to_duration(self.elapsed),
            velocity: self.velocity,
            wind_speed: self.wind.speed,
            wind_direction: self.wind.direction,
            phase,
        }
    }

    pub fn step(&mut self) -> Result<(), SimulationError> {
        let dt = super::TIME_STEP;
        self.net_force = net_force(self.input, self.position.altitude)?;
        let acceleration = self.net_force / self.input.lifted_mass();

        self.velocity = (self.velocity + acceleration * dt).max(0.0)
            * crate::physics::ascent_attenuation(self.input.drag_coefficient);
        self.max_velocity = self.max_velocity.max(self.velocity);

        let altitude = self.position.altitude + self.velocity * dt;
        self.wind = self.input.wind.at(altitude)?;
        self.position =
            crate::physics::wind::advance(&self.position, self.wind.speed, self.wind.direction, dt)
                .with_altitude(altitude);
        self.wind_drift_distance += crate::physics::wind::drift_distance_km(self.wind.speed, dt);
        self.elapsed += dt;

        Ok(())
    }

    /// a balloon at rest without free lift will never rise
    pub fn stalled(&self) -> bool {
        self.velocity == 0.0 && self.net_force <= 0.0
    }
}

pub fn simulate_ascent(input: &AscentInput) -> Result<super::PhaseResult, SimulationError> {
    input.validate()?;
    let max_steps = super::step_limit(input.max_flight_time())?;
    let max_seconds = input.max_flight_time().num_seconds() as f64;

    let mut integrator = AscentIntegrator::new(input)?;
    let mut recorder =
        super::TrajectoryRecorder::new(integrator.point(crate::location::FlightPhase::Ascent));

    let mut reached = false;
    while recorder.steps() < max_steps && integrator.elapsed < max_seconds {
        integrator.step()?;
        if integrator.position.altitude >= input.burst_altitude {
            integrator.position.altitude = input.burst_altitude;
            reached = true;
            break;
        }
        if integrator.stalled() {
            break;
        }
        recorder.record(integrator.point(crate::location::FlightPhase::Ascent));
    }

    if !reached {
        log::debug!(
            "ascent stopped at {:.1} m after {} s",
            integrator.position.altitude,
            integrator.elapsed
        );
        return Err(SimulationError::ConvergenceFailed {
            altitude: integrator.position.altitude,
            target_altitude: input.burst_altitude,
            elapsed: integrator.elapsed,
        });
    }

    let terminal = integrator.point(crate::location::FlightPhase::Burst);
    let terminal_velocity = steady_ascent_rate(input, input.burst_altitude)?;
    let confidence = super::phase_confidence(true, recorder.mean_wind_speed());
    let steps = recorder.steps() + 1;

    Ok(super::PhaseResult {
        phase: crate::location::FlightPhase::Ascent,
        trajectory: recorder.finish(terminal.clone()),
        terminal,
        duration: integrator.elapsed,
        max_velocity: integrator.max_velocity,
        wind_drift_distance: integrator.wind_drift_distance,
        terminal_velocity,
        confidence,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FlightPhase, GeoPoint};

    fn input() -> AscentInput {
        let lifted_mass = 1.5 + 1.2;
        AscentInput {
            launch: GeoPoint::new(39.359031, -77.547824, 100.0),
            start_time: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            burst_altitude: 20000.0,
            payload_mass: 1.5,
            balloon_mass: 1.2,
            balloon_volume: crate::physics::volume_for_ascent_rate(lifted_mass, 5.0, 0.3)
                .unwrap(),
            drag_coefficient: 0.3,
            wind: crate::physics::wind::WindField::constant(8.0, 90.0),
            max_flight_time: None,
        }
    }

    #[test]
    fn test_reaches_burst_altitude() {
        let input = input();
        let result = simulate_ascent(&input).unwrap();

        assert_eq!(result.terminal.position.altitude, input.burst_altitude);
        assert_eq!(result.terminal.phase, FlightPhase::Burst);
        assert_eq!(result.trajectory.last().unwrap(), &result.terminal);

        // settles near the 5 m/s design rate
        let expected = (input.burst_altitude - input.launch.altitude) / 5.0;
        assert!((result.duration - expected).abs() < 0.05 * expected);
        assert!((result.terminal_velocity - 5.0).abs() < 0.01);

        // blown east
        assert!(result.terminal.position.longitude > input.launch.longitude);
        assert!(result.wind_drift_distance > 0.0);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn test_trajectory_is_down_sampled() {
        let result = simulate_ascent(&input()).unwrap();
        assert!(result.trajectory.len() <= result.steps / crate::simulation::SAMPLE_INTERVAL + 2);
        assert!(result.trajectory.len() > 2);
    }

    #[test]
    fn test_heavy_balloon_does_not_converge() {
        let mut input = input();
        input.balloon_volume = 1.0;
        let result = simulate_ascent(&input);
        assert!(matches!(
            result,
            Err(SimulationError::ConvergenceFailed { .. })
        ));
    }

    #[test]
    fn test_timeout() {
        let mut input = input();
        input.max_flight_time = Some(chrono::Duration::minutes(10));
        match simulate_ascent(&input) {
            Err(SimulationError::ConvergenceFailed { elapsed, .. }) => assert_eq!(elapsed, 600.0),
            other => panic!("expected convergence failure, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let mut invalid = input();
        invalid.burst_altitude = 50.0;
        assert_eq!(simulate_ascent(&invalid).unwrap_err().code(), "BURST_BELOW_LAUNCH");

        let mut invalid = input();
        invalid.launch.altitude = -5.0;
        assert_eq!(
            simulate_ascent(&invalid).unwrap_err().code(),
            "INVALID_LAUNCH_ALTITUDE"
        );

        let mut invalid = input();
        invalid.balloon_volume = 0.0;
        assert_eq!(
            simulate_ascent(&invalid).unwrap_err().code(),
            "INVALID_BALLOON_VOLUME"
        );

        let mut invalid = input();
        invalid.wind = crate::physics::wind::WindField::constant(-1.0, 0.0);
        assert_eq!(simulate_ascent(&invalid).unwrap_err().code(), "INVALID_WIND_SPEED");
    }
}
