use crate::simulation::SimulationError;

/// seconds between position updates of the simple model
pub const SIMPLE_TIME_STEP: f64 = 60.0;

/// `dh/dt` based on historical flight data
pub fn descent_rate(altitude: f64) -> f64 {
    -5.8e-08 * altitude.powi(2) - 6.001
}

/// Kinematic flight without a force balance: constant ascent rate up, the historical descent
/// curve down.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimpleFlightInput {
    pub launch: crate::location::GeoPoint,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub ascent_rate: f64,
    pub burst_altitude: f64,
    pub landing_altitude: f64,
    #[serde(default)]
    pub wind: crate::physics::wind::WindField,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimpleFlight {
    pub ascent: crate::simulation::PhaseResult,
    pub descent: crate::simulation::PhaseResult,
}

struct SimplePhase<'a> {
    wind: &'a crate::physics::wind::WindField,
    start_time: chrono::DateTime<chrono::Utc>,
    position: crate::location::GeoPoint,
    elapsed: f64,
    drift: f64,
    wind_speed_sum: f64,
    max_velocity: f64,
    points: Vec<crate::location::TrajectoryPoint>,
}

impl<'a> SimplePhase<'a> {
    fn new(
        wind: &'a crate::physics::wind::WindField,
        start: crate::location::GeoPoint,
        start_time: chrono::DateTime<chrono::Utc>,
        phase: crate::location::FlightPhase,
    ) -> Result<Self, SimulationError> {
        let mut simple = Self {
            wind,
            start_time,
            position: start,
            elapsed: 0.0,
            drift: 0.0,
            wind_speed_sum: 0.0,
            max_velocity: 0.0,
            points: vec![],
        };
        let sample = wind.at(start.altitude)?;
        simple.push(0.0, sample, phase);
        Ok(simple)
    }

    fn push(
        &mut self,
        velocity: f64,
        wind: crate::physics::wind::WindSample,
        phase: crate::location::FlightPhase,
    ) {
        self.wind_speed_sum += wind.speed;
        self.points.push(crate::location::TrajectoryPoint {
            position: self.position,
            time: self.start_time + crate::utilities::seconds_to_duration(self.elapsed),
            velocity,
            wind_speed: wind.speed,
            wind_direction: wind.direction,
            phase,
        });
    }

    /// drift for `dt` seconds and settle at `altitude`
    fn step(
        &mut self,
        altitude: f64,
        dt: f64,
        velocity: f64,
        phase: crate::location::FlightPhase,
    ) -> Result<(), SimulationError> {
        let wind = self.wind.at(self.position.altitude)?;
        self.position = crate::physics::wind::advance(&self.position, wind.speed, wind.direction, dt)
            .with_altitude(altitude);
        self.drift += crate::physics::wind::drift_distance_km(wind.speed, dt);
        self.elapsed += dt;
        self.max_velocity = self.max_velocity.max(velocity);
        self.push(velocity, wind, phase);
        Ok(())
    }

    fn finish(
        mut self,
        phase: crate::location::FlightPhase,
        terminal_phase: crate::location::FlightPhase,
        terminal_velocity: f64,
    ) -> crate::simulation::PhaseResult {
        let steps = self.points.len() - 1;
        let mean_wind_speed = self.wind_speed_sum / self.points.len() as f64;
        if let Some(last) = self.points.last_mut() {
            last.phase = terminal_phase;
        }
        let terminal = self.points[steps].clone();

        crate::simulation::PhaseResult {
            phase,
            trajectory: self.points,
            terminal,
            duration: self.elapsed,
            max_velocity: self.max_velocity,
            wind_drift_distance: self.drift,
            terminal_velocity,
            confidence: crate::simulation::phase_confidence(false, mean_wind_speed),
            steps,
        }
    }
}

pub fn simple_flight(input: &SimpleFlightInput) -> Result<SimpleFlight, SimulationError> {
    crate::simulation::validate_position(&input.launch)?;
    crate::simulation::validate_wind(&input.wind)?;
    if !(input.ascent_rate > 0.0) {
        return Err(crate::physics::PhysicsError::InvalidPhysicalParameters {
            message: format!("ascent rate must be positive (got {})", input.ascent_rate),
        }
        .into());
    }
    if !(input.landing_altitude >= 0.0) {
        return Err(SimulationError::InvalidLandingAltitude {
            altitude: input.landing_altitude,
        });
    }
    if input.burst_altitude <= input.launch.altitude {
        return Err(SimulationError::BurstBelowLaunch {
            burst_altitude: input.burst_altitude,
            launch_altitude: input.launch.altitude,
        });
    }
    if input.burst_altitude <= input.landing_altitude {
        return Err(SimulationError::BurstBelowLanding {
            burst_altitude: input.burst_altitude,
            landing_altitude: input.landing_altitude,
        });
    }

    let mut ascent = SimplePhase::new(
        &input.wind,
        input.launch,
        input.start_time,
        crate::location::FlightPhase::Ascent,
    )?;
    while ascent.position.altitude < input.burst_altitude {
        let remaining = input.burst_altitude - ascent.position.altitude;
        let (dt, altitude) = if remaining <= input.ascent_rate * SIMPLE_TIME_STEP {
            (remaining / input.ascent_rate, input.burst_altitude)
        } else {
            (
                SIMPLE_TIME_STEP,
                ascent.position.altitude + input.ascent_rate * SIMPLE_TIME_STEP,
            )
        };
        ascent.step(altitude, dt, input.ascent_rate, crate::location::FlightPhase::Ascent)?;
    }
    let burst_time = ascent.start_time + crate::utilities::seconds_to_duration(ascent.elapsed);
    let burst = ascent.position;
    let ascent = ascent.finish(
        crate::location::FlightPhase::Ascent,
        crate::location::FlightPhase::Burst,
        input.ascent_rate,
    );

    let mut descent = SimplePhase::new(
        &input.wind,
        burst,
        burst_time,
        crate::location::FlightPhase::Burst,
    )?;
    while descent.position.altitude > input.landing_altitude {
        let rate = descent_rate(descent.position.altitude).abs();
        let remaining = descent.position.altitude - input.landing_altitude;
        let (dt, altitude) = if remaining <= rate * SIMPLE_TIME_STEP {
            (remaining / rate, input.landing_altitude)
        } else {
            (SIMPLE_TIME_STEP, descent.position.altitude - rate * SIMPLE_TIME_STEP)
        };
        descent.step(altitude, dt, rate, crate::location::FlightPhase::Descent)?;
    }
    let landing_rate = descent_rate(input.landing_altitude).abs();
    let descent = descent.finish(
        crate::location::FlightPhase::Descent,
        crate::location::FlightPhase::Landing,
        landing_rate,
    );

    Ok(SimpleFlight { ascent, descent })
}
