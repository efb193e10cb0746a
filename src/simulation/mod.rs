pub mod ascent;
pub mod burst;
pub mod descent;
pub mod drift;
pub mod monte_carlo;

/// integration step, in seconds
pub const TIME_STEP: f64 = 1.0;

/// keep one trajectory point out of this many steps
pub const SAMPLE_INTERVAL: usize = 50;

custom_error::custom_error! {pub SimulationError
    InvalidLatitude { latitude: f64 } = "Latitude must be between -90 and 90 degrees (got {latitude})",
    InvalidLongitude { longitude: f64 } = "Longitude must be between -180 and 180 degrees (got {longitude})",
    InvalidBurstAltitude { altitude: f64 } = "Burst altitude must be positive (got {altitude})",
    InvalidPayloadMass { mass: f64 } = "Payload mass must be positive (got {mass})",
    InvalidBalloonMass { mass: f64 } = "Balloon mass must not be negative (got {mass})",
    InvalidBalloonVolume { volume: f64 } = "Balloon volume must be positive (got {volume})",
    InvalidParachuteArea { area: f64 } = "Parachute area must be positive (got {area})",
    InvalidDragCoefficient { drag_coefficient: f64 } = "Drag coefficient must be positive (got {drag_coefficient})",
    InvalidLandingAltitude { altitude: f64 } = "Landing altitude must not be negative (got {altitude})",
    InvalidLaunchAltitude { altitude: f64 } = "Launch altitude must not be negative (got {altitude})",
    BurstBelowLanding { burst_altitude: f64, landing_altitude: f64 } = "Burst altitude must be higher than landing altitude",
    BurstBelowLaunch { burst_altitude: f64, launch_altitude: f64 } = "Burst altitude must be higher than launch altitude",
    InvalidWindSpeed { speed: f64 } = "Wind speed must not be negative (got {speed})",
    InvalidDuration { seconds: f64 } = "Duration must not be negative (got {seconds})",
    InvalidMaxFlightTime { seconds: i64 } = "Maximum flight time must be positive (got {seconds} s)",
    InvalidSampleCount { samples: i64 } = "Monte Carlo sample count must be positive (got {samples})",
    ConvergenceFailed { altitude: f64, target_altitude: f64, elapsed: f64 } = "did not reach {target_altitude} m after {elapsed} s (stopped at {altitude} m)",
    Cancelled = "simulation cancelled after its deadline passed",
    TrialPanicked = "a monte carlo worker panicked",
    Physics { source: crate::physics::PhysicsError } = "{source}",
}

impl SimulationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLatitude { .. } => "INVALID_LATITUDE",
            Self::InvalidLongitude { .. } => "INVALID_LONGITUDE",
            Self::InvalidBurstAltitude { .. } => "INVALID_BURST_ALTITUDE",
            Self::InvalidPayloadMass { .. } => "INVALID_PAYLOAD_MASS",
            Self::InvalidBalloonMass { .. } => "INVALID_BALLOON_MASS",
            Self::InvalidBalloonVolume { .. } => "INVALID_BALLOON_VOLUME",
            Self::InvalidParachuteArea { .. } => "INVALID_PARACHUTE_AREA",
            Self::InvalidDragCoefficient { .. } => "INVALID_DRAG_COEFFICIENT",
            Self::InvalidLandingAltitude { .. } => "INVALID_LANDING_ALTITUDE",
            Self::InvalidLaunchAltitude { .. } => "INVALID_LAUNCH_ALTITUDE",
            Self::BurstBelowLanding { .. } => "BURST_BELOW_LANDING",
            Self::BurstBelowLaunch { .. } => "BURST_BELOW_LAUNCH",
            Self::InvalidWindSpeed { .. } => "INVALID_WIND_SPEED",
            Self::InvalidDuration { .. } => "INVALID_DURATION",
            Self::InvalidMaxFlightTime { .. } => "INVALID_MAX_FLIGHT_TIME",
            Self::InvalidSampleCount { .. } => "INVALID_SAMPLE_COUNT",
            Self::ConvergenceFailed { .. } => "CONVERGENCE_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::TrialPanicked => "TRIAL_PANICKED",
            Self::Physics { source } => source.code(),
        }
    }

    /// whether the error is a malformed input rather than a failure of the simulation itself
    pub fn is_input_violation(&self) -> bool {
        !matches!(
            self,
            Self::ConvergenceFailed { .. }
                | Self::Cancelled
                | Self::TrialPanicked
                | Self::Physics { .. }
        )
    }
}

/// Output of one simulated flight phase.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PhaseResult {
    pub phase: crate::location::FlightPhase,
    /// down-sampled trajectory, always ending at `terminal`
    pub trajectory: Vec<crate::location::TrajectoryPoint>,
    pub terminal: crate::location::TrajectoryPoint,
    /// elapsed simulated time, in seconds
    pub duration: f64,
    pub max_velocity: f64,
    /// accumulated wind drift, in kilometers
    pub wind_drift_distance: f64,
    /// vertical speed at the terminal altitude, in m/s
    pub terminal_velocity: f64,
    pub confidence: f64,
    pub steps: usize,
}

impl PhaseResult {
    pub fn start(&self) -> &crate::location::TrajectoryPoint {
        self.trajectory.first().unwrap_or(&self.terminal)
    }

    pub fn end_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.terminal.time
    }
}

pub(crate) fn validate_position(
    position: &crate::location::GeoPoint,
) -> Result<(), SimulationError> {
    if !(-90.0..=90.0).contains(&position.latitude) {
        return Err(SimulationError::InvalidLatitude {
            latitude: position.latitude,
        });
    }
    if !(-180.0..=180.0).contains(&position.longitude) {
        return Err(SimulationError::InvalidLongitude {
            longitude: position.longitude,
        });
    }
    Ok(())
}

pub(crate) fn validate_wind(wind: &crate::physics::wind::WindField) -> Result<(), SimulationError> {
    match wind {
        crate::physics::wind::WindField::Constant(sample) if sample.speed < 0.0 => {
            Err(SimulationError::InvalidWindSpeed {
                speed: sample.speed,
            })
        }
        crate::physics::wind::WindField::Profile(levels) => {
            if levels.is_empty() {
                return Err(crate::physics::PhysicsError::NoWindData.into());
            }
            match levels.iter().find(|level| level.speed < 0.0) {
                Some(level) => Err(SimulationError::InvalidWindSpeed { speed: level.speed }),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// hard iteration cap derived from the maximum flight time
pub(crate) fn step_limit(max_flight_time: chrono::Duration) -> Result<usize, SimulationError> {
    let seconds = max_flight_time.num_seconds();
    if seconds <= 0 {
        return Err(SimulationError::InvalidMaxFlightTime { seconds });
    }
    Ok((seconds as f64 / TIME_STEP).ceil() as usize)
}

/// heuristic confidence for a single phase; strong winds widen the spread of outcomes
pub(crate) fn phase_confidence(completed: bool, mean_wind_speed: f64) -> f64 {
    let base = if completed { 0.95 } else { 0.5 };
    let wind_penalty = (mean_wind_speed.max(0.0) / 100.0).min(0.3);
    (base * (1.0 - wind_penalty)).clamp(0.0, 1.0)
}

/// Keeps every `SAMPLE_INTERVAL`-th step plus the terminal point.
pub(crate) struct TrajectoryRecorder {
    points: Vec<crate::location::TrajectoryPoint>,
    wind_speed_sum: f64,
    steps: usize,
}

impl TrajectoryRecorder {
    pub fn new(start: crate::location::TrajectoryPoint) -> Self {
        Self {
            wind_speed_sum: start.wind_speed,
            points: vec![start],
            steps: 0,
        }
    }

    pub fn record(&mut self, point: crate::location::TrajectoryPoint) {
        self.steps += 1;
        self.wind_speed_sum += point.wind_speed;
        if self.steps % SAMPLE_INTERVAL == 0 {
            self.points.push(point);
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn mean_wind_speed(&self) -> f64 {
        self.wind_speed_sum / (self.steps + 1) as f64
    }

    pub fn finish(
        mut self,
        terminal: crate::location::TrajectoryPoint,
    ) -> Vec<crate::location::TrajectoryPoint> {
        match self.points.last_mut() {
            Some(last) if last.time == terminal.time => *last = terminal,
            _ => self.points.push(terminal),
        }
        self.points
    }
}
