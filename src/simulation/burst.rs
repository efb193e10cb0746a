use super::SimulationError;

/// risk above which the envelope is taken to have ruptured
pub const EARLY_BURST_THRESHOLD: f64 = 0.7;

/// climb required before an early burst is considered
pub const MINIMUM_CLIMB: f64 = 100.0;

const ALTITUDE_WEIGHT: f64 = 0.4;
const DENSITY_WEIGHT: f64 = 0.15;
const FORCE_WEIGHT: f64 = 0.45;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstOutcome {
    ReachedTarget,
    EarlyBurst,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BurstSiteResult {
    pub ascent: super::PhaseResult,
    pub outcome: BurstOutcome,
    /// early-burst risk at the moment of burst
    pub early_burst_risk: f64,
    pub peak_risk: f64,
}

impl BurstSiteResult {
    pub fn burst_site(&self) -> &crate::location::GeoPoint {
        &self.ascent.terminal.position
    }
}

/// Heuristic envelope stress in `[0, 1]`.
///
/// Combines how close the balloon is to its rated burst altitude (above 80%), how thin the air
/// has become relative to sea level, and how hard the net force pulls against a 2 g bound.
/// Altitude and thin air together stay below [`EARLY_BURST_THRESHOLD`], so only excess free lift
/// bursts a balloon short of its target.
pub fn early_burst_risk(
    altitude: f64,
    target_altitude: f64,
    density: f64,
    net_force: f64,
    weight: f64,
) -> f64 {
    let altitude_risk = if target_altitude > 0.0 {
        ((altitude / target_altitude - 0.8) / 0.2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let density_risk =
        (1.0 - density / crate::physics::atmosphere::SEA_LEVEL_DENSITY).clamp(0.0, 1.0);
    let force_risk = if weight > 0.0 {
        (net_force / (2.0 * weight)).abs().clamp(0.0, 1.0)
    } else {
        1.0
    };

    (ALTITUDE_WEIGHT * altitude_risk + DENSITY_WEIGHT * density_risk + FORCE_WEIGHT * force_risk)
        .clamp(0.0, 1.0)
}

/// Simulate the ascent and predict where the envelope bursts.
pub fn predict_burst_site(
    input: &super::ascent::AscentInput,
) -> Result<BurstSiteResult, SimulationError> {
    input.validate()?;
    let max_steps = super::step_limit(input.max_flight_time())?;
    let max_seconds = input.max_flight_time().num_seconds() as f64;
    let weight = crate::physics::weight(input.lifted_mass());

    let mut integrator = super::ascent::AscentIntegrator::new(input)?;
    let mut recorder =
        super::TrajectoryRecorder::new(integrator.point(crate::location::FlightPhase::Ascent));

    let mut outcome = None;
    let mut risk = 0.0;
    let mut peak_risk: f64 = 0.0;
    while recorder.steps() < max_steps && integrator.elapsed < max_seconds {
        integrator.step()?;

        let altitude = integrator.position.altitude;
        if altitude >= input.burst_altitude {
            integrator.position.altitude = input.burst_altitude;
            outcome = Some(BurstOutcome::ReachedTarget);
            break;
        }

        let density = crate::physics::atmosphere::density(altitude)?;
        risk = early_burst_risk(
            altitude,
            input.burst_altitude,
            density,
            integrator.net_force,
            weight,
        );
        peak_risk = peak_risk.max(risk);
        if risk > EARLY_BURST_THRESHOLD && altitude - input.launch.altitude >= MINIMUM_CLIMB {
            log::debug!(
                "early burst at {:.1} m ({:.0}% of target), risk {:.2}",
                altitude,
                100.0 * altitude / input.burst_altitude,
                risk
            );
            outcome = Some(BurstOutcome::EarlyBurst);
            break;
        }

        if integrator.stalled() {
            break;
        }
        recorder.record(integrator.point(crate::location::FlightPhase::Ascent));
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => {
            return Err(SimulationError::ConvergenceFailed {
                altitude: integrator.position.altitude,
                target_altitude: input.burst_altitude,
                elapsed: integrator.elapsed,
            })
        }
    };

    let terminal = integrator.point(crate::location::FlightPhase::Burst);
    let terminal_velocity =
        super::ascent::steady_ascent_rate(input, terminal.position.altitude)?;
    let confidence = super::phase_confidence(true, recorder.mean_wind_speed())
        * (1.0 - 0.25 * peak_risk);
    let steps = recorder.steps() + 1;

    Ok(BurstSiteResult {
        ascent: super::PhaseResult {
            phase: crate::location::FlightPhase::Ascent,
            trajectory: recorder.finish(terminal.clone()),
            terminal,
            duration: integrator.elapsed,
            max_velocity: integrator.max_velocity,
            wind_drift_distance: integrator.wind_drift_distance,
            terminal_velocity,
            confidence: confidence.clamp(0.0, 1.0),
            steps,
        },
        outcome,
        early_burst_risk: risk,
        peak_risk,
    })
}
