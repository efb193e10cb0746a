use rand::{Rng, SeedableRng};

use super::SimulationError;

pub const DEFAULT_SAMPLES: i64 = 100;

fn default_num_samples() -> i64 {
    DEFAULT_SAMPLES
}

fn default_wind_error_rms() -> f64 {
    2.0
}

fn default_workers() -> usize {
    4
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MonteCarloConfig {
    #[serde(default = "default_num_samples")]
    pub num_samples: i64,
    /// standard deviation of each horizontal wind component, in m/s
    #[serde(default = "default_wind_error_rms")]
    pub wind_error_rms: f64,
    /// standard deviation of the drift duration, as a fraction of it
    #[serde(default)]
    pub duration_error: f64,
    /// standard deviation of the starting altitude, in m
    #[serde(default)]
    pub altitude_error: f64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            wind_error_rms: default_wind_error_rms(),
            duration_error: 0.0,
            altitude_error: 0.0,
            workers: default_workers(),
            seed: 0,
        }
    }
}

/// The phase each trial re-runs.
#[derive(Clone, Debug, PartialEq)]
pub enum TrialPhase {
    Drift(super::drift::WindDriftInput),
    Descent(super::descent::DescentInput),
}

impl TrialPhase {
    pub fn start(&self) -> &crate::location::GeoPoint {
        match self {
            Self::Drift(input) => &input.start,
            Self::Descent(input) => &input.start,
        }
    }

    fn nominal(&self) -> Result<crate::location::GeoPoint, SimulationError> {
        self.run(&Perturbation::default())
    }

    fn run(&self, perturbation: &Perturbation) -> Result<crate::location::GeoPoint, SimulationError> {
        match self {
            Self::Drift(input) => {
                let mut input = input.clone();
                input.wind = input.wind.offset(perturbation.wind_east, perturbation.wind_north);
                input.duration = (input.duration * perturbation.duration_factor).max(0.0);
                input.start.altitude = (input.start.altitude + perturbation.altitude_offset).max(0.0);
                Ok(super::drift::calculate_wind_drift(&input)?.terminal.position)
            }
            Self::Descent(input) => {
                let mut input = input.clone();
                input.wind = input.wind.offset(perturbation.wind_east, perturbation.wind_north);
                // a perturbed burst must stay above the ground it lands on
                input.start.altitude = (input.start.altitude + perturbation.altitude_offset)
                    .max(input.landing_altitude + 1.0);
                Ok(super::descent::calculate_descent(&input)?.terminal.position)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Perturbation {
    wind_east: f64,
    wind_north: f64,
    duration_factor: f64,
    altitude_offset: f64,
}

impl Default for Perturbation {
    fn default() -> Self {
        Self {
            wind_east: 0.0,
            wind_north: 0.0,
            duration_factor: 1.0,
            altitude_offset: 0.0,
        }
    }
}

/// standard normal deviate by the Box-Muller transform
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // shift to (0, 1] so the logarithm stays finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

/// 2.5th to 97.5th percentile of the trial outcomes
///
/// The longitude bounds wrap, so `lower` exceeds `upper` when the envelope spans the antimeridian.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfidenceEnvelope {
    pub latitude: Bounds,
    pub longitude: Bounds,
    /// ground distance from the phase start, in m
    pub distance: Bounds,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MonteCarloResult {
    pub samples: usize,
    pub failed: usize,
    /// landing point of the unperturbed run
    pub nominal: crate::location::GeoPoint,
    pub mean_position: crate::location::GeoPoint,
    /// RMS ground distance of the trial landings about their mean, in m
    pub position_std: f64,
    pub latitude_std: f64,
    pub longitude_std: f64,
    pub mean_distance: f64,
    pub distance_std: f64,
    pub envelope: ConfidenceEnvelope,
    /// 95th-percentile ground distance from the nominal landing point, in m
    pub landing_radius: f64,
}

/// nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (percent / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// longitude of each landing relative to `reference`, wrapped into (-180, 180]
fn longitude_offsets(reference: f64, landings: &[crate::location::GeoPoint]) -> Vec<f64> {
    landings
        .iter()
        .map(|landing| crate::physics::wind::normalize_longitude(landing.longitude - reference))
        .collect()
}

fn deadline_passed(deadline: Option<std::time::Instant>) -> bool {
    matches!(deadline, Some(deadline) if std::time::Instant::now() >= deadline)
}

pub struct MonteCarloEngine {
    pub config: MonteCarloConfig,
}

impl MonteCarloEngine {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    fn perturbations(&self, samples: usize) -> Vec<Perturbation> {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(self.config.seed);
        (0..samples)
            .map(|_| Perturbation {
                wind_east: self.config.wind_error_rms * standard_normal(&mut rng),
                wind_north: self.config.wind_error_rms * standard_normal(&mut rng),
                duration_factor: 1.0 + self.config.duration_error * standard_normal(&mut rng),
                altitude_offset: self.config.altitude_error * standard_normal(&mut rng),
            })
            .collect()
    }

    /// Run every trial and aggregate the landing points.
    ///
    /// Perturbations are drawn up front from the seeded generator and outcomes are kept in trial
    /// order, so the statistics do not depend on how trials are spread over workers.
    pub fn run(
        &self,
        phase: &TrialPhase,
        deadline: Option<std::time::Instant>,
    ) -> Result<MonteCarloResult, SimulationError> {
        if self.config.num_samples <= 0 {
            return Err(SimulationError::InvalidSampleCount {
                samples: self.config.num_samples,
            });
        }
        let samples = self.config.num_samples as usize;
        let nominal = phase.nominal()?;
        let perturbations = self.perturbations(samples);

        let workers = self.config.workers.clamp(1, samples);
        let chunk_size = (samples + workers - 1) / workers;
        let outcomes = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = perturbations
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|perturbation| {
                                if deadline_passed(deadline) {
                                    return Err(SimulationError::Cancelled);
                                }
                                phase.run(perturbation)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .and_then(|joined| joined)
        .map_err(|_| SimulationError::TrialPanicked)?;

        let mut landings = vec![];
        let mut first_error = None;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(landing) => landings.push(landing),
                Err(SimulationError::Cancelled) => return Err(SimulationError::Cancelled),
                Err(error) => {
                    log::debug!("monte carlo trial failed; {}", error);
                    first_error.get_or_insert(error);
                }
            }
        }
        if landings.is_empty() {
            return Err(first_error.unwrap_or(SimulationError::InvalidSampleCount { samples: 0 }));
        }

        Ok(Self::aggregate(phase.start(), nominal, &landings, samples))
    }

    fn aggregate(
        start: &crate::location::GeoPoint,
        nominal: crate::location::GeoPoint,
        landings: &[crate::location::GeoPoint],
        samples: usize,
    ) -> MonteCarloResult {
        let latitudes: Vec<f64> = landings.iter().map(|landing| landing.latitude).collect();
        let altitudes: Vec<f64> = landings.iter().map(|landing| landing.altitude).collect();
        let distances: Vec<f64> = landings
            .iter()
            .map(|landing| start.ground_distance(landing))
            .collect();

        // longitudes are averaged as wrapped offsets from the nominal landing
        let (mean_offset, _) = mean_and_std(&longitude_offsets(nominal.longitude, landings));
        let mean_longitude = crate::physics::wind::normalize_longitude(nominal.longitude + mean_offset);
        let longitude_offsets = longitude_offsets(mean_longitude, landings);
        let (_, longitude_std) = mean_and_std(&longitude_offsets);

        let (mean_latitude, latitude_std) = mean_and_std(&latitudes);
        let (mean_altitude, _) = mean_and_std(&altitudes);
        let (mean_distance, distance_std) = mean_and_std(&distances);
        let mean_position = crate::location::GeoPoint::new(mean_latitude, mean_longitude, mean_altitude);

        let spread: Vec<f64> = landings
            .iter()
            .map(|landing| mean_position.ground_distance(landing).powi(2))
            .collect();
        let position_std = (spread.iter().sum::<f64>() / spread.len() as f64).sqrt();

        let latitudes = sorted(latitudes);
        let longitude_offsets = sorted(longitude_offsets);
        let distances = sorted(distances);
        let radii = sorted(
            landings
                .iter()
                .map(|landing| nominal.ground_distance(landing))
                .collect(),
        );
        let bounds = |values: &[f64]| Bounds {
            lower: percentile(values, 2.5),
            upper: percentile(values, 97.5),
        };

        MonteCarloResult {
            samples: landings.len(),
            failed: samples - landings.len(),
            nominal,
            mean_position,
            position_std,
            latitude_std,
            longitude_std,
            mean_distance,
            distance_std,
            envelope: ConfidenceEnvelope {
                latitude: bounds(&latitudes),
                longitude: Bounds {
                    lower: crate::physics::wind::normalize_longitude(
                        mean_longitude + percentile(&longitude_offsets, 2.5),
                    ),
                    upper: crate::physics::wind::normalize_longitude(
                        mean_longitude + percentile(&longitude_offsets, 97.5),
                    ),
                },
                distance: bounds(&distances),
            },
            landing_radius: percentile(&radii, 95.0),
        }
    }
}

/// 95th-percentile landing dispersion radius around the unperturbed landing point, in m.
pub fn landing_zone_uncertainty(
    phase: &TrialPhase,
    config: &MonteCarloConfig,
    deadline: Option<std::time::Instant>,
) -> Result<f64, SimulationError> {
    Ok(MonteCarloEngine::new(config.clone()).run(phase, deadline)?.landing_radius)
}
