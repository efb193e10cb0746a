use crate::prediction::recovery::{FallbackMethod, OrchestrationError, ProcessingPhase};
use crate::prediction::{PredictionMethod, PredictionRequest, PredictionResult};

fn default_workers() -> usize {
    4
}

/// re-runs of the descent against the terrain under its landing point
const TERRAIN_ITERATIONS: usize = 2;

/// m
const TERRAIN_TOLERANCE: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorSettings {
    pub weather_timeout: std::time::Duration,
    /// fixed Monte Carlo seed; derived from the request when absent
    pub seed: Option<u64>,
    pub workers: usize,
    /// spread of the burst altitude across Monte Carlo trials, in m
    pub burst_altitude_error: f64,
    pub results: crate::prediction::results::ResultsSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            weather_timeout: std::time::Duration::from_secs(
                crate::DEFAULT_WEATHER_TIMEOUT.num_seconds().max(0) as u64,
            ),
            seed: None,
            workers: default_workers(),
            burst_altitude_error: 500.0,
            results: crate::prediction::results::ResultsSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProcessingStatus {
    pub phase: ProcessingPhase,
    /// fraction in `[0, 1]`
    pub progress: f64,
    pub message: String,
}

/// Wall-clock cost of one invocation, in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PerformanceMetrics {
    pub validation_ms: f64,
    pub weather_ms: f64,
    pub calculation_ms: f64,
    pub processing_ms: f64,
    pub total_ms: f64,
    pub cache_hit: bool,
    /// approximate size of the returned result
    pub memory_bytes: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionOptions {
    /// abandon weather retrieval and Monte Carlo trials after this instant
    pub deadline: Option<std::time::Instant>,
    /// receives every status transition
    pub status: Option<crossbeam::channel::Sender<ProcessingStatus>>,
}

/// A prediction together with how it was produced.
#[derive(Clone, Debug)]
pub struct Execution {
    pub result: PredictionResult,
    pub metrics: PerformanceMetrics,
    pub status: ProcessingStatus,
}

fn elapsed_ms(since: std::time::Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn short_key(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

/// State of a single invocation, threaded through the pipeline.
struct Context {
    deadline: Option<std::time::Instant>,
    sender: Option<crossbeam::channel::Sender<ProcessingStatus>>,
    status: ProcessingStatus,
    metrics: PerformanceMetrics,
    method: PredictionMethod,
    /// confidence reductions and the warning explaining each
    penalties: Vec<(f64, String)>,
    warnings: Vec<String>,
    recommendations: Vec<String>,
    /// an optional service failed, so the result is not worth caching
    incomplete: bool,
}

impl Context {
    fn new(options: ExecutionOptions) -> Self {
        Self {
            deadline: options.deadline,
            sender: options.status,
            status: ProcessingStatus {
                phase: ProcessingPhase::Validation,
                progress: 0.0,
                message: String::new(),
            },
            metrics: PerformanceMetrics::default(),
            method: PredictionMethod::Physics,
            penalties: vec![],
            warnings: vec![],
            recommendations: vec![],
            incomplete: false,
        }
    }

    fn transition(&mut self, phase: ProcessingPhase, progress: f64, message: String) {
        log::info!("{:}: {:}", phase, message);
        self.status = ProcessingStatus {
            phase,
            progress: progress.clamp(0.0, 1.0),
            message,
        };
        if let Some(sender) = &self.sender {
            // nobody listening is fine
            let _ = sender.send(self.status.clone());
        }
    }

    fn check_deadline(&self, phase: ProcessingPhase) -> Result<(), OrchestrationError> {
        match self.deadline {
            Some(deadline) if std::time::Instant::now() >= deadline => {
                Err(OrchestrationError::cancelled(phase))
            }
            _ => Ok(()),
        }
    }

    fn penalize(&mut self, reduction: f64, warning: String) {
        self.penalties.push((reduction, warning));
    }

    /// keep going with physics, but without its optional refinements
    fn degrade(&mut self, reduction: f64, warning: String) {
        log::warn!("{:}; continuing with a degraded prediction", warning);
        self.penalize(reduction, warning);
        if self.method == PredictionMethod::Physics {
            self.method = PredictionMethod::Degraded;
        }
    }

    fn complete(mut self, result: PredictionResult, started: std::time::Instant) -> Execution {
        self.metrics.total_ms = elapsed_ms(started);
        self.metrics.memory_bytes = std::mem::size_of::<PredictionResult>()
            + result.trajectory.len() * std::mem::size_of::<crate::location::TrajectoryPoint>();
        log::debug!(
            "validation {:.1} ms, weather {:.1} ms, calculation {:.1} ms, processing {:.1} ms",
            self.metrics.validation_ms,
            self.metrics.weather_ms,
            self.metrics.calculation_ms,
            self.metrics.processing_ms
        );
        self.transition(
            ProcessingPhase::Complete,
            1.0,
            format!(
                "{:} prediction lands at {:}",
                result.method, result.landing_site.position
            ),
        );
        Execution {
            result,
            metrics: self.metrics,
            status: self.status,
        }
    }
}

/// Runs a request through validation, weather retrieval, simulation and aggregation.
///
/// Failures are classified and, where a recovery strategy exists, answered with a fallback
/// prediction carrying reduced confidence. Only validation failures and cancellation reach the
/// caller.
pub struct PredictionOrchestrator {
    weather: std::sync::Arc<dyn crate::weather::WeatherProvider>,
    validator: std::sync::Arc<dyn crate::prediction::validation::InputValidator>,
    terrain: Option<std::sync::Arc<dyn crate::terrain::TerrainService>>,
    cache: std::sync::Arc<crate::prediction::cache::PredictionCache>,
    pub settings: OrchestratorSettings,
}

impl PredictionOrchestrator {
    pub fn new(
        weather: std::sync::Arc<dyn crate::weather::WeatherProvider>,
        validator: std::sync::Arc<dyn crate::prediction::validation::InputValidator>,
        cache: std::sync::Arc<crate::prediction::cache::PredictionCache>,
    ) -> Self {
        Self {
            weather,
            validator,
            terrain: None,
            cache,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_terrain(mut self, terrain: std::sync::Arc<dyn crate::terrain::TerrainService>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(&self) -> &crate::prediction::cache::PredictionCache {
        &self.cache
    }

    pub fn execute(&self, request: &PredictionRequest) -> Result<PredictionResult, OrchestrationError> {
        Ok(self.execute_with(request, ExecutionOptions::default())?.result)
    }

    pub fn execute_with(
        &self,
        request: &PredictionRequest,
        options: ExecutionOptions,
    ) -> Result<Execution, OrchestrationError> {
        let started = std::time::Instant::now();
        let mut context = Context::new(options);
        let key = crate::prediction::cache::cache_key(request);
        context.transition(
            ProcessingPhase::Validation,
            0.0,
            format!("looking up prediction {:}", short_key(&key)),
        );

        let guard = match self.cache.acquire(&key, context.deadline) {
            crate::prediction::cache::Lookup::Hit(mut result) => {
                log::debug!("cache hit for {:}", short_key(&key));
                result.cache_hit = true;
                context.metrics.cache_hit = true;
                return Ok(context.complete(result, started));
            }
            crate::prediction::cache::Lookup::Leader(guard) => guard,
            crate::prediction::cache::Lookup::TimedOut => {
                let error = OrchestrationError::cancelled(ProcessingPhase::Validation);
                log::error!("{:}", error);
                context.transition(ProcessingPhase::Failed, 0.0, error.message.clone());
                return Err(error);
            }
        };

        match self.run(request, &key, &mut context) {
            Ok(result) => {
                if result.method == PredictionMethod::Physics
                    && context.penalties.is_empty()
                    && !context.incomplete
                {
                    guard.complete(Some(&result));
                } else {
                    log::debug!("not caching {:} prediction", result.method);
                    guard.complete(None);
                }
                Ok(context.complete(result, started))
            }
            Err(error) => {
                guard.complete(None);
                log::error!("{:}", error);
                let progress = context.status.progress;
                context.transition(ProcessingPhase::Failed, progress, error.message.clone());
                Err(error)
            }
        }
    }

    fn run(
        &self,
        request: &PredictionRequest,
        key: &str,
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Validation,
            0.1,
            "validating request".to_string(),
        );
        let report = self.validator.validate(request);
        for warning in &report.warnings {
            log::warn!("{:}: {:}", warning.field, warning.message);
            context.warnings.push(warning.message.clone());
        }
        let terminal = report.errors.iter().any(|issue| {
            !matches!(
                crate::prediction::recovery::classify(&issue.code, ProcessingPhase::Validation),
                Some(strategy) if strategy.can_recover
            )
        });
        if terminal {
            return Err(OrchestrationError::validation(&report));
        }
        for issue in &report.errors {
            if let Some(strategy) =
                crate::prediction::recovery::classify(&issue.code, ProcessingPhase::Validation)
            {
                context.degrade(strategy.confidence_reduction, issue.message.clone());
            }
        }
        context.metrics.validation_ms = elapsed_ms(phase_started);

        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Weather,
            0.25,
            format!("fetching weather from the {:} provider", self.weather.name()),
        );
        context.check_deadline(ProcessingPhase::Weather)?;
        let fetched = self.fetch_weather(request, context.deadline);
        context.metrics.weather_ms = elapsed_ms(phase_started);
        let weather = match fetched {
            Ok(data) => data,
            Err(error) => return self.recover(request, error, &[], context),
        };
        match crate::weather::validate_weather(&weather) {
            Ok(()) => self.cache.remember_weather(&request.launch, &weather),
            Err(error @ crate::weather::WeatherError::PoorQuality { .. }) => {
                let error = OrchestrationError::weather(&error, self.weather.name());
                if let Some(strategy) =
                    crate::prediction::recovery::classify(&error.code, error.phase)
                {
                    context.degrade(strategy.confidence_reduction, error.message);
                }
            }
            Err(error) => {
                let error = OrchestrationError::weather(&error, self.weather.name());
                return self.recover(request, error, &[], context);
            }
        }
        log::debug!("{:} weather levels in {:.1} ms", weather.len(), context.metrics.weather_ms);

        let monte_carlo = if request.options.include_uncertainty
            && context.method == PredictionMethod::Physics
        {
            Some(self.monte_carlo_config(request, key))
        } else {
            None
        };
        match self.physics(
            request,
            &weather,
            request.balloon.gas_volume(),
            monte_carlo,
            context,
        ) {
            Ok(result) => Ok(self.finish(result, context)),
            Err(error) => self.recover(request, error, &weather, context),
        }
    }

    /// Ask the provider on its own thread, giving up after the weather timeout or the deadline.
    fn fetch_weather(
        &self,
        request: &PredictionRequest,
        deadline: Option<std::time::Instant>,
    ) -> Result<Vec<crate::weather::WeatherData>, OrchestrationError> {
        let name = self.weather.name().to_string();
        let (sender, receiver) = crossbeam::channel::bounded(1);
        let provider = self.weather.clone();
        let query = request.weather_query();
        let spawned = std::thread::Builder::new()
            .name("weather".to_string())
            .spawn(move || {
                // the receiver is gone once the fetch timed out
                let _ = sender.send(provider.select_weather_data(&query));
            });
        if let Err(error) = spawned {
            return Err(OrchestrationError::weather(
                &crate::weather::WeatherError::ServiceUnavailable {
                    message: error.to_string(),
                },
                &name,
            ));
        }

        let mut timeout = self.settings.weather_timeout;
        let mut cut_by_deadline = false;
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining < timeout {
                timeout = remaining;
                cut_by_deadline = true;
            }
        }

        match receiver.recv_timeout(timeout) {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(error)) => Err(OrchestrationError::weather(&error, &name)),
            Err(crossbeam::channel::RecvTimeoutError::Timeout) if cut_by_deadline => {
                Err(OrchestrationError::cancelled(ProcessingPhase::Weather))
            }
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => Err(OrchestrationError::weather(
                &crate::weather::WeatherError::Timeout {
                    seconds: timeout.as_secs_f64(),
                },
                &name,
            )),
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => {
                Err(OrchestrationError::weather(
                    &crate::weather::WeatherError::ServiceUnavailable {
                        message: "provider stopped without answering".to_string(),
                    },
                    &name,
                ))
            }
        }
    }

    fn monte_carlo_config(
        &self,
        request: &PredictionRequest,
        key: &str,
    ) -> crate::simulation::monte_carlo::MonteCarloConfig {
        crate::simulation::monte_carlo::MonteCarloConfig {
            num_samples: request.options.monte_carlo_samples,
            wind_error_rms: request.options.wind_error_rms,
            duration_error: 0.0,
            altitude_error: self.settings.burst_altitude_error,
            workers: self.settings.workers,
            seed: self
                .settings
                .seed
                .unwrap_or_else(|| crate::prediction::cache::seed_from_key(key)),
        }
    }

    fn wind(
        request: &PredictionRequest,
        weather: &[crate::weather::WeatherData],
    ) -> Result<crate::physics::wind::WindField, crate::physics::PhysicsError> {
        match &request.overrides.wind {
            Some(wind) => Ok(wind.clone()),
            None => crate::weather::wind_profile(weather),
        }
    }

    /// Burst-site ascent, parachute descent, optional Monte Carlo envelope, then aggregation.
    fn physics(
        &self,
        request: &PredictionRequest,
        weather: &[crate::weather::WeatherData],
        balloon_volume: Result<f64, crate::physics::PhysicsError>,
        monte_carlo: Option<crate::simulation::monte_carlo::MonteCarloConfig>,
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Calculation,
            0.5,
            "simulating ascent, burst and descent".to_string(),
        );
        context.check_deadline(ProcessingPhase::Calculation)?;

        let physics_error = |error: crate::physics::PhysicsError| {
            OrchestrationError::simulation(&crate::simulation::SimulationError::from(error))
        };
        let balloon_volume = balloon_volume.map_err(physics_error)?;
        let wind = Self::wind(request, weather).map_err(physics_error)?;

        let burst = crate::simulation::burst::predict_burst_site(
            &crate::simulation::ascent::AscentInput {
                launch: request.launch,
                start_time: request.launch_time,
                burst_altitude: request.balloon.burst_altitude,
                payload_mass: request.balloon.payload_mass,
                balloon_mass: request.balloon.balloon_mass,
                balloon_volume,
                drag_coefficient: request.balloon.balloon_drag_coefficient,
                wind: wind.clone(),
                max_flight_time: Some(request.max_flight_time()),
            },
        )
        .map_err(|error| OrchestrationError::simulation(&error))?;
        log::debug!(
            "burst at {:} after {:.0} s ({:?})",
            burst.burst_site(),
            burst.ascent.duration,
            burst.outcome
        );

        let descent_input = |landing_altitude: f64| crate::simulation::descent::DescentInput {
            start: *burst.burst_site(),
            start_time: burst.ascent.end_time(),
            landing_altitude,
            payload_mass: request.balloon.payload_mass,
            parachute_area: request.balloon.parachute_area,
            drag_coefficient: request.balloon.parachute_drag_coefficient,
            initial_velocity: 0.0,
            wind: wind.clone(),
            max_flight_time: Some(request.max_flight_time()),
        };
        let (descent, landing_altitude) = self.land_on_terrain(
            request.landing_altitude(),
            |descent: &crate::simulation::PhaseResult| descent.terminal.position,
            |landing_altitude| {
                crate::simulation::descent::calculate_descent(&descent_input(landing_altitude))
                    .map_err(|error| OrchestrationError::simulation(&error))
            },
        )?;
        let descent_input = descent_input(landing_altitude);

        let uncertainty = match monte_carlo {
            Some(config) => {
                context.check_deadline(ProcessingPhase::Calculation)?;
                let samples = config.num_samples;
                match crate::simulation::monte_carlo::MonteCarloEngine::new(config).run(
                    &crate::simulation::monte_carlo::TrialPhase::Descent(descent_input),
                    context.deadline,
                ) {
                    Ok(uncertainty) => Some(uncertainty),
                    Err(crate::simulation::SimulationError::Cancelled) => {
                        return Err(OrchestrationError::cancelled(ProcessingPhase::Calculation))
                    }
                    Err(error) => {
                        log::warn!("uncertainty analysis of {:} trials failed; {:}", samples, error);
                        context
                            .warnings
                            .push(format!("uncertainty analysis failed; {:}", error));
                        context.incomplete = true;
                        None
                    }
                }
            }
            None => None,
        };
        context.metrics.calculation_ms += elapsed_ms(phase_started);

        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Processing,
            0.85,
            "aggregating flight phases".to_string(),
        );
        let early_burst_risk = burst.early_burst_risk;
        let burst_altitude = burst.burst_site().altitude;
        if burst.outcome == crate::simulation::burst::BurstOutcome::EarlyBurst {
            context.warnings.push(format!(
                "balloon is likely to burst early, near {:.0} m instead of {:.0} m",
                burst_altitude, request.balloon.burst_altitude
            ));
        }
        let mut result = crate::prediction::results::process(
            &[burst.ascent, descent],
            weather,
            request.options.include_uncertainty,
            &self.settings.results,
        )
        .map_err(|error| OrchestrationError::processing(&error))?;
        result.flight_metrics.early_burst_risk = Some(early_burst_risk);
        if let Some(uncertainty) = uncertainty {
            crate::prediction::results::apply_monte_carlo(
                &mut result,
                uncertainty,
                &self.settings.results,
            );
        }
        context.metrics.processing_ms += elapsed_ms(phase_started);

        Ok(result)
    }

    fn recover(
        &self,
        request: &PredictionRequest,
        error: OrchestrationError,
        weather: &[crate::weather::WeatherData],
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        let strategy = match crate::prediction::recovery::classify(&error.code, error.phase) {
            Some(strategy) if strategy.can_recover => strategy,
            _ => return Err(error),
        };
        let method = strategy.fallback_method.unwrap_or(FallbackMethod::Simple);
        log::warn!("{:}; falling back to the {:} method", error, method);
        context.penalize(
            strategy.confidence_reduction,
            format!("{:}; used the {:} fallback", error.message, method),
        );

        let fallback = match method {
            FallbackMethod::Cached => self.cached(request, context),
            FallbackMethod::Degraded => self.degraded(request, weather, context),
            FallbackMethod::Simple => self.simple(request, weather, context),
        };
        match fallback {
            Ok(result) => Ok(self.finish(result, context)),
            Err(error) if error.code == crate::prediction::recovery::CANCELLED => Err(error),
            Err(error) => {
                log::warn!("fallback failed; {:}", error);
                context
                    .warnings
                    .push(format!("fallback failed; {:}", error.message));
                context.method = PredictionMethod::Minimal;
                Ok(self.finish(crate::prediction::results::minimal(request), context))
            }
        }
    }

    /// physics with the last weather seen near the launch site
    fn cached(
        &self,
        request: &PredictionRequest,
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        let weather = match self.cache.last_weather(&request.launch) {
            Some(weather) => weather,
            None => {
                context
                    .warnings
                    .push("no recent weather is cached for this launch site".to_string());
                return self.simple(request, &[], context);
            }
        };
        log::info!(
            "reusing {:} cached weather levels near {:}",
            weather.len(),
            request.launch
        );
        context.method = PredictionMethod::Cached;
        match self.physics(request, &weather, request.balloon.gas_volume(), None, context) {
            Err(error) if error.code != crate::prediction::recovery::CANCELLED => {
                log::warn!("{:}", error);
                context.warnings.push(error.message);
                self.simple(request, &weather, context)
            }
            result => result,
        }
    }

    /// physics without Monte Carlo, with the gas volume re-derived from the ascent rate
    fn degraded(
        &self,
        request: &PredictionRequest,
        weather: &[crate::weather::WeatherData],
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        context.method = PredictionMethod::Degraded;
        match self.physics(
            request,
            weather,
            request.balloon.derived_gas_volume(),
            None,
            context,
        ) {
            Err(error) if error.code != crate::prediction::recovery::CANCELLED => {
                log::warn!("{:}", error);
                context.warnings.push(error.message);
                self.simple(request, weather, context)
            }
            result => result,
        }
    }

    fn simple(
        &self,
        request: &PredictionRequest,
        weather: &[crate::weather::WeatherData],
        context: &mut Context,
    ) -> Result<PredictionResult, OrchestrationError> {
        context.method = PredictionMethod::Simple;
        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Calculation,
            0.5,
            "running the simple flight model".to_string(),
        );
        context.check_deadline(ProcessingPhase::Calculation)?;

        let wind = match Self::wind(request, weather) {
            Ok(wind) => wind,
            Err(_) => {
                context
                    .warnings
                    .push("no wind data; assuming calm air".to_string());
                crate::physics::wind::WindField::default()
            }
        };
        let (flight, _) = self.land_on_terrain(
            request.landing_altitude(),
            |flight: &crate::model::SimpleFlight| flight.descent.terminal.position,
            |landing_altitude| {
                crate::model::simple_flight(&crate::model::SimpleFlightInput {
                    launch: request.launch,
                    start_time: request.launch_time,
                    ascent_rate: request.balloon.ascent_rate,
                    burst_altitude: request.balloon.burst_altitude,
                    landing_altitude,
                    wind: wind.clone(),
                })
                .map_err(|error| OrchestrationError::simulation(&error))
            },
        )?;
        context.metrics.calculation_ms += elapsed_ms(phase_started);

        let phase_started = std::time::Instant::now();
        context.transition(
            ProcessingPhase::Processing,
            0.85,
            "aggregating flight phases".to_string(),
        );
        let result = crate::prediction::results::process(
            &[flight.ascent, flight.descent],
            weather,
            request.options.include_uncertainty,
            &self.settings.results,
        )
        .map_err(|error| OrchestrationError::processing(&error));
        context.metrics.processing_ms += elapsed_ms(phase_started);
        result
    }

    /// IDW elevation of the terrain under `point`, if a terrain service answers for it
    fn terrain_elevation(&self, point: &crate::location::GeoPoint) -> Option<f64> {
        let terrain = self.terrain.as_ref()?;
        match terrain.samples_near(point, crate::terrain::SEARCH_RADIUS) {
            Ok(samples) => crate::terrain::interpolate_elevation(point, &samples),
            Err(error) => {
                log::debug!("no terrain elevation at {:}; {:}", point, error);
                None
            }
        }
    }

    /// Descend again with the landing altitude set to the terrain under the previous landing.
    ///
    /// Returns the final descent and the landing altitude it was run with.
    fn land_on_terrain<T>(
        &self,
        landing_altitude: f64,
        landing: impl Fn(&T) -> crate::location::GeoPoint,
        descend: impl Fn(f64) -> Result<T, OrchestrationError>,
    ) -> Result<(T, f64), OrchestrationError> {
        let mut altitude = landing_altitude;
        let mut outcome = descend(altitude)?;
        for _ in 0..TERRAIN_ITERATIONS {
            let elevation = match self.terrain_elevation(&landing(&outcome)) {
                Some(elevation) => elevation.max(0.0),
                None => break,
            };
            if (elevation - altitude).abs() < TERRAIN_TOLERANCE {
                break;
            }
            match descend(elevation) {
                Ok(next) => {
                    outcome = next;
                    altitude = elevation;
                }
                Err(error) => {
                    log::warn!("could not descend to terrain at {:.0} m; {:}", elevation, error);
                    break;
                }
            }
        }
        Ok((outcome, altitude))
    }

    /// Describe the ground at the landing site.
    fn assess_terrain(&self, result: &mut PredictionResult, context: &mut Context) {
        let terrain = match &self.terrain {
            Some(terrain) => terrain,
            None => return,
        };
        let landing = result.landing_site.position;
        let assessment = terrain
            .samples_near(&landing, crate::terrain::SEARCH_RADIUS)
            .and_then(|samples| crate::terrain::assess_landing(&landing, &samples));

        match assessment {
            Ok(assessment) => {
                log::debug!(
                    "terrain at landing site is {:?} ({:.0} m, {:} samples)",
                    assessment.difficulty,
                    assessment.landing_elevation,
                    assessment.samples
                );
                if assessment.difficulty == crate::terrain::TerrainDifficulty::Difficult {
                    context.warnings.push(format!(
                        "landing terrain is difficult (score {:.2})",
                        assessment.difficulty_score
                    ));
                    if let Some(safe) = assessment.safe_landing {
                        context
                            .recommendations
                            .push(format!("nearest gentle ground is at {:}", safe));
                    }
                }
                result.terrain = Some(assessment);
            }
            Err(error) => {
                log::warn!("{:}; landing site not adjusted", error);
                context.incomplete = true;
                context.warnings.push(format!(
                    "{:}; landing site not adjusted for terrain",
                    error
                ));
            }
        }
    }

    /// apply recovery penalties and notes collected along the way
    fn finish(&self, mut result: PredictionResult, context: &mut Context) -> PredictionResult {
        if context.method == PredictionMethod::Minimal {
            result.quality_assessment.warnings.extend(
                context
                    .penalties
                    .iter()
                    .map(|(_, warning)| warning.clone()),
            );
        } else {
            self.assess_terrain(&mut result, context);
            for (reduction, warning) in &context.penalties {
                result.quality_assessment.penalize(*reduction, warning.clone());
            }
            result.method = context.method;
        }
        result
            .quality_assessment
            .warnings
            .extend(context.warnings.iter().cloned());
        result
            .quality_assessment
            .recommendations
            .extend(context.recommendations.iter().cloned());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::cache::{ManualClock, PredictionCache};
    use crate::utilities::approx_equal;
    use std::sync::Arc;

    struct UnavailableProvider;

    impl crate::weather::WeatherProvider for UnavailableProvider {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn select_weather_data(
            &self,
            _: &crate::weather::WeatherQuery,
        ) -> Result<Vec<crate::weather::WeatherData>, crate::weather::WeatherError> {
            Err(crate::weather::WeatherError::ServiceUnavailable {
                message: "connection refused".to_string(),
            })
        }
    }

    struct SlowProvider(std::time::Duration);

    impl crate::weather::WeatherProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn select_weather_data(
            &self,
            _: &crate::weather::WeatherQuery,
        ) -> Result<Vec<crate::weather::WeatherData>, crate::weather::WeatherError> {
            std::thread::sleep(self.0);
            Ok(crate::weather::tests::sounding(0.1))
        }
    }

    struct AcceptingValidator;

    impl crate::prediction::validation::InputValidator for AcceptingValidator {
        fn validate(&self, _: &PredictionRequest) -> crate::prediction::validation::ValidationReport {
            crate::prediction::validation::ValidationReport {
                is_valid: true,
                ..Default::default()
            }
        }
    }

    /// uniform ground around whatever point is asked about
    struct FlatTerrain(f64);

    impl crate::terrain::TerrainService for FlatTerrain {
        fn samples_near(
            &self,
            point: &crate::location::GeoPoint,
            _: f64,
        ) -> Result<Vec<crate::terrain::TerrainSample>, crate::terrain::TerrainError> {
            Ok([(0.01, 0.0), (-0.01, 0.0), (0.0, 0.01), (0.0, -0.01)]
                .iter()
                .map(|(north, east)| crate::terrain::TerrainSample {
                    lat: point.latitude + north,
                    lng: point.longitude + east,
                    elevation: self.0,
                    slope: Some(3.0),
                })
                .collect())
        }
    }

    struct MissingTerrain;

    impl crate::terrain::TerrainService for MissingTerrain {
        fn samples_near(
            &self,
            _: &crate::location::GeoPoint,
            _: f64,
        ) -> Result<Vec<crate::terrain::TerrainSample>, crate::terrain::TerrainError> {
            Err(crate::terrain::TerrainError::Unavailable {
                message: "elevation service offline".to_string(),
            })
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            crate::weather::tests::launch_time() - chrono::Duration::hours(6),
        ))
    }

    fn sounding(uncertainty: f64) -> Arc<dyn crate::weather::WeatherProvider> {
        Arc::new(crate::weather::StaticWeatherProvider::new(
            crate::weather::tests::sounding(uncertainty),
        ))
    }

    fn orchestrator_with_cache(
        weather: Arc<dyn crate::weather::WeatherProvider>,
        clock: Arc<ManualClock>,
        cache: Arc<PredictionCache>,
    ) -> PredictionOrchestrator {
        PredictionOrchestrator::new(
            weather,
            Arc::new(crate::prediction::validation::RequestValidator::new(clock)),
            cache,
        )
    }

    fn orchestrator(weather: Arc<dyn crate::weather::WeatherProvider>) -> PredictionOrchestrator {
        let clock = clock();
        let cache = Arc::new(PredictionCache::new(
            clock.clone(),
            chrono::Duration::minutes(5),
        ));
        orchestrator_with_cache(weather, clock, cache)
    }

    fn request() -> PredictionRequest {
        crate::prediction::tests::request()
    }

    fn without_uncertainty() -> PredictionRequest {
        let mut request = request();
        request.options.include_uncertainty = false;
        request
    }

    #[test]
    fn test_end_to_end() {
        let mut request = request();
        request.overrides.wind = Some(crate::physics::wind::WindField::constant(10.0, 90.0));

        let result = orchestrator(sounding(0.1)).execute(&request).unwrap();

        assert_eq!(result.method, PredictionMethod::Physics);
        assert!(!result.cache_hit);
        assert!(result.flight_metrics.descent_duration > 0.0);
        assert!(result.flight_metrics.landing_velocity > 0.0);
        assert!((0.0..=1.0).contains(&result.quality_assessment.prediction_confidence));
        assert!(result.burst_site.position.altitude > 10000.0);
        assert_eq!(result.landing_site.position.altitude, 0.0);
        // carried east
        assert!(result.burst_site.position.longitude > request.launch.longitude);
        assert!(result.landing_site.position.longitude > result.burst_site.position.longitude);

        let uncertainty = result.uncertainty.unwrap();
        assert_eq!(uncertainty.samples + uncertainty.failed, 24);
        assert_eq!(
            result.landing_site.uncertainty,
            uncertainty.landing_radius.clamp(100.0, 50000.0)
        );
    }

    #[test]
    fn test_calm_air_lands_under_burst() {
        let mut request = without_uncertainty();
        request.overrides.wind = Some(crate::physics::wind::WindField::constant(0.0, 90.0));

        let result = orchestrator(sounding(0.1)).execute(&request).unwrap();

        let burst = result.burst_site.position;
        let landing = result.landing_site.position;
        assert!(approx_equal(landing.latitude, burst.latitude, 6));
        assert!(approx_equal(landing.longitude, burst.longitude, 6));
        assert!(approx_equal(landing.latitude, request.launch.latitude, 6));
    }

    #[test]
    fn test_weather_failure_recovers() {
        let orchestrator = orchestrator(Arc::new(UnavailableProvider));
        let result = orchestrator.execute(&without_uncertainty()).unwrap();

        assert_eq!(result.method, PredictionMethod::Simple);
        assert!(!result.quality_assessment.warnings.is_empty());
        assert!(result.quality_assessment.prediction_confidence < 0.8);
        assert!(result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.contains("connection refused")));
        // fallbacks are never cached
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_failed_fallback_returns_minimal() {
        let clock = clock();
        let orchestrator = PredictionOrchestrator::new(
            Arc::new(UnavailableProvider),
            Arc::new(AcceptingValidator),
            Arc::new(PredictionCache::new(clock, chrono::Duration::minutes(5))),
        );
        // the simple model cannot fly a balloon that does not climb
        let mut request = without_uncertainty();
        request.balloon.ascent_rate = 0.0;

        let result = orchestrator.execute(&request).unwrap();

        assert_eq!(result.method, PredictionMethod::Minimal);
        assert!(approx_equal(result.quality_assessment.prediction_confidence, 0.1, 9));
        assert_eq!(result.landing_site.position, request.launch);
        assert!(result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.starts_with("fallback failed")));
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_failed_uncertainty_is_not_cached() {
        let orchestrator = PredictionOrchestrator::new(
            sounding(0.1),
            Arc::new(AcceptingValidator),
            Arc::new(PredictionCache::new(clock(), chrono::Duration::minutes(5))),
        );
        let mut request = request();
        request.options.monte_carlo_samples = 0;

        let result = orchestrator.execute(&request).unwrap();

        assert_eq!(result.method, PredictionMethod::Physics);
        assert!(result.uncertainty.is_none());
        assert!(result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.starts_with("uncertainty analysis failed")));
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_cached_weather_fallback() {
        let clock = clock();
        let cache = Arc::new(PredictionCache::new(
            clock.clone(),
            chrono::Duration::minutes(5),
        ));
        orchestrator_with_cache(sounding(0.1), clock.clone(), cache.clone())
            .execute(&without_uncertainty())
            .unwrap();

        let mut request = without_uncertainty();
        request.balloon.payload_mass = 1.1;
        let result = orchestrator_with_cache(Arc::new(UnavailableProvider), clock, cache)
            .execute(&request)
            .unwrap();

        assert_eq!(result.method, PredictionMethod::Cached);
        assert_eq!(result.weather_impact.data_points, 16);
        assert!(result.quality_assessment.prediction_confidence < 0.8);
    }

    #[test]
    fn test_weather_timeout() {
        let mut orchestrator = orchestrator(Arc::new(SlowProvider(
            std::time::Duration::from_secs(2),
        )));
        orchestrator.settings.weather_timeout = std::time::Duration::from_millis(50);

        let execution = orchestrator
            .execute_with(&without_uncertainty(), ExecutionOptions::default())
            .unwrap();

        assert_eq!(execution.result.method, PredictionMethod::Simple);
        assert!(execution
            .result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.contains("timed out")));
        assert!(execution.metrics.weather_ms < 1000.0);
    }

    #[test]
    fn test_deadline_cancels() {
        let orchestrator = orchestrator(sounding(0.1));
        let error = orchestrator
            .execute_with(
                &request(),
                ExecutionOptions {
                    deadline: Some(std::time::Instant::now()),
                    status: None,
                },
            )
            .unwrap_err();

        assert_eq!(error.code, crate::prediction::recovery::CANCELLED);
        assert_eq!(error.phase, ProcessingPhase::Weather);
        assert!(!error.recoverable);
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_deadline_while_waiting_on_leader() {
        let orchestrator = orchestrator(sounding(0.1));
        let request = request();
        let key = crate::prediction::cache::cache_key(&request);
        let guard = match orchestrator.cache().acquire(&key, None) {
            crate::prediction::cache::Lookup::Leader(guard) => guard,
            _ => panic!("empty cache did not hand out the key"),
        };

        let error = orchestrator
            .execute_with(
                &request,
                ExecutionOptions {
                    deadline: Some(std::time::Instant::now() + std::time::Duration::from_millis(50)),
                    status: None,
                },
            )
            .unwrap_err();

        assert_eq!(error.code, crate::prediction::recovery::CANCELLED);
        guard.complete(None);
    }

    #[test]
    fn test_invalid_coordinates_are_rejected() {
        let orchestrator = orchestrator(sounding(0.1));
        let mut request = request();
        request.launch.latitude = 95.0;

        let error = orchestrator.execute(&request).unwrap_err();

        assert_eq!(error.code, crate::prediction::recovery::VALIDATION_FAILED);
        assert_eq!(error.phase, ProcessingPhase::Validation);
        assert!(!error.recoverable);
        match error.details {
            crate::prediction::recovery::ErrorDetail::Validation { errors } => {
                assert_eq!(errors[0].code, "INVALID_COORDINATES");
            }
            details => panic!("unexpected details {:?}", details),
        }
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_soft_validation_degrades() {
        let clock = clock();
        clock.advance(-chrono::Duration::days(10));
        let cache = Arc::new(PredictionCache::new(
            clock.clone(),
            chrono::Duration::minutes(5),
        ));
        let orchestrator = orchestrator_with_cache(sounding(0.1), clock, cache);

        let penalized = orchestrator.execute(&request()).unwrap();

        assert_eq!(penalized.method, PredictionMethod::Degraded);
        assert!(penalized.uncertainty.is_none());
        assert!(penalized
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.contains("forecast horizon")));
        assert!(orchestrator.cache().is_empty());
    }

    #[test]
    fn test_poor_weather_degrades() {
        let result = orchestrator(sounding(0.7)).execute(&request()).unwrap();

        assert_eq!(result.method, PredictionMethod::Degraded);
        assert!(result.uncertainty.is_none());
        assert!(result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.contains("unreliable")));
    }

    #[test]
    fn test_cache_idempotence() {
        let orchestrator = orchestrator(sounding(0.1));
        let request = request();

        let first = orchestrator
            .execute_with(&request, ExecutionOptions::default())
            .unwrap();
        let second = orchestrator
            .execute_with(&request, ExecutionOptions::default())
            .unwrap();

        assert!(!first.metrics.cache_hit);
        assert!(second.metrics.cache_hit);
        assert!(second.result.cache_hit);
        let mut cached = second.result;
        cached.cache_hit = false;
        assert_eq!(cached, first.result);
        assert_eq!(orchestrator.cache().len(), 1);
    }

    #[test]
    fn test_seed_follows_request() {
        let request = request();
        let first = orchestrator(sounding(0.1)).execute(&request).unwrap();
        let second = orchestrator(sounding(0.1)).execute(&request).unwrap();

        assert!(first.uncertainty.is_some());
        assert_eq!(first.uncertainty, second.uncertainty);
    }

    #[test]
    fn test_status_updates() {
        let (sender, receiver) = crossbeam::channel::unbounded();
        let execution = orchestrator(sounding(0.1))
            .execute_with(
                &without_uncertainty(),
                ExecutionOptions {
                    deadline: None,
                    status: Some(sender),
                },
            )
            .unwrap();

        let updates: Vec<ProcessingStatus> = receiver.try_iter().collect();
        let mut phases: Vec<ProcessingPhase> = updates.iter().map(|update| update.phase).collect();
        phases.dedup();
        assert_eq!(
            phases,
            vec![
                ProcessingPhase::Validation,
                ProcessingPhase::Weather,
                ProcessingPhase::Calculation,
                ProcessingPhase::Processing,
                ProcessingPhase::Complete,
            ]
        );
        assert!(updates
            .windows(2)
            .all(|pair| pair[0].progress <= pair[1].progress));
        assert_eq!(execution.status.progress, 1.0);
        assert!(execution.metrics.total_ms >= execution.metrics.calculation_ms);
    }

    #[test]
    fn test_terrain_adjusts_landing() {
        let mut request = without_uncertainty();
        request.overrides.wind = Some(crate::physics::wind::WindField::constant(10.0, 90.0));

        let lowland = orchestrator(sounding(0.1))
            .with_terrain(Arc::new(FlatTerrain(0.0)))
            .execute(&request)
            .unwrap();
        let highland = orchestrator(sounding(0.1))
            .with_terrain(Arc::new(FlatTerrain(1500.0)))
            .execute(&request)
            .unwrap();

        for (result, elevation) in [(&lowland, 0.0), (&highland, 1500.0)] {
            let terminal = result.trajectory.last().unwrap();
            assert!(approx_equal(result.landing_site.position.altitude, elevation, 6));
            assert_eq!(terminal.position, result.landing_site.position);
            assert_eq!(terminal.time, result.landing_site.time);
        }
        assert_eq!(lowland.burst_site, highland.burst_site);
        // high ground cuts the descent short, before the wind carries it as far east
        assert!(highland.flight_metrics.descent_duration < lowland.flight_metrics.descent_duration);
        assert!(highland.landing_site.position.longitude < lowland.landing_site.position.longitude);

        let terrain = highland.terrain.unwrap();
        assert!(approx_equal(terrain.landing_elevation, 1500.0, 6));
        assert_eq!(terrain.difficulty, crate::terrain::TerrainDifficulty::Easy);
        assert_eq!(terrain.samples, 4);
    }

    #[test]
    fn test_terrain_adjusts_simple_landing() {
        let result = orchestrator(Arc::new(UnavailableProvider))
            .with_terrain(Arc::new(FlatTerrain(800.0)))
            .execute(&without_uncertainty())
            .unwrap();

        assert_eq!(result.method, PredictionMethod::Simple);
        assert!(approx_equal(result.landing_site.position.altitude, 800.0, 6));
        assert_eq!(
            result.trajectory.last().unwrap().position,
            result.landing_site.position
        );
    }

    #[test]
    fn test_missing_terrain_leaves_landing() {
        let orchestrator = orchestrator(sounding(0.1)).with_terrain(Arc::new(MissingTerrain));
        let result = orchestrator.execute(&without_uncertainty()).unwrap();

        assert!(result.terrain.is_none());
        assert_eq!(result.landing_site.position.altitude, 0.0);
        assert_eq!(result.method, PredictionMethod::Physics);
        // retried on the next request rather than served from the cache
        assert!(orchestrator.cache().is_empty());
        assert!(result
            .quality_assessment
            .warnings
            .iter()
            .any(|warning| warning.contains("landing site not adjusted")));
    }
}
