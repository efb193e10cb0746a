use crate::prediction::{
    FlightMetrics, PredictionMethod, PredictionQuality, PredictionResult, QualityAssessment,
    SiteEstimate, WeatherImpact,
};

/// landing radius above which recovery planning gets a warning, in m
const WIDE_LANDING_ZONE: f64 = 10000.0;

/// m/s
const STRONG_WIND: f64 = 20.0;

fn default_burst_uncertainty_factor() -> f64 {
    0.05
}

fn default_landing_uncertainty_factor() -> f64 {
    0.1
}

fn default_min_uncertainty() -> f64 {
    100.0
}

fn default_max_uncertainty() -> f64 {
    50000.0
}

/// Scaling of site uncertainty radii, in meters per meter of altitude.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultsSettings {
    #[serde(default = "default_burst_uncertainty_factor")]
    pub burst_uncertainty_factor: f64,
    #[serde(default = "default_landing_uncertainty_factor")]
    pub landing_uncertainty_factor: f64,
    #[serde(default = "default_min_uncertainty")]
    pub min_uncertainty: f64,
    #[serde(default = "default_max_uncertainty")]
    pub max_uncertainty: f64,
}

impl Default for ResultsSettings {
    fn default() -> Self {
        Self {
            burst_uncertainty_factor: default_burst_uncertainty_factor(),
            landing_uncertainty_factor: default_landing_uncertainty_factor(),
            min_uncertainty: default_min_uncertainty(),
            max_uncertainty: default_max_uncertainty(),
        }
    }
}

impl ResultsSettings {
    fn clamp(&self, radius: f64) -> f64 {
        radius.clamp(self.min_uncertainty, self.max_uncertainty.max(self.min_uncertainty))
    }
}

custom_error::custom_error! {pub ProcessingError
    EmptyTrajectory = "simulation produced no trajectory points",
    NonFinite { field: String } = "simulation produced a non-finite {field}",
}

impl ProcessingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyTrajectory => "PROCESSING_FAILED",
            Self::NonFinite { .. } => "INVALID_RESULT",
        }
    }
}

fn categorize(confidence: f64, completeness: f64) -> PredictionQuality {
    let quality = if confidence >= 0.85 {
        PredictionQuality::Excellent
    } else if confidence >= 0.7 {
        PredictionQuality::Good
    } else if confidence >= 0.5 {
        PredictionQuality::Fair
    } else {
        PredictionQuality::Poor
    };
    // a sparse profile cannot support a better grade
    if completeness < 0.5 {
        quality.min(PredictionQuality::Fair)
    } else {
        quality
    }
}

impl QualityAssessment {
    /// Multiply confidence by `1 - reduction`, note why, and regrade.
    pub fn penalize(&mut self, reduction: f64, warning: String) {
        self.prediction_confidence =
            (self.prediction_confidence * (1.0 - reduction.clamp(0.0, 1.0))).clamp(0.0, 1.0);
        self.quality = categorize(self.prediction_confidence, self.data_completeness);
        self.warnings.push(warning);
    }
}

fn same_point(a: &crate::location::TrajectoryPoint, b: &crate::location::TrajectoryPoint) -> bool {
    a.time == b.time && a.position == b.position
}

/// phases joined end to end, without repeating the point where one hands over to the next
fn join_trajectories(phases: &[crate::simulation::PhaseResult]) -> Vec<crate::location::TrajectoryPoint> {
    let mut trajectory: Vec<crate::location::TrajectoryPoint> = vec![];
    for phase in phases {
        let mut points = phase.trajectory.iter();
        if let (Some(last), Some(first)) = (trajectory.last(), phase.trajectory.first()) {
            if same_point(last, first) {
                points.next();
            }
        }
        trajectory.extend(points.cloned());
    }
    trajectory
}

fn phase_durations(
    phases: &[crate::simulation::PhaseResult],
    phase: crate::location::FlightPhase,
) -> (f64, f64) {
    phases
        .iter()
        .filter(|result| result.phase == phase)
        .fold((0.0, 0.0), |(duration, drift), result| {
            (duration + result.duration, drift + result.wind_drift_distance)
        })
}

fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn weather_impact(
    phases: &[crate::simulation::PhaseResult],
    weather: &[crate::weather::WeatherData],
) -> WeatherImpact {
    let (_, ascent_drift) = phase_durations(phases, crate::location::FlightPhase::Ascent);
    let (_, descent_drift) = phase_durations(phases, crate::location::FlightPhase::Descent);
    let usable: Vec<&crate::weather::WeatherData> = weather
        .iter()
        .filter(|entry| entry.is_finite() && entry.altitude >= 0.0)
        .collect();

    let temperature_deviation = mean(usable.iter().filter_map(|entry| {
        crate::physics::atmosphere::temperature(entry.altitude)
            .ok()
            .map(|standard| entry.temperature + 273.15 - standard)
    }));
    let pressure_deviation = mean(usable.iter().filter_map(|entry| {
        crate::physics::atmosphere::pressure(entry.altitude)
            .ok()
            .map(|standard| entry.pressure - standard)
    }));

    let (east, north) = usable.iter().fold((0.0, 0.0), |(east, north), entry| {
        let (entry_east, entry_north) =
            crate::physics::wind::WindSample::new(entry.wind_speed, entry.wind_direction)
                .components();
        (east + entry_east, north + entry_north)
    });
    let prevailing = crate::physics::wind::WindSample::from_components(east, north);

    WeatherImpact {
        wind_drift_distance: phases.iter().map(|phase| phase.wind_drift_distance).sum(),
        ascent_drift,
        descent_drift,
        temperature_deviation,
        pressure_deviation,
        mean_wind_speed: mean(usable.iter().map(|entry| entry.wind_speed)),
        prevailing_wind_direction: if prevailing.speed > 0.0 {
            Some(prevailing.direction)
        } else {
            None
        },
        data_points: weather.len(),
    }
}

/// Aggregate simulated phases and the weather behind them into a prediction.
///
/// The burst site is the end of the last ascent phase (or the start of the flight when there is
/// none) and the landing site is the end of the last phase.
pub fn process(
    phases: &[crate::simulation::PhaseResult],
    weather: &[crate::weather::WeatherData],
    include_uncertainty: bool,
    settings: &ResultsSettings,
) -> Result<PredictionResult, ProcessingError> {
    let trajectory = join_trajectories(phases);
    let (launch, landing) = match (trajectory.first(), phases.last()) {
        (Some(launch), Some(last)) => (launch.clone(), last.terminal.clone()),
        _ => return Err(ProcessingError::EmptyTrajectory),
    };
    if let Some(point) = trajectory.iter().find(|point| {
        !(point.position.latitude.is_finite()
            && point.position.longitude.is_finite()
            && point.position.altitude.is_finite())
    }) {
        return Err(ProcessingError::NonFinite {
            field: format!("position at {}", point.time),
        });
    }
    let burst = phases
        .iter()
        .filter(|phase| phase.phase == crate::location::FlightPhase::Ascent)
        .last()
        .map(|phase| phase.terminal.clone())
        .unwrap_or_else(|| launch.clone());

    let weather_uncertainty = crate::weather::mean_uncertainty(weather)
        .unwrap_or(crate::weather::POOR_QUALITY_UNCERTAINTY);
    let weather_confidence = 1.0 - weather_uncertainty;
    let completeness = crate::weather::data_completeness(weather);

    let (burst_uncertainty, landing_uncertainty) = if include_uncertainty {
        let scale = weather_confidence.max(0.1);
        let height = burst.position.altitude - landing.position.altitude.min(launch.position.altitude);
        (
            settings.clamp(burst.position.altitude * settings.burst_uncertainty_factor / scale),
            settings.clamp(height.max(0.0) * settings.landing_uncertainty_factor / scale),
        )
    } else {
        (0.0, 0.0)
    };

    let (ascent_duration, _) = phase_durations(phases, crate::location::FlightPhase::Ascent);
    let (descent_duration, _) = phase_durations(phases, crate::location::FlightPhase::Descent);
    let max_wind = trajectory
        .iter()
        .map(|point| point.wind_speed)
        .fold(0.0, f64::max);
    let flight_metrics = FlightMetrics {
        ascent_duration,
        descent_duration,
        total_duration: phases.iter().map(|phase| phase.duration).sum(),
        max_altitude: crate::location::track::max_altitude(&trajectory)
            .unwrap_or(burst.position.altitude),
        total_distance: crate::location::track::total_distance(&trajectory) / 1000.0,
        ground_distance: launch.position.ground_distance(&landing.position) / 1000.0,
        mean_wind_speed: crate::location::track::mean_wind_speed(&trajectory).unwrap_or_default(),
        average_ascent_rate: if ascent_duration > 0.0 {
            (burst.position.altitude - launch.position.altitude) / ascent_duration
        } else {
            0.0
        },
        max_velocity: phases
            .iter()
            .map(|phase| phase.max_velocity)
            .fold(0.0, f64::max),
        landing_velocity: phases
            .iter()
            .filter(|phase| phase.phase == crate::location::FlightPhase::Descent)
            .last()
            .map(|phase| phase.terminal_velocity)
            .unwrap_or_default(),
        early_burst_risk: None,
    };

    let phase_confidence = mean(phases.iter().map(|phase| phase.confidence)).unwrap_or_default();
    let confidence = (phase_confidence * (0.5 + 0.5 * weather_confidence * completeness))
        .clamp(0.0, 1.0);

    let mut warnings = vec![];
    let mut recommendations = vec![];
    if confidence < 0.7 {
        warnings.push(format!(
            "prediction confidence is {:.0}%; treat the landing site as approximate",
            100.0 * confidence
        ));
        recommendations.push("re-run the prediction closer to launch".to_string());
    }
    if weather_uncertainty > 0.3 {
        warnings.push(format!(
            "weather data uncertainty is high ({:.2})",
            weather_uncertainty
        ));
        recommendations.push("compare against a second weather model".to_string());
    }
    if completeness < 0.8 {
        warnings.push(format!(
            "weather profile covers {:.0}% of the expected levels",
            100.0 * completeness
        ));
        recommendations.push("use a weather source with a full vertical profile".to_string());
    }
    if max_wind > STRONG_WIND {
        warnings.push(format!(
            "strong winds aloft (up to {:.1} m/s) lengthen the drift",
            max_wind
        ));
        recommendations.push("plan recovery routes along the drift direction".to_string());
    }

    Ok(PredictionResult {
        burst_site: SiteEstimate {
            position: burst.position,
            time: burst.time,
            uncertainty: burst_uncertainty,
        },
        landing_site: SiteEstimate {
            position: landing.position,
            time: landing.time,
            uncertainty: landing_uncertainty,
        },
        flight_metrics,
        weather_impact: weather_impact(phases, weather),
        quality_assessment: QualityAssessment {
            quality: categorize(confidence, completeness),
            prediction_confidence: confidence,
            data_completeness: completeness,
            weather_uncertainty,
            warnings,
            recommendations,
        },
        trajectory,
        uncertainty: None,
        terrain: None,
        method: PredictionMethod::Physics,
        cache_hit: false,
    })
}

/// Attach a Monte Carlo envelope; its landing radius replaces the heuristic one.
pub fn apply_monte_carlo(
    result: &mut PredictionResult,
    monte_carlo: crate::simulation::monte_carlo::MonteCarloResult,
    settings: &ResultsSettings,
) {
    result.landing_site.uncertainty = settings.clamp(monte_carlo.landing_radius);
    if monte_carlo.landing_radius > WIDE_LANDING_ZONE {
        result.quality_assessment.warnings.push(format!(
            "95% of simulated landings fall within {:.1} km",
            monte_carlo.landing_radius / 1000.0
        ));
        result
            .quality_assessment
            .recommendations
            .push("stage recovery teams across the landing zone".to_string());
    }
    result.uncertainty = Some(monte_carlo);
}

/// Launch-site placeholder for when nothing could be simulated.
pub fn minimal(request: &crate::prediction::PredictionRequest) -> PredictionResult {
    let site = SiteEstimate {
        position: request.launch,
        time: request.launch_time,
        uncertainty: ResultsSettings::default().max_uncertainty,
    };
    PredictionResult {
        trajectory: vec![crate::location::TrajectoryPoint {
            position: request.launch,
            time: request.launch_time,
            velocity: 0.0,
            wind_speed: 0.0,
            wind_direction: 0.0,
            phase: crate::location::FlightPhase::Landing,
        }],
        burst_site: site.clone(),
        landing_site: site,
        flight_metrics: FlightMetrics::default(),
        weather_impact: WeatherImpact::default(),
        quality_assessment: QualityAssessment {
            quality: PredictionQuality::Poor,
            prediction_confidence: 0.1,
            data_completeness: 0.0,
            weather_uncertainty: 1.0,
            warnings: vec!["no flight could be simulated; showing the launch site only".to_string()],
            recommendations: vec!["check the balloon parameters and weather source".to_string()],
        },
        uncertainty: None,
        terrain: None,
        method: PredictionMethod::Minimal,
        cache_hit: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FlightPhase, GeoPoint};
    use crate::utilities::approx_equal;

    fn flight() -> crate::model::SimpleFlight {
        crate::model::simple_flight(&crate::model::SimpleFlightInput {
            launch: GeoPoint::new(40.7128, -74.0060, 0.0),
            start_time: crate::weather::tests::launch_time(),
            ascent_rate: 5.0,
            burst_altitude: 30000.0,
            landing_altitude: 0.0,
            wind: crate::weather::wind_profile(&crate::weather::tests::sounding(0.1)).unwrap(),
        })
        .unwrap()
    }

    fn phases() -> Vec<crate::simulation::PhaseResult> {
        let flight = flight();
        vec![flight.ascent, flight.descent]
    }

    #[test]
    fn test_process_joins_phases() {
        let phases = phases();
        let weather = crate::weather::tests::sounding(0.1);
        let result = process(&phases, &weather, true, &ResultsSettings::default()).unwrap();

        assert_eq!(
            result.trajectory.len(),
            phases[0].trajectory.len() + phases[1].trajectory.len() - 1
        );
        assert_eq!(result.burst_site.position.altitude, 30000.0);
        assert_eq!(result.landing_site.position.altitude, 0.0);
        assert_eq!(result.trajectory.last().unwrap().phase, FlightPhase::Landing);
        assert_eq!(result.flight_metrics.max_altitude, 30000.0);
        assert!(approx_equal(result.flight_metrics.average_ascent_rate, 5.0, 6));
        assert!(approx_equal(
            result.flight_metrics.total_duration,
            result.flight_metrics.ascent_duration + result.flight_metrics.descent_duration,
            6
        ));
        assert!(result.flight_metrics.total_distance >= result.flight_metrics.ground_distance);
        assert_eq!(result.method, PredictionMethod::Physics);
    }

    #[test]
    fn test_uncertainty_scaling() {
        let phases = phases();
        let settings = ResultsSettings::default();

        let good = process(&phases, &crate::weather::tests::sounding(0.1), true, &settings).unwrap();
        let poor = process(&phases, &crate::weather::tests::sounding(0.4), true, &settings).unwrap();
        assert!(approx_equal(good.burst_site.uncertainty, 30000.0 * 0.05 / 0.9, 6));
        assert!(poor.landing_site.uncertainty > good.landing_site.uncertainty);
        assert!(good.landing_site.uncertainty <= settings.max_uncertainty);

        let without = process(&phases, &crate::weather::tests::sounding(0.1), false, &settings)
            .unwrap();
        assert_eq!(without.landing_site.uncertainty, 0.0);
    }

    #[test]
    fn test_quality_assessment() {
        let phases = phases();
        let settings = ResultsSettings::default();

        let good = process(&phases, &crate::weather::tests::sounding(0.1), true, &settings).unwrap();
        let assessment = &good.quality_assessment;
        assert!((0.0..=1.0).contains(&assessment.prediction_confidence));
        assert_eq!(assessment.data_completeness, 1.0);
        // kinematic phases are never better than 50% confident
        assert!(assessment.prediction_confidence < 0.5);
        assert_eq!(assessment.quality, PredictionQuality::Poor);
        assert!(assessment
            .warnings
            .iter()
            .any(|warning| warning.starts_with("prediction confidence")));
        // the jet stream in the sounding
        assert!(assessment
            .warnings
            .iter()
            .any(|warning| warning.starts_with("strong winds")));

        // two levels of unreliable data
        let sparse: Vec<crate::weather::WeatherData> = crate::weather::tests::sounding(0.6)
            .into_iter()
            .take(2)
            .collect();
        let poor = process(&phases, &sparse, true, &settings).unwrap();
        assert!(poor.quality_assessment.prediction_confidence < assessment.prediction_confidence);
        assert!(poor.quality_assessment.quality <= PredictionQuality::Fair);
        assert!(poor.quality_assessment.warnings.len() >= 3);
        assert_eq!(
            poor.quality_assessment.warnings.len(),
            poor.quality_assessment.recommendations.len()
        );
    }

    #[test]
    fn test_weather_impact() {
        let phases = phases();
        let weather = crate::weather::tests::sounding(0.1);
        let result = process(&phases, &weather, true, &ResultsSettings::default()).unwrap();
        let impact = &result.weather_impact;

        // soundings follow the standard atmosphere
        assert!(impact.temperature_deviation.unwrap().abs() < 1e-6);
        assert!(impact.pressure_deviation.unwrap().abs() < 1e-6);
        assert_eq!(impact.data_points, weather.len());
        assert!(approx_equal(
            impact.wind_drift_distance,
            impact.ascent_drift + impact.descent_drift,
            9
        ));
        let direction = impact.prevailing_wind_direction.unwrap();
        assert!((80.0..=95.0).contains(&direction));
    }

    #[test]
    fn test_empty_phases() {
        let error = process(&[], &[], true, &ResultsSettings::default()).unwrap_err();
        assert_eq!(error.code(), "PROCESSING_FAILED");
    }

    #[test]
    fn test_penalize() {
        let mut assessment = QualityAssessment {
            quality: PredictionQuality::Excellent,
            prediction_confidence: 0.9,
            data_completeness: 1.0,
            weather_uncertainty: 0.1,
            warnings: vec![],
            recommendations: vec![],
        };
        assessment.penalize(0.5, "weather service unavailable".to_string());

        assert!(approx_equal(assessment.prediction_confidence, 0.45, 9));
        assert_eq!(assessment.quality, PredictionQuality::Poor);
        assert_eq!(assessment.warnings, vec!["weather service unavailable"]);
    }

    #[test]
    fn test_minimal() {
        let request = crate::prediction::tests::request();
        let result = minimal(&request);

        assert_eq!(result.landing_site.position, request.launch);
        assert_eq!(result.quality_assessment.prediction_confidence, 0.1);
        assert_eq!(result.method, PredictionMethod::Minimal);
        assert!(!result.quality_assessment.warnings.is_empty());
    }
}
