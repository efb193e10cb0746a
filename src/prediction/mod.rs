pub mod cache;
pub mod export;
pub mod orchestrator;
pub mod recovery;
pub mod results;
pub mod validation;

lazy_static::lazy_static! {
    static ref DEFAULT_ASCENT_RATE: f64 = 5.0;
    static ref DEFAULT_BALLOON_DRAG_COEFFICIENT: f64 = 0.3;
    static ref DEFAULT_PARACHUTE_DRAG_COEFFICIENT: f64 = 1.5;
    static ref DEFAULT_WEATHER_WINDOW_MINUTES: i64 = 180;
}

fn default_ascent_rate() -> f64 {
    *DEFAULT_ASCENT_RATE
}

fn default_balloon_drag_coefficient() -> f64 {
    *DEFAULT_BALLOON_DRAG_COEFFICIENT
}

fn default_parachute_drag_coefficient() -> f64 {
    *DEFAULT_PARACHUTE_DRAG_COEFFICIENT
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BalloonSpecs {
    /// kg
    pub payload_mass: f64,
    /// kg
    #[serde(default)]
    pub balloon_mass: f64,
    /// lifting-gas volume at sea-level pressure in m^3, derived from `ascent_rate` when absent
    #[serde(default)]
    pub gas_volume: Option<f64>,
    /// target ascent rate in m/s
    #[serde(default = "default_ascent_rate")]
    pub ascent_rate: f64,
    pub burst_altitude: f64,
    #[serde(default = "default_balloon_drag_coefficient")]
    pub balloon_drag_coefficient: f64,
    /// m^2
    pub parachute_area: f64,
    #[serde(default = "default_parachute_drag_coefficient")]
    pub parachute_drag_coefficient: f64,
}

impl BalloonSpecs {
    pub fn lifted_mass(&self) -> f64 {
        self.payload_mass + self.balloon_mass
    }

    pub fn gas_volume(&self) -> Result<f64, crate::physics::PhysicsError> {
        match self.gas_volume {
            Some(volume) => Ok(volume),
            None => self.derived_gas_volume(),
        }
    }

    /// gas volume settling at the target ascent rate
    pub fn derived_gas_volume(&self) -> Result<f64, crate::physics::PhysicsError> {
        crate::physics::volume_for_ascent_rate(
            self.lifted_mass(),
            self.ascent_rate,
            self.balloon_drag_coefficient,
        )
    }
}

#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvironmentalOverrides {
    /// replaces the wind derived from weather data
    #[serde(default)]
    pub wind: Option<crate::physics::wind::WindField>,
    #[serde(default)]
    #[serde_as(as = "Option<serde_with::DurationSeconds<i64>>")]
    pub max_flight_time: Option<chrono::Duration>,
}

fn default_include_uncertainty() -> bool {
    true
}

fn default_monte_carlo_samples() -> i64 {
    crate::simulation::monte_carlo::DEFAULT_SAMPLES
}

fn default_wind_error_rms() -> f64 {
    crate::simulation::monte_carlo::MonteCarloConfig::default().wind_error_rms
}

fn default_weather_window_minutes() -> i64 {
    *DEFAULT_WEATHER_WINDOW_MINUTES
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PredictionOptions {
    #[serde(default = "default_include_uncertainty")]
    pub include_uncertainty: bool,
    #[serde(default = "default_monte_carlo_samples")]
    pub monte_carlo_samples: i64,
    /// m/s
    #[serde(default = "default_wind_error_rms")]
    pub wind_error_rms: f64,
    #[serde(default = "default_weather_window_minutes")]
    pub weather_window_minutes: i64,
    #[serde(default)]
    pub resolution: crate::weather::WeatherResolution,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            include_uncertainty: default_include_uncertainty(),
            monte_carlo_samples: default_monte_carlo_samples(),
            wind_error_rms: default_wind_error_rms(),
            weather_window_minutes: default_weather_window_minutes(),
            resolution: crate::weather::WeatherResolution::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PredictionRequest {
    pub launch: crate::location::GeoPoint,
    #[serde(with = "crate::utilities::utc_datetime_string")]
    pub launch_time: chrono::DateTime<chrono::Utc>,
    pub balloon: BalloonSpecs,
    /// defaults to the launch altitude
    #[serde(default)]
    pub landing_altitude: Option<f64>,
    #[serde(default)]
    pub overrides: EnvironmentalOverrides,
    #[serde(default)]
    pub options: PredictionOptions,
}

impl PredictionRequest {
    pub fn landing_altitude(&self) -> f64 {
        self.landing_altitude.unwrap_or(self.launch.altitude)
    }

    pub fn max_flight_time(&self) -> chrono::Duration {
        self.overrides
            .max_flight_time
            .unwrap_or(*crate::DEFAULT_MAX_FLIGHT_TIME)
    }

    pub fn weather_query(&self) -> crate::weather::WeatherQuery {
        crate::weather::WeatherQuery {
            location: self.launch,
            launch_time: self.launch_time,
            window_minutes: self.options.weather_window_minutes,
            resolution: self.options.resolution,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SiteEstimate {
    pub position: crate::location::GeoPoint,
    /// RFC 3339, keeping fractional seconds
    pub time: chrono::DateTime<chrono::Utc>,
    /// horizontal uncertainty radius, in meters
    pub uncertainty: f64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlightMetrics {
    /// seconds
    pub ascent_duration: f64,
    pub descent_duration: f64,
    pub total_duration: f64,
    pub max_altitude: f64,
    /// path length over the ground, in km
    pub total_distance: f64,
    /// straight-line distance from launch to landing, in km
    pub ground_distance: f64,
    pub mean_wind_speed: f64,
    pub average_ascent_rate: f64,
    pub max_velocity: f64,
    /// descent speed at the landing altitude
    pub landing_velocity: f64,
    #[serde(default)]
    pub early_burst_risk: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeatherImpact {
    /// km
    pub wind_drift_distance: f64,
    pub ascent_drift: f64,
    pub descent_drift: f64,
    /// mean departure of the soundings from the standard atmosphere, in K
    pub temperature_deviation: Option<f64>,
    /// Pa
    pub pressure_deviation: Option<f64>,
    pub mean_wind_speed: Option<f64>,
    /// bearing of the mean wind vector
    pub prevailing_wind_direction: Option<f64>,
    pub data_points: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl std::fmt::Display for PredictionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualityAssessment {
    pub quality: PredictionQuality,
    pub prediction_confidence: f64,
    pub data_completeness: f64,
    pub weather_uncertainty: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// how the result was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMethod {
    Physics,
    Degraded,
    Cached,
    Simple,
    Minimal,
}

impl std::fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Physics => "physics",
            Self::Degraded => "degraded",
            Self::Cached => "cached",
            Self::Simple => "simple",
            Self::Minimal => "minimal",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PredictionResult {
    pub trajectory: Vec<crate::location::TrajectoryPoint>,
    pub burst_site: SiteEstimate,
    pub landing_site: SiteEstimate,
    pub flight_metrics: FlightMetrics,
    pub weather_impact: WeatherImpact,
    pub quality_assessment: QualityAssessment,
    #[serde(default)]
    pub uncertainty: Option<crate::simulation::monte_carlo::MonteCarloResult>,
    #[serde(default)]
    pub terrain: Option<crate::terrain::TerrainAssessment>,
    pub method: PredictionMethod,
    #[serde(default)]
    pub cache_hit: bool,
}
