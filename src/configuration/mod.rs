pub mod prediction;

lazy_static::lazy_static! {
    static ref DEFAULT_BURST_ALTITUDE_ERROR: f64 = 500.0;
    static ref DEFAULT_WORKERS: usize = 4;
}

custom_error::custom_error! {pub ConfigurationError
    Io { source: std::io::Error } = "could not read configuration; {source}",
    Parsing { source: serde_yaml::Error } = "could not parse configuration; {source}",
    InvalidStart { message: String } = "invalid start location; {message}",
}

impl ConfigurationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIGURATION_IO_ERROR",
            Self::Parsing { .. } => "CONFIGURATION_PARSING_ERROR",
            Self::InvalidStart { .. } => "INVALID_START_LOCATION",
        }
    }
}

fn default_name() -> String {
    String::from("unnamed_flight")
}

#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
pub struct RunConfiguration {
    #[serde(default = "default_name")]
    pub name: String,
    pub prediction: crate::configuration::prediction::PredictionConfiguration,
    #[serde(default)]
    pub weather: WeatherConfiguration,
    #[serde(default)]
    pub orchestrator: OrchestratorConfiguration,
    pub output: Option<PathConfiguration>,
    pub geojson: Option<PathConfiguration>,
    pub log: Option<PathConfiguration>,
}

impl RunConfiguration {
    /// Read a YAML configuration; relative paths inside it are taken from its directory.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigurationError> {
        let file = std::fs::File::open(path)?;
        let mut configuration: Self = serde_yaml::from_reader(file)?;

        if let Some(directory) = path.parent() {
            if let Some(profile) = &configuration.weather.profile {
                if profile.is_relative() {
                    configuration.weather.profile = Some(directory.join(profile));
                }
            }
        }
        Ok(configuration)
    }

    pub fn prediction_request(
        &self,
    ) -> Result<crate::prediction::PredictionRequest, ConfigurationError> {
        self.prediction.to_request(&self.weather)
    }

    pub fn orchestrator_settings(&self) -> crate::prediction::orchestrator::OrchestratorSettings {
        crate::prediction::orchestrator::OrchestratorSettings {
            weather_timeout: std::time::Duration::from_secs(
                self.weather.timeout.num_seconds().max(0) as u64,
            ),
            seed: self.orchestrator.seed,
            workers: self.orchestrator.workers,
            burst_altitude_error: self.orchestrator.burst_altitude_error,
            results: self.orchestrator.uncertainty.clone(),
        }
    }

    /// sounding file when one is configured, otherwise a provider with no data
    pub fn weather_provider(&self) -> std::sync::Arc<dyn crate::weather::WeatherProvider> {
        match &self.weather.profile {
            Some(profile) => std::sync::Arc::new(crate::weather::file::WeatherFile::new(
                profile.to_owned(),
            )),
            None => std::sync::Arc::new(crate::weather::StaticWeatherProvider::default()),
        }
    }

    pub fn cache(&self) -> crate::prediction::cache::PredictionCache {
        crate::prediction::cache::PredictionCache::new(
            std::sync::Arc::new(crate::prediction::cache::SystemClock),
            self.orchestrator.cache_ttl,
        )
    }
}

#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct PathConfiguration {
    pub filename: std::path::PathBuf,
}

fn default_window_minutes() -> i64 {
    crate::prediction::PredictionOptions::default().weather_window_minutes
}

fn default_weather_timeout() -> chrono::Duration {
    *crate::DEFAULT_WEATHER_TIMEOUT
}

#[serde_with::serde_as]
#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct WeatherConfiguration {
    /// YAML or JSON list of soundings
    pub profile: Option<std::path::PathBuf>,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default)]
    pub resolution: crate::weather::WeatherResolution,
    #[serde(default = "default_weather_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<i64>")]
    pub timeout: chrono::Duration,
}

impl Default for WeatherConfiguration {
    fn default() -> Self {
        Self {
            profile: None,
            window_minutes: default_window_minutes(),
            resolution: crate::weather::WeatherResolution::default(),
            timeout: default_weather_timeout(),
        }
    }
}

fn default_cache_ttl() -> chrono::Duration {
    *crate::DEFAULT_CACHE_TTL
}

fn default_workers() -> usize {
    *DEFAULT_WORKERS
}

fn default_burst_altitude_error() -> f64 {
    *DEFAULT_BURST_ALTITUDE_ERROR
}

#[serde_with::serde_as]
#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct OrchestratorConfiguration {
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "serde_with::DurationSeconds<i64>")]
    pub cache_ttl: chrono::Duration,
    pub seed: Option<u64>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// m
    #[serde(default = "default_burst_altitude_error")]
    pub burst_altitude_error: f64,
    #[serde(default)]
    pub uncertainty: crate::prediction::results::ResultsSettings,
}

impl Default for OrchestratorConfiguration {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            seed: None,
            workers: default_workers(),
            burst_altitude_error: default_burst_altitude_error(),
            uncertainty: crate::prediction::results::ResultsSettings::default(),
        }
    }
}
