fn default_enabled() -> bool {
    true
}

fn default_samples() -> i64 {
    crate::simulation::monte_carlo::DEFAULT_SAMPLES
}

fn default_wind_error_rms() -> f64 {
    crate::prediction::PredictionOptions::default().wind_error_rms
}

#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct UncertaintyConfiguration {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_samples")]
    pub samples: i64,
    /// m/s
    #[serde(default = "default_wind_error_rms")]
    pub wind_error_rms: f64,
}

impl Default for UncertaintyConfiguration {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            samples: default_samples(),
            wind_error_rms: default_wind_error_rms(),
        }
    }
}

#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct PredictionConfiguration {
    pub start: StartLocation,
    pub balloon: crate::prediction::BalloonSpecs,
    pub landing_altitude: Option<f64>,
    #[serde(default)]
    pub uncertainty: UncertaintyConfiguration,
    #[serde(default)]
    pub overrides: crate::prediction::EnvironmentalOverrides,
}

impl PredictionConfiguration {
    pub fn to_request(
        &self,
        weather: &crate::configuration::WeatherConfiguration,
    ) -> Result<crate::prediction::PredictionRequest, crate::configuration::ConfigurationError> {
        Ok(crate::prediction::PredictionRequest {
            launch: self.start.to_geo_point()?,
            launch_time: self.start.time,
            balloon: self.balloon.clone(),
            landing_altitude: self.landing_altitude,
            overrides: self.overrides.clone(),
            options: crate::prediction::PredictionOptions {
                include_uncertainty: self.uncertainty.enabled,
                monte_carlo_samples: self.uncertainty.samples,
                wind_error_rms: self.uncertainty.wind_error_rms,
                weather_window_minutes: weather.window_minutes,
                resolution: weather.resolution,
            },
        })
    }
}

#[derive(serde::Deserialize, PartialEq, Debug, Clone)]
pub struct StartLocation {
    /// `[longitude, latitude]` or `[longitude, latitude, altitude]`
    pub location: Vec<f64>,
    #[serde(with = "crate::utilities::utc_datetime_string")]
    pub time: chrono::DateTime<chrono::Utc>,
}

impl StartLocation {
    pub fn to_geo_point(
        &self,
    ) -> Result<crate::location::GeoPoint, crate::configuration::ConfigurationError> {
        match self.location.as_slice() {
            [longitude, latitude] => Ok(crate::location::GeoPoint::new(*latitude, *longitude, 0.0)),
            [longitude, latitude, altitude] => Ok(crate::location::GeoPoint::new(
                *latitude, *longitude, *altitude,
            )),
            values => Err(crate::configuration::ConfigurationError::InvalidStart {
                message: format!(
                    "expected [longitude, latitude] or [longitude, latitude, altitude], got {} values",
                    values.len()
                ),
            }),
        }
    }
}
