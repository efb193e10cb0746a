pub mod file;

/// mean uncertainty above which weather data is flagged as poor
pub const POOR_QUALITY_UNCERTAINTY: f64 = 0.5;

/// distinct altitude levels needed for a complete profile
pub const COMPLETE_PROFILE_LEVELS: usize = 10;

/// One sounding level from a weather provider.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeatherData {
    #[serde(with = "crate::utilities::utc_datetime_string")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub altitude: f64,
    pub wind_speed: f64,
    /// bearing the air moves toward, in degrees
    pub wind_direction: f64,
    /// degrees Celsius
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub uncertainty: f64,
}

impl WeatherData {
    pub fn is_finite(&self) -> bool {
        [
            self.altitude,
            self.wind_speed,
            self.wind_direction,
            self.temperature,
            self.pressure,
            self.uncertainty,
        ]
        .iter()
        .all(|value| value.is_finite())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherResolution {
    /// 3 km model covering the contiguous United States
    Hrrr,
    /// global 0.25 degree model
    #[default]
    Gfs,
}

impl std::fmt::Display for WeatherResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hrrr => write!(f, "hrrr"),
            Self::Gfs => write!(f, "gfs"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WeatherQuery {
    pub location: crate::location::GeoPoint,
    pub launch_time: chrono::DateTime<chrono::Utc>,
    pub window_minutes: i64,
    pub resolution: WeatherResolution,
}

impl WeatherQuery {
    pub fn contains(&self, timestamp: &chrono::DateTime<chrono::Utc>) -> bool {
        (*timestamp - self.launch_time).num_minutes().abs() <= self.window_minutes
    }
}

custom_error::custom_error! {pub WeatherError
    ServiceUnavailable { message: String } = "weather service unavailable; {message}",
    ApiError { message: String } = "weather service error; {message}",
    Timeout { seconds: f64 } = "weather retrieval timed out after {seconds} s",
    PoorQuality { uncertainty: f64 } = "weather data is unreliable (mean uncertainty {uncertainty})",
    NoData = "no weather data available for the requested location and time",
    Parsing { message: String } = "could not parse weather data; {message}",
}

impl WeatherError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::ApiError { .. } => "API_ERROR",
            Self::Timeout { .. } => "WEATHER_TIMEOUT",
            Self::PoorQuality { .. } => "POOR_QUALITY",
            Self::NoData => "NO_WEATHER_DATA",
            Self::Parsing { .. } => "WEATHER_PARSING_ERROR",
        }
    }
}

/// Source of weather soundings around a launch.
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    fn select_weather_data(&self, query: &WeatherQuery) -> Result<Vec<WeatherData>, WeatherError>;
}

/// Serves a fixed set of soundings, filtered to the query window.
#[derive(Clone, Debug, Default)]
pub struct StaticWeatherProvider {
    pub data: Vec<WeatherData>,
}

impl StaticWeatherProvider {
    pub fn new(data: Vec<WeatherData>) -> Self {
        Self { data }
    }
}

impl WeatherProvider for StaticWeatherProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn select_weather_data(&self, query: &WeatherQuery) -> Result<Vec<WeatherData>, WeatherError> {
        let data = within_window(&self.data, query);
        if data.is_empty() {
            return Err(WeatherError::NoData);
        }
        Ok(data)
    }
}

pub fn within_window(data: &[WeatherData], query: &WeatherQuery) -> Vec<WeatherData> {
    data.iter()
        .filter(|entry| query.contains(&entry.timestamp))
        .cloned()
        .collect()
}

pub fn mean_uncertainty(data: &[WeatherData]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().map(|entry| entry.uncertainty.clamp(0.0, 1.0)).sum::<f64>() / data.len() as f64)
}

/// Reject empty data, and flag data whose mean uncertainty is above `POOR_QUALITY_UNCERTAINTY`.
pub fn validate_weather(data: &[WeatherData]) -> Result<(), WeatherError> {
    match mean_uncertainty(data) {
        None => Err(WeatherError::NoData),
        Some(uncertainty) if uncertainty > POOR_QUALITY_UNCERTAINTY => {
            Err(WeatherError::PoorQuality { uncertainty })
        }
        Some(_) => Ok(()),
    }
}

/// fraction of a complete profile covered by finite, distinct altitude levels
pub fn data_completeness(data: &[WeatherData]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let finite: Vec<&WeatherData> = data.iter().filter(|entry| entry.is_finite()).collect();
    let mut altitudes: Vec<i64> = finite
        .iter()
        .map(|entry| entry.altitude.round() as i64)
        .collect();
    altitudes.sort_unstable();
    altitudes.dedup();

    let coverage = (altitudes.len() as f64 / COMPLETE_PROFILE_LEVELS as f64).min(1.0);
    coverage * finite.len() as f64 / data.len() as f64
}

/// Wind profile from the soundings, one level per altitude.
///
/// Soundings sharing an altitude are averaged as vectors.
pub fn wind_profile(
    data: &[WeatherData],
) -> Result<crate::physics::wind::WindField, crate::physics::PhysicsError> {
    let mut sums: std::collections::BTreeMap<i64, (f64, f64, f64, usize)> =
        std::collections::BTreeMap::new();
    for entry in data.iter().filter(|entry| entry.is_finite()) {
        let (east, north) =
            crate::physics::wind::WindSample::new(entry.wind_speed.max(0.0), entry.wind_direction)
                .components();
        let sum = sums
            .entry(entry.altitude.round() as i64)
            .or_insert((0.0, 0.0, 0.0, 0));
        sum.0 += entry.altitude;
        sum.1 += east;
        sum.2 += north;
        sum.3 += 1;
    }
    if sums.is_empty() {
        return Err(crate::physics::PhysicsError::NoWindData);
    }

    let levels = sums
        .values()
        .map(|(altitude, east, north, count)| {
            let count = *count as f64;
            let sample =
                crate::physics::wind::WindSample::from_components(east / count, north / count);
            crate::physics::wind::WindLevel {
                altitude: altitude / count,
                speed: sample.speed,
                direction: sample.direction,
            }
        })
        .collect();
    Ok(crate::physics::wind::WindField::profile(levels))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utilities::approx_equal;

    pub fn launch_time() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_717_243_200, 0).unwrap()
    }

    /// soundings every 2 km up to 30 km with a westerly jet around 12 km
    pub fn sounding(uncertainty: f64) -> Vec<WeatherData> {
        (0..=15)
            .map(|level| {
                let altitude = level as f64 * 2000.0;
                let jet = (-((altitude - 12000.0) / 5000.0).powi(2)).exp();
                WeatherData {
                    timestamp: launch_time(),
                    altitude,
                    wind_speed: 4.0 + 26.0 * jet,
                    wind_direction: 80.0 + level as f64,
                    temperature: crate::physics::atmosphere::temperature(altitude).unwrap()
                        - 273.15,
                    pressure: crate::physics::atmosphere::pressure(altitude).unwrap(),
                    humidity: 40.0,
                    uncertainty,
                }
            })
            .collect()
    }

    fn query(window_minutes: i64) -> WeatherQuery {
        WeatherQuery {
            location: crate::location::GeoPoint::new(39.0, -77.0, 0.0),
            launch_time: launch_time(),
            window_minutes,
            resolution: WeatherResolution::Gfs,
        }
    }

    #[test]
    fn test_validate_weather() {
        assert!(validate_weather(&sounding(0.1)).is_ok());
        assert_eq!(validate_weather(&[]).unwrap_err().code(), "NO_WEATHER_DATA");
        assert_eq!(
            validate_weather(&sounding(0.6)).unwrap_err().code(),
            "POOR_QUALITY"
        );
    }

    #[test]
    fn test_completeness() {
        assert_eq!(data_completeness(&sounding(0.1)), 1.0);
        assert!(approx_equal(data_completeness(&sounding(0.1)[..5]), 0.5, 9));
        assert_eq!(data_completeness(&[]), 0.0);

        let mut broken = sounding(0.1);
        broken[0].wind_speed = f64::NAN;
        assert!(data_completeness(&broken) < 1.0);
    }

    #[test]
    fn test_wind_profile() {
        let profile = wind_profile(&sounding(0.1)).unwrap();
        let jet = profile.at(12000.0).unwrap();
        let surface = profile.at(0.0).unwrap();

        assert!(approx_equal(jet.speed, 30.0, 6));
        assert!(surface.speed > 4.0 && surface.speed < 4.1);
        assert!(approx_equal(surface.direction, 80.0, 6));
        assert!(wind_profile(&[]).is_err());
    }

    #[test]
    fn test_static_provider_window() {
        let mut data = sounding(0.1);
        data[0].timestamp = launch_time() + chrono::Duration::hours(6);
        let provider = StaticWeatherProvider::new(data);

        assert_eq!(provider.select_weather_data(&query(60)).unwrap().len(), 15);
        assert_eq!(provider.select_weather_data(&query(400)).unwrap().len(), 16);
        assert_eq!(
            StaticWeatherProvider::default()
                .select_weather_data(&query(60))
                .unwrap_err()
                .code(),
            "NO_WEATHER_DATA"
        );
    }
}
