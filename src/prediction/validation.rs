lazy_static::lazy_static! {
    static ref FORECAST_HORIZON: chrono::Duration = chrono::Duration::days(7);
    static ref STALE_LAUNCH: chrono::Duration = chrono::Duration::days(1);
}

/// rough bounding box of the high-resolution model domain
const CONUS_LATITUDE: std::ops::RangeInclusive<f64> = 21.0..=53.0;
const CONUS_LONGITUDE: std::ops::RangeInclusive<f64> = -135.0..=-60.0;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    fn new(field: &str, message: String, code: &str) -> Self {
        Self {
            field: field.to_string(),
            message,
            code: code.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

pub trait InputValidator: Send + Sync {
    fn validate(&self, request: &crate::prediction::PredictionRequest) -> ValidationReport;
}

/// Field-level checks of a prediction request.
pub struct RequestValidator {
    clock: std::sync::Arc<dyn crate::prediction::cache::Clock>,
}

impl RequestValidator {
    pub fn new(clock: std::sync::Arc<dyn crate::prediction::cache::Clock>) -> Self {
        Self { clock }
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(crate::prediction::cache::SystemClock))
    }
}

fn positive(errors: &mut Vec<ValidationIssue>, field: &str, value: f64, label: &str, code: &str) {
    if !(value > 0.0) || !value.is_finite() {
        errors.push(ValidationIssue::new(
            field,
            format!("{label} must be positive (got {value})"),
            code,
        ));
    }
}

impl InputValidator for RequestValidator {
    fn validate(&self, request: &crate::prediction::PredictionRequest) -> ValidationReport {
        let mut errors = vec![];
        let mut warnings = vec![];
        let launch = &request.launch;
        let balloon = &request.balloon;

        if !launch.has_valid_coordinates() {
            errors.push(ValidationIssue::new(
                "launch",
                format!(
                    "coordinates ({}, {}) are outside [-90, 90] x [-180, 180]",
                    launch.latitude, launch.longitude
                ),
                "INVALID_COORDINATES",
            ));
        }
        if !(launch.altitude >= 0.0) || !launch.altitude.is_finite() {
            errors.push(ValidationIssue::new(
                "launch.altitude",
                format!("launch altitude must not be negative (got {})", launch.altitude),
                "INVALID_ALTITUDE",
            ));
        }

        positive(
            &mut errors,
            "balloon.payload_mass",
            balloon.payload_mass,
            "payload mass",
            "INVALID_PAYLOAD_MASS",
        );
        if !(balloon.balloon_mass >= 0.0) {
            errors.push(ValidationIssue::new(
                "balloon.balloon_mass",
                format!("balloon mass must not be negative (got {})", balloon.balloon_mass),
                "INVALID_BALLOON_MASS",
            ));
        }
        if let Some(volume) = balloon.gas_volume {
            positive(
                &mut errors,
                "balloon.gas_volume",
                volume,
                "gas volume",
                "INVALID_BALLOON_VOLUME",
            );
        }
        positive(
            &mut errors,
            "balloon.ascent_rate",
            balloon.ascent_rate,
            "ascent rate",
            "INVALID_ASCENT_RATE",
        );
        positive(
            &mut errors,
            "balloon.parachute_area",
            balloon.parachute_area,
            "parachute area",
            "INVALID_PARACHUTE_AREA",
        );
        positive(
            &mut errors,
            "balloon.balloon_drag_coefficient",
            balloon.balloon_drag_coefficient,
            "balloon drag coefficient",
            "INVALID_DRAG_COEFFICIENT",
        );
        positive(
            &mut errors,
            "balloon.parachute_drag_coefficient",
            balloon.parachute_drag_coefficient,
            "parachute drag coefficient",
            "INVALID_DRAG_COEFFICIENT",
        );

        if !(balloon.burst_altitude > launch.altitude) {
            errors.push(ValidationIssue::new(
                "balloon.burst_altitude",
                "Burst altitude must be higher than launch altitude".to_string(),
                "INVALID_BURST_ALTITUDE",
            ));
        }
        let landing_altitude = request.landing_altitude();
        if !(landing_altitude >= 0.0) {
            errors.push(ValidationIssue::new(
                "landing_altitude",
                format!("landing altitude must not be negative (got {landing_altitude})"),
                "INVALID_LANDING_ALTITUDE",
            ));
        } else if !(balloon.burst_altitude > landing_altitude) {
            errors.push(ValidationIssue::new(
                "landing_altitude",
                "Burst altitude must be higher than landing altitude".to_string(),
                "INVALID_LANDING_ALTITUDE",
            ));
        }

        if request.options.include_uncertainty && request.options.monte_carlo_samples <= 0 {
            errors.push(ValidationIssue::new(
                "options.monte_carlo_samples",
                format!(
                    "sample count must be positive (got {})",
                    request.options.monte_carlo_samples
                ),
                "INVALID_SAMPLE_COUNT",
            ));
        }
        if !(request.options.wind_error_rms >= 0.0) {
            errors.push(ValidationIssue::new(
                "options.wind_error_rms",
                format!(
                    "wind error must not be negative (got {})",
                    request.options.wind_error_rms
                ),
                "INVALID_WIND_ERROR",
            ));
        }
        if request.options.weather_window_minutes <= 0 {
            errors.push(ValidationIssue::new(
                "options.weather_window_minutes",
                format!(
                    "weather window must be positive (got {} minutes)",
                    request.options.weather_window_minutes
                ),
                "INVALID_WEATHER_WINDOW",
            ));
        }
        if request.max_flight_time() <= chrono::Duration::zero() {
            errors.push(ValidationIssue::new(
                "overrides.max_flight_time",
                "maximum flight time must be positive".to_string(),
                "INVALID_MAX_FLIGHT_TIME",
            ));
        }
        if let Some(wind) = &request.overrides.wind {
            if wind.has_negative_speed() || wind.is_empty() {
                errors.push(ValidationIssue::new(
                    "overrides.wind",
                    "wind override needs at least one level and no negative speeds".to_string(),
                    "INVALID_WIND_SPEED",
                ));
            }
        }

        // soft limits the pipeline can still work around
        let now = self.clock.now();
        if request.launch_time - now > *FORECAST_HORIZON {
            errors.push(ValidationIssue::new(
                "launch_time",
                format!(
                    "launch is {} away, beyond the {}-day forecast horizon",
                    crate::utilities::duration_string(request.launch_time - now),
                    FORECAST_HORIZON.num_days()
                ),
                "LAUNCH_TIME_TOO_FAR",
            ));
        }
        if request.options.resolution == crate::weather::WeatherResolution::Hrrr
            && !(CONUS_LATITUDE.contains(&launch.latitude)
                && CONUS_LONGITUDE.contains(&launch.longitude))
        {
            errors.push(ValidationIssue::new(
                "options.resolution",
                "high-resolution weather only covers the contiguous United States".to_string(),
                "HRRR_OUTSIDE_CONUS",
            ));
        }

        if now - request.launch_time > *STALE_LAUNCH {
            warnings.push(ValidationIssue::new(
                "launch_time",
                "launch time is in the past; using archived weather".to_string(),
                "LAUNCH_TIME_IN_PAST",
            ));
        }
        if balloon.burst_altitude > 40000.0 {
            warnings.push(ValidationIssue::new(
                "balloon.burst_altitude",
                format!(
                    "burst altitude of {} m is unusually high",
                    balloon.burst_altitude
                ),
                "HIGH_BURST_ALTITUDE",
            ));
        }
        if balloon.ascent_rate.is_finite() && !(2.0..=10.0).contains(&balloon.ascent_rate) {
            warnings.push(ValidationIssue::new(
                "balloon.ascent_rate",
                format!(
                    "ascent rate of {} m/s is outside the typical 2-10 m/s",
                    balloon.ascent_rate
                ),
                "UNUSUAL_ASCENT_RATE",
            ));
        }

        ValidationReport::from_issues(errors, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::cache::ManualClock;

    fn validator() -> RequestValidator {
        RequestValidator::new(std::sync::Arc::new(ManualClock::new(
            crate::weather::tests::launch_time() - chrono::Duration::hours(6),
        )))
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.code.as_str()).collect()
    }

    #[test]
    fn test_valid_request() {
        let report = validator().validate(&crate::prediction::tests::request());
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_invalid_coordinates() {
        let mut request = crate::prediction::tests::request();
        request.launch.latitude = 95.0;
        let report = validator().validate(&request);

        assert!(!report.is_valid);
        assert_eq!(codes(&report.errors), vec!["INVALID_COORDINATES"]);
        assert_eq!(report.errors[0].field, "launch");
    }

    #[test]
    fn test_physical_parameters() {
        let mut request = crate::prediction::tests::request();
        request.balloon.payload_mass = 0.0;
        request.balloon.parachute_area = -1.0;
        request.balloon.burst_altitude = -5.0;
        let report = validator().validate(&request);

        assert_eq!(
            codes(&report.errors),
            vec![
                "INVALID_PAYLOAD_MASS",
                "INVALID_PARACHUTE_AREA",
                "INVALID_BURST_ALTITUDE",
                "INVALID_LANDING_ALTITUDE",
            ]
        );
    }

    #[test]
    fn test_soft_limits() {
        let mut request = crate::prediction::tests::request();
        request.launch_time = request.launch_time + chrono::Duration::days(10);
        request.options.resolution = crate::weather::WeatherResolution::Hrrr;
        request.launch.longitude = 10.0;
        let report = validator().validate(&request);

        assert_eq!(
            codes(&report.errors),
            vec!["LAUNCH_TIME_TOO_FAR", "HRRR_OUTSIDE_CONUS"]
        );
    }

    #[test]
    fn test_warnings() {
        let mut request = crate::prediction::tests::request();
        request.launch_time = request.launch_time - chrono::Duration::days(3);
        request.balloon.ascent_rate = 12.0;
        let report = validator().validate(&request);

        assert!(report.is_valid);
        assert_eq!(
            codes(&report.warnings),
            vec!["LAUNCH_TIME_IN_PAST", "UNUSUAL_ASCENT_RATE"]
        );
    }
}
