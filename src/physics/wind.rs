// Wind directions are bearings in degrees clockwise from north, pointing the way the air moves.

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WindSample {
    pub speed: f64,
    pub direction: f64,
}

impl WindSample {
    pub fn new(speed: f64, direction: f64) -> Self {
        Self { speed, direction }
    }

    pub fn calm() -> Self {
        Self::new(0.0, 0.0)
    }

    /// eastward and northward components, in m/s
    pub fn components(&self) -> (f64, f64) {
        let bearing = self.direction.to_radians();
        (self.speed * bearing.sin(), self.speed * bearing.cos())
    }

    pub fn from_components(east: f64, north: f64) -> Self {
        let speed = east.hypot(north);
        if speed == 0.0 {
            return Self::calm();
        }
        Self::new(speed, normalize_bearing(east.atan2(north).to_degrees()))
    }

    /// add a vector offset, as a Monte Carlo perturbation does
    pub fn offset(&self, east: f64, north: f64) -> Self {
        let (base_east, base_north) = self.components();
        Self::from_components(base_east + east, base_north + north)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WindLevel {
    pub altitude: f64,
    pub speed: f64,
    pub direction: f64,
}

/// Wind acting on a phase: one constant vector, or a vertical profile sorted by altitude.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindField {
    Constant(WindSample),
    Profile(Vec<WindLevel>),
}

impl WindField {
    pub fn constant(speed: f64, direction: f64) -> Self {
        Self::Constant(WindSample::new(speed, direction))
    }

    /// sorts levels by altitude
    pub fn profile(mut levels: Vec<WindLevel>) -> Self {
        levels.sort_by(|a, b| a.altitude.total_cmp(&b.altitude));
        Self::Profile(levels)
    }

    pub fn at(&self, altitude: f64) -> Result<WindSample, super::PhysicsError> {
        match self {
            Self::Constant(sample) => Ok(*sample),
            Self::Profile(levels) => interpolate_wind(altitude, levels),
        }
    }

    pub fn offset(&self, east: f64, north: f64) -> Self {
        match self {
            Self::Constant(sample) => Self::Constant(sample.offset(east, north)),
            Self::Profile(levels) => Self::Profile(
                levels
                    .iter()
                    .map(|level| {
                        let sample =
                            WindSample::new(level.speed, level.direction).offset(east, north);
                        WindLevel {
                            altitude: level.altitude,
                            speed: sample.speed,
                            direction: sample.direction,
                        }
                    })
                    .collect(),
            ),
        }
    }

    pub fn has_negative_speed(&self) -> bool {
        match self {
            Self::Constant(sample) => sample.speed < 0.0,
            Self::Profile(levels) => levels.iter().any(|level| level.speed < 0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Profile(levels) if levels.is_empty())
    }
}

impl Default for WindField {
    fn default() -> Self {
        Self::Constant(WindSample::calm())
    }
}

pub fn normalize_bearing(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

/// wrap longitude into (-180, 180]
pub fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Carry a position along a great circle with the wind for `duration` seconds.
///
/// Altitude is left unchanged; vertical motion belongs to the phase simulators.
pub fn advance(
    position: &crate::location::GeoPoint,
    wind_speed: f64,
    wind_direction: f64,
    duration: f64,
) -> crate::location::GeoPoint {
    if wind_speed <= 0.0 || duration <= 0.0 {
        return *position;
    }

    let angular_distance = wind_speed * duration / super::EARTH_RADIUS;
    let bearing = wind_direction.to_radians();
    let latitude = position.latitude.to_radians();
    let longitude = position.longitude.to_radians();

    let next_latitude = (latitude.sin() * angular_distance.cos()
        + latitude.cos() * angular_distance.sin() * bearing.cos())
    .asin();
    let next_longitude = longitude
        + (bearing.sin() * angular_distance.sin() * latitude.cos())
            .atan2(angular_distance.cos() - latitude.sin() * next_latitude.sin());

    crate::location::GeoPoint {
        latitude: next_latitude.to_degrees(),
        longitude: normalize_longitude(next_longitude.to_degrees()),
        altitude: position.altitude,
    }
}

/// horizontal distance covered by wind drift, in kilometers
pub fn drift_distance_km(wind_speed: f64, duration: f64) -> f64 {
    wind_speed.max(0.0) * duration.max(0.0) / 1000.0
}

/// Interpolate wind between the two altitude samples bracketing `altitude`.
///
/// Direction takes the shortest way around the compass. Outside the sampled range the nearest
/// level is returned unchanged.
pub fn interpolate_wind(altitude: f64, levels: &[WindLevel]) -> Result<WindSample, super::PhysicsError> {
    let (first, last) = match (levels.first(), levels.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(super::PhysicsError::NoWindData),
    };

    if altitude <= first.altitude {
        return Ok(WindSample::new(first.speed, first.direction));
    }
    if altitude >= last.altitude {
        return Ok(WindSample::new(last.speed, last.direction));
    }

    let upper_index = levels
        .iter()
        .position(|level| level.altitude >= altitude)
        .unwrap_or(levels.len() - 1);
    let lower = &levels[upper_index.saturating_sub(1)];
    let upper = &levels[upper_index];

    let span = upper.altitude - lower.altitude;
    if span <= 0.0 {
        return Ok(WindSample::new(lower.speed, lower.direction));
    }
    let fraction = (altitude - lower.altitude) / span;

    let speed = lower.speed + fraction * (upper.speed - lower.speed);
    let difference = (upper.direction - lower.direction + 540.0).rem_euclid(360.0) - 180.0;
    let direction = normalize_bearing(lower.direction + fraction * difference);

    Ok(WindSample::new(speed, direction))
}
