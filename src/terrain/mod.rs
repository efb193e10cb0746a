/// steepest slope, in degrees, considered safe to recover a payload from
pub const SAFE_SLOPE: f64 = 15.0;

/// radius searched around a predicted landing point, in meters
pub const SEARCH_RADIUS: f64 = 5000.0;

/// IDW neighbours closer than this are taken as an exact match, in meters
const COINCIDENT_DISTANCE: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TerrainSample {
    pub lat: f64,
    pub lng: f64,
    pub elevation: f64,
    /// degrees from horizontal
    #[serde(default)]
    pub slope: Option<f64>,
}

impl TerrainSample {
    pub fn location(&self) -> crate::location::GeoPoint {
        crate::location::GeoPoint::new(self.lat, self.lng, self.elevation)
    }
}

custom_error::custom_error! {pub TerrainError
    Unavailable { message: String } = "terrain service unavailable; {message}",
    NoSamples = "no terrain samples near the landing point",
}

impl TerrainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "TERRAIN_UNAVAILABLE",
            Self::NoSamples => "NO_TERRAIN_DATA",
        }
    }
}

pub trait TerrainService: Send + Sync {
    fn samples_near(
        &self,
        point: &crate::location::GeoPoint,
        radius: f64,
    ) -> Result<Vec<TerrainSample>, TerrainError>;
}

/// In-memory elevation grid.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct StaticTerrain {
    pub samples: Vec<TerrainSample>,
}

impl TerrainService for StaticTerrain {
    fn samples_near(
        &self,
        point: &crate::location::GeoPoint,
        radius: f64,
    ) -> Result<Vec<TerrainSample>, TerrainError> {
        Ok(self
            .samples
            .iter()
            .filter(|sample| point.ground_distance(&sample.location()) <= radius)
            .copied()
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainDifficulty {
    Easy,
    Moderate,
    Difficult,
}

impl TerrainDifficulty {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            Self::Easy
        } else if score < 0.6 {
            Self::Moderate
        } else {
            Self::Difficult
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TerrainAssessment {
    pub landing_elevation: f64,
    pub difficulty_score: f64,
    pub difficulty: TerrainDifficulty,
    pub mean_slope: Option<f64>,
    /// elevation range of the surrounding samples, in meters
    pub relief: f64,
    /// nearest sample gentle enough to recover from
    pub safe_landing: Option<crate::location::GeoPoint>,
    pub samples: usize,
}

/// Inverse-distance-weighted (power 2) elevation at `point`.
pub fn interpolate_elevation(
    point: &crate::location::GeoPoint,
    samples: &[TerrainSample],
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for sample in samples {
        let distance = point.ground_distance(&sample.location());
        if distance < COINCIDENT_DISTANCE {
            return Some(sample.elevation);
        }
        let weight = distance.powi(-2);
        weighted += weight * sample.elevation;
        weights += weight;
    }

    if weights > 0.0 {
        Some(weighted / weights)
    } else {
        None
    }
}

/// Combined slope and relief score in `[0, 1]`.
pub fn difficulty_score(samples: &[TerrainSample]) -> f64 {
    let slopes: Vec<f64> = samples.iter().filter_map(|sample| sample.slope).collect();
    let slope_score = if slopes.is_empty() {
        0.0
    } else {
        (slopes.iter().sum::<f64>() / slopes.len() as f64 / 45.0).clamp(0.0, 1.0)
    };
    let relief_score = (relief(samples) / 500.0).clamp(0.0, 1.0);

    0.6 * slope_score + 0.4 * relief_score
}

fn relief(samples: &[TerrainSample]) -> f64 {
    let lowest = samples
        .iter()
        .map(|sample| sample.elevation)
        .fold(f64::INFINITY, f64::min);
    let highest = samples
        .iter()
        .map(|sample| sample.elevation)
        .fold(f64::NEG_INFINITY, f64::max);
    if highest >= lowest {
        highest - lowest
    } else {
        0.0
    }
}

pub fn nearest_safe_sample(
    point: &crate::location::GeoPoint,
    samples: &[TerrainSample],
) -> Option<TerrainSample> {
    samples
        .iter()
        .filter(|sample| matches!(sample.slope, Some(slope) if slope <= SAFE_SLOPE))
        .min_by(|a, b| {
            point
                .ground_distance(&a.location())
                .total_cmp(&point.ground_distance(&b.location()))
        })
        .copied()
}

pub fn assess_landing(
    point: &crate::location::GeoPoint,
    samples: &[TerrainSample],
) -> Result<TerrainAssessment, TerrainError> {
    let landing_elevation = match interpolate_elevation(point, samples) {
        Some(elevation) => elevation,
        None => return Err(TerrainError::NoSamples),
    };
    let slopes: Vec<f64> = samples.iter().filter_map(|sample| sample.slope).collect();
    let score = difficulty_score(samples);

    Ok(TerrainAssessment {
        landing_elevation,
        difficulty_score: score,
        difficulty: TerrainDifficulty::from_score(score),
        mean_slope: if slopes.is_empty() {
            None
        } else {
            Some(slopes.iter().sum::<f64>() / slopes.len() as f64)
        },
        relief: relief(samples),
        safe_landing: nearest_safe_sample(point, samples).map(|sample| sample.location()),
        samples: samples.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeoPoint;
    use crate::utilities::approx_equal;

    fn sample(lat: f64, lng: f64, elevation: f64, slope: Option<f64>) -> TerrainSample {
        TerrainSample {
            lat,
            lng,
            elevation,
            slope,
        }
    }

    #[test]
    fn test_interpolate_elevation() {
        let samples = vec![
            sample(40.00, -105.00, 1600.0, Some(2.0)),
            sample(40.00, -104.98, 1700.0, Some(4.0)),
        ];

        // midway between two samples
        let midpoint = GeoPoint::new(40.0, -104.99, 0.0);
        assert!(approx_equal(
            interpolate_elevation(&midpoint, &samples).unwrap(),
            1650.0,
            3
        ));

        let on_sample = GeoPoint::new(40.0, -105.0, 0.0);
        assert_eq!(interpolate_elevation(&on_sample, &samples), Some(1600.0));
        assert_eq!(interpolate_elevation(&on_sample, &[]), None);
    }

    #[test]
    fn test_difficulty() {
        let plains = vec![
            sample(40.00, -104.00, 1500.0, Some(1.0)),
            sample(40.01, -104.00, 1510.0, Some(2.0)),
        ];
        let mountains = vec![
            sample(39.60, -105.80, 3200.0, Some(35.0)),
            sample(39.61, -105.80, 3800.0, Some(40.0)),
        ];

        assert_eq!(
            TerrainDifficulty::from_score(difficulty_score(&plains)),
            TerrainDifficulty::Easy
        );
        assert_eq!(
            TerrainDifficulty::from_score(difficulty_score(&mountains)),
            TerrainDifficulty::Difficult
        );
        assert_eq!(TerrainDifficulty::from_score(0.45), TerrainDifficulty::Moderate);
    }

    #[test]
    fn test_assess_landing() {
        let landing = GeoPoint::new(39.60, -105.80, 0.0);
        let samples = vec![
            sample(39.60, -105.80, 3200.0, Some(35.0)),
            sample(39.62, -105.80, 2900.0, Some(10.0)),
            sample(39.70, -105.80, 2700.0, Some(5.0)),
            sample(39.61, -105.81, 3000.0, None),
        ];

        let assessment = assess_landing(&landing, &samples).unwrap();
        assert_eq!(assessment.landing_elevation, 3200.0);
        assert_eq!(assessment.relief, 500.0);
        assert_eq!(assessment.samples, 4);
        assert_eq!(
            assessment.safe_landing,
            Some(GeoPoint::new(39.62, -105.80, 2900.0))
        );

        assert!(matches!(
            assess_landing(&landing, &[]),
            Err(TerrainError::NoSamples)
        ));
    }

    #[test]
    fn test_static_terrain_radius() {
        let terrain = StaticTerrain {
            samples: vec![
                sample(40.0, -105.0, 1600.0, None),
                sample(41.0, -105.0, 1600.0, None),
            ],
        };
        let near = terrain
            .samples_near(&GeoPoint::new(40.01, -105.0, 0.0), SEARCH_RADIUS)
            .unwrap();
        assert_eq!(near.len(), 1);
    }
}
