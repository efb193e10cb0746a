custom_error::custom_error! {pub ExportError
    Io { source: std::io::Error } = "{source}",
    Serialization { source: serde_json::Error } = "could not serialize prediction; {source}",
}

impl ExportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "EXPORT_IO_ERROR",
            Self::Serialization { .. } => "EXPORT_SERIALIZATION_ERROR",
        }
    }
}

fn position(point: &crate::location::GeoPoint) -> geojson::Position {
    vec![point.longitude, point.latitude, point.altitude]
}

fn site_feature(
    name: &str,
    site: &crate::prediction::SiteEstimate,
) -> geojson::Feature {
    let mut properties = geojson::JsonObject::new();
    properties.insert("name".to_string(), serde_json::json!(name));
    properties.insert(
        "time".to_string(),
        serde_json::json!(site.time.format(&crate::DATETIME_FORMAT).to_string()),
    );
    properties.insert("uncertainty".to_string(), serde_json::json!(site.uncertainty));

    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::Point(position(
            &site.position,
        )))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Trajectory line plus burst and landing points.
pub fn to_geojson(result: &crate::prediction::PredictionResult) -> geojson::FeatureCollection {
    let mut properties = geojson::JsonObject::new();
    properties.insert("name".to_string(), serde_json::json!("trajectory"));
    properties.insert("method".to_string(), serde_json::json!(result.method));
    properties.insert(
        "quality".to_string(),
        serde_json::json!(result.quality_assessment.quality),
    );
    properties.insert(
        "confidence".to_string(),
        serde_json::json!(result.quality_assessment.prediction_confidence),
    );
    if let (Some(first), Some(last)) = (result.trajectory.first(), result.trajectory.last()) {
        properties.insert(
            "start_time".to_string(),
            serde_json::json!(first.time.format(&crate::DATETIME_FORMAT).to_string()),
        );
        properties.insert(
            "end_time".to_string(),
            serde_json::json!(last.time.format(&crate::DATETIME_FORMAT).to_string()),
        );
    }

    let trajectory = geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::LineString(
            result
                .trajectory
                .iter()
                .map(|point| position(&point.position))
                .collect(),
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };

    geojson::FeatureCollection {
        bbox: None,
        features: vec![
            trajectory,
            site_feature("burst", &result.burst_site),
            site_feature("landing", &result.landing_site),
        ],
        foreign_members: None,
    }
}

fn create(path: &std::path::Path) -> Result<std::io::BufWriter<std::fs::File>, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(std::io::BufWriter::new(std::fs::File::create(path)?))
}

pub fn write_json(
    result: &crate::prediction::PredictionResult,
    path: &std::path::Path,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(create(path)?, result)?;
    log::info!("wrote prediction to {:}", path.display());
    Ok(())
}

pub fn write_geojson(
    result: &crate::prediction::PredictionResult,
    path: &std::path::Path,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(create(path)?, &to_geojson(result))?;
    log::info!("wrote prediction track to {:}", path.display());
    Ok(())
}
