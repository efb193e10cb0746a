pub fn approx_equal(a: f64, b: f64, decimal_precision: u8) -> bool {
    let p = 10f64.powi(-(decimal_precision as i32));
    (a - b).abs() < p
}

/// Parse `%Y-%m-%d %H:%M:%S` (as UTC), RFC 3339, or a bare `%Y-%m-%d` date.
pub fn parse_utc_datetime(value: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(value, &crate::DATETIME_FORMAT) {
        return Ok(datetime.and_utc());
    }
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&chrono::Utc));
    }
    match chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => match date.and_hms_opt(0, 0, 0) {
            Some(datetime) => Ok(datetime.and_utc()),
            None => Err(format!("invalid date {value}")),
        },
        Err(error) => Err(format!("could not parse datetime \"{value}\"; {error}")),
    }
}

pub mod utc_datetime_string {
    use serde::Deserialize;

    pub fn serialize<S>(
        date: &chrono::DateTime<chrono::Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let date = format!("{:}", date.format(&crate::DATETIME_FORMAT));
        serializer.serialize_str(&date)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<chrono::DateTime<chrono::Utc>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: String = String::deserialize(deserializer)?;
        super::parse_utc_datetime(&value).map_err(serde::de::Error::custom)
    }
}

pub fn duration_string(duration: chrono::Duration) -> String {
    let mut parts = vec![];

    let days = duration.num_days().abs();
    let hours = duration.num_hours().abs() % 24;
    let minutes = duration.num_minutes().abs() % 60;
    let seconds = duration.num_seconds().abs() % 60;

    if days > 0 {
        parts.push(format!("{:}d", days));
    }

    if hours > 0 {
        parts.push(format!("{:}h", hours));
    }

    if minutes > 0 {
        parts.push(format!("{:}m", minutes));
    }

    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{:}s", seconds));
    }

    if duration < chrono::Duration::zero() {
        parts.push("ago".to_string());
    }

    parts.join(" ")
}

pub fn seconds_to_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((seconds * 1000.0).round() as i64)
}
