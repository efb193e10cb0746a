pub mod configuration;
pub mod location;
pub mod logging;
pub mod model;
pub mod physics;
pub mod prediction;
pub mod simulation;
pub mod terrain;
pub mod utilities;
pub mod weather;

lazy_static::lazy_static! {
    pub static ref DATETIME_FORMAT: String = "%Y-%m-%d %H:%M:%S".to_string();
    pub static ref DEFAULT_MAX_FLIGHT_TIME: chrono::Duration = chrono::Duration::hours(24);
    pub static ref DEFAULT_CACHE_TTL: chrono::Duration = chrono::Duration::minutes(5);
    pub static ref DEFAULT_WEATHER_TIMEOUT: chrono::Duration = chrono::Duration::seconds(10);
    pub static ref LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
}
