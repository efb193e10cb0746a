use sha2::Digest;

lazy_static::lazy_static! {
    pub static ref DEFAULT_WEATHER_TTL: chrono::Duration = chrono::Duration::hours(6);
}

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<chrono::DateTime<chrono::Utc>>,
}

impl ManualClock {
    pub fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock();
        *now = *now + duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        *self.now.lock()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub result: crate::prediction::PredictionResult,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

struct WeatherEntry {
    data: Vec<crate::weather::WeatherData>,
    stored_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: std::collections::HashMap<String, CacheEntry>,
    weather: std::collections::HashMap<(i64, i64), WeatherEntry>,
    in_flight: std::collections::HashSet<String>,
}

/// Outcome of claiming a cache key.
pub enum Lookup<'a> {
    Hit(crate::prediction::PredictionResult),
    /// nobody else is computing this key; the holder must compute it
    Leader(FlightGuard<'a>),
    /// the deadline passed while another caller was computing this key
    TimedOut,
}

/// Exclusive right to compute one key. Waiters are released when the guard drops.
pub struct FlightGuard<'a> {
    cache: &'a PredictionCache,
    key: String,
}

impl FlightGuard<'_> {
    /// store the result, if any, and release the slot
    pub fn complete(self, result: Option<&crate::prediction::PredictionResult>) {
        if let Some(result) = result {
            self.cache.put(&self.key, result.clone());
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        state.in_flight.remove(&self.key);
        self.cache.available.notify_all();
    }
}

/// TTL cache of prediction results, plus the last weather seen at each launch site.
///
/// Expired entries are evicted lazily on lookup. At most one computation runs per key; identical
/// requests arriving meanwhile block in `acquire` until it finishes.
pub struct PredictionCache {
    clock: std::sync::Arc<dyn Clock>,
    pub ttl: chrono::Duration,
    pub weather_ttl: chrono::Duration,
    state: parking_lot::Mutex<CacheState>,
    available: parking_lot::Condvar,
}

impl PredictionCache {
    pub fn new(clock: std::sync::Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            clock,
            ttl,
            weather_ttl: *DEFAULT_WEATHER_TTL,
            state: parking_lot::Mutex::new(CacheState::default()),
            available: parking_lot::Condvar::new(),
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn lookup(
        state: &mut CacheState,
        key: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<crate::prediction::PredictionResult> {
        match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.result.clone()),
            Some(_) => {
                log::debug!("cache entry {:} expired", key.get(..12).unwrap_or(key));
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<crate::prediction::PredictionResult> {
        let now = self.clock.now();
        Self::lookup(&mut self.state.lock(), key, now)
    }

    pub fn put(&self, key: &str, result: crate::prediction::PredictionResult) {
        let created_at = self.clock.now();
        self.state.lock().entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                result,
                created_at,
                expires_at: created_at + self.ttl,
            },
        );
    }

    /// entries held, including expired ones not yet looked up
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached result, or claim the key, waiting while another caller computes it.
    ///
    /// Waiting stops at `deadline`.
    pub fn acquire(&self, key: &str, deadline: Option<std::time::Instant>) -> Lookup<'_> {
        let mut state = self.state.lock();
        loop {
            if let Some(result) = Self::lookup(&mut state, key, self.clock.now()) {
                return Lookup::Hit(result);
            }
            if state.in_flight.insert(key.to_string()) {
                return Lookup::Leader(FlightGuard {
                    cache: self,
                    key: key.to_string(),
                });
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return Lookup::TimedOut;
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    pub fn remember_weather(
        &self,
        location: &crate::location::GeoPoint,
        data: &[crate::weather::WeatherData],
    ) {
        let stored_at = self.clock.now();
        self.state.lock().weather.insert(
            weather_key(location),
            WeatherEntry {
                data: data.to_vec(),
                stored_at,
            },
        );
    }

    /// most recent weather near `location`, if younger than `weather_ttl`
    pub fn last_weather(
        &self,
        location: &crate::location::GeoPoint,
    ) -> Option<Vec<crate::weather::WeatherData>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let key = weather_key(location);
        match state.weather.get(&key) {
            Some(entry) if now - entry.stored_at < self.weather_ttl => Some(entry.data.clone()),
            Some(_) => {
                state.weather.remove(&key);
                None
            }
            None => None,
        }
    }
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(SystemClock), *crate::DEFAULT_CACHE_TTL)
    }
}

/// launch sites within 0.1 degree share weather
fn weather_key(location: &crate::location::GeoPoint) -> (i64, i64) {
    (
        (location.latitude * 10.0).round() as i64,
        (location.longitude * 10.0).round() as i64,
    )
}

/// SHA-256 of the serialized request, hex encoded.
pub fn cache_key(request: &crate::prediction::PredictionRequest) -> String {
    let bytes = match serde_json::to_vec(request) {
        Ok(bytes) => bytes,
        Err(_) => format!("{request:?}").into_bytes(),
    };
    hex::encode(sha2::Sha256::digest(&bytes))
}

/// Monte Carlo seed taken from the leading 64 bits of a cache key.
pub fn seed_from_key(key: &str) -> u64 {
    key.get(..16)
        .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
        .unwrap_or_default()
}
