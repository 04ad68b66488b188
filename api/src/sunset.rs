use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use sunrise::{Coordinates, SolarDay, SolarEvent};
use tokio::sync::Mutex;
use tracing::{debug, warn};

// Used when a sunset request carries no coordinates.
pub const DEFAULT_LAT: f64 = 17.074656;
pub const DEFAULT_LNG: f64 = -61.817520;

type CacheKey = (i64, i64, NaiveDate);

#[derive(Clone)]
pub struct SunsetResolver {
    timezone: Tz,
    fallback: NaiveTime,
    cache: Arc<Mutex<HashMap<CacheKey, NaiveTime>>>,
}

impl SunsetResolver {
    pub fn new(timezone: Tz, fallback: NaiveTime) -> Self {
        Self {
            timezone,
            fallback,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn fallback(&self) -> NaiveTime {
        self.fallback
    }

    /// Local sunset on `date` at the given coordinates, cached per day on
    /// coordinates rounded to four decimals. Falls back to the configured
    /// sunset when the position has no usable sunset.
    pub async fn resolve(
        &self,
        lat: Option<f64>,
        lng: Option<f64>,
        date: NaiveDate,
    ) -> NaiveTime {
        let (lat, lng) = match (lat, lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => (DEFAULT_LAT, DEFAULT_LNG),
        };

        let mut cache = self.cache.lock().await;
        cache.retain(|(_, _, day), _| *day == date);

        let key = (round4(lat), round4(lng), date);
        if let Some(sunset) = cache.get(&key) {
            return *sunset;
        }

        match local_sunset(lat, lng, date, self.timezone) {
            Some(sunset) => {
                debug!("sunset at ({lat}, {lng}) on {date} is {sunset}");
                cache.insert(key, sunset);
                sunset
            }
            None => {
                warn!(
                    "no sunset for ({lat}, {lng}) on {date}; using {}",
                    self.fallback
                );
                self.fallback
            }
        }
    }

    #[cfg(test)]
    async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

pub fn local_sunset(lat: f64, lng: f64, date: NaiveDate, timezone: Tz) -> Option<NaiveTime> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }

    let timestamp = SolarDay::new(Coordinates::new(lat, lng)?, date)
        .event_time(SolarEvent::Sunset)
        .timestamp();
    let sunset = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
    Some(sunset.with_timezone(&timezone).time())
}

fn round4(value: f64) -> i64 {
    (value * 10_000.0).round() as i64
}
