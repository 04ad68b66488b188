use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use smart_hub_common::HubSettings;

pub const MAX_STORAGE: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct StoredSettings {
    pub id: Uuid,
    pub user_temp: i32,
    pub user_light: String,
    pub light_time_off: String,
    #[serde(skip)]
    pub policy: HubSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f32,
    pub presence: bool,
    pub datetime: DateTime<FixedOffset>,
}

/// In-memory hub state: the latest settings and a newest-first history of
/// readings capped at `capacity`.
#[derive(Clone)]
pub struct HubStore {
    settings: Arc<Mutex<Option<StoredSettings>>>,
    history: Arc<Mutex<VecDeque<Reading>>>,
    capacity: usize,
}

impl HubStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            settings: Arc::new(Mutex::new(None)),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub async fn replace_settings(&self, settings: StoredSettings) {
        *self.settings.lock().await = Some(settings);
    }

    pub async fn settings(&self) -> Option<StoredSettings> {
        self.settings.lock().await.clone()
    }

    pub async fn record(&self, reading: Reading) {
        let mut history = self.history.lock().await;
        history.push_front(reading);
        history.truncate(self.capacity);
    }

    pub async fn latest(&self, count: usize) -> Vec<Reading> {
        self.history.lock().await.iter().take(count).cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.lock().await.is_empty()
    }
}

impl Default for HubStore {
    fn default() -> Self {
        Self::new(MAX_STORAGE)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn reading(minute: u32) -> Reading {
        Reading {
            temperature: 20.0 + minute as f32,
            presence: minute % 2 == 0,
            datetime: FixedOffset::west_opt(4 * 3600)
                .unwrap()
                .with_ymd_and_hms(2026, 3, 1, 12, minute, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn keeps_newest_first_and_drops_oldest() {
        let store = HubStore::new(3);
        for minute in 0..5 {
            store.record(reading(minute)).await;
        }

        let latest = store.latest(10).await;
        assert_eq!(latest, vec![reading(4), reading(3), reading(2)]);
        assert_eq!(store.latest(1).await, vec![reading(4)]);
    }

    #[tokio::test]
    async fn starts_empty() {
        let store = HubStore::default();
        assert!(store.is_empty().await);
        assert!(store.settings().await.is_none());
    }
}
