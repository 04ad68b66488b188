use std::{
    thread,
    time::{Duration, Instant},
};

use smart_hub_common::Clock;

/// Wall-clock delays on the current thread. On ESP-IDF `thread::sleep` yields
/// to FreeRTOS, so the idle task keeps running during waits.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
