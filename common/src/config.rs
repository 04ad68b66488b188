use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub one_wire: i32,
    pub light: i32,
    pub fan: i32,
    pub pir: i32,
    pub status_led: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            one_wire: 4,
            light: 22,
            fan: 23,
            pir: 15,
            status_led: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    /// Base URL of the hub API, without a trailing path.
    pub endpoint: String,
    pub cycle_interval_ms: u64,
    pub conversion_poll_ms: u64,
    pub conversion_timeout_ms: u64,
    pub wifi_poll_ms: u64,
    pub wifi_connect_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub status_blink_ms: u64,
    pub sensor_resolution_bits: u8,
    pub calibration_offset_c: f32,
    pub log_baud: u32,
    pub pins: PinConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            endpoint: "http://127.0.0.1:8000".to_string(),
            cycle_interval_ms: 500,
            conversion_poll_ms: 10,
            conversion_timeout_ms: 1_000,
            wifi_poll_ms: 500,
            wifi_connect_timeout_ms: 30_000,
            http_timeout_ms: 5_000,
            status_blink_ms: 1_000,
            sensor_resolution_bits: 12,
            calibration_offset_c: 0.25,
            log_baud: 115_200,
            pins: PinConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overlaid with the values baked in at build time.
    pub fn compiled() -> Self {
        let mut config = Self::default();
        if let Some(ssid) = option_env!("SMART_HUB_WIFI_SSID") {
            config.wifi_ssid = ssid.to_string();
        }
        if let Some(pass) = option_env!("SMART_HUB_WIFI_PASS") {
            config.wifi_pass = pass.to_string();
        }
        if let Some(endpoint) = option_env!("SMART_HUB_ENDPOINT") {
            config.endpoint = endpoint.to_string();
        }
        config.sanitize();
        config
    }

    pub fn sanitize(&mut self) {
        self.endpoint = self.endpoint.trim().trim_end_matches('/').to_string();
        self.cycle_interval_ms = self.cycle_interval_ms.max(10);
        self.conversion_poll_ms = self.conversion_poll_ms.clamp(1, 1_000);
        // A 12-bit DS18B20 conversion takes up to 750 ms.
        self.conversion_timeout_ms = self.conversion_timeout_ms.max(800);
        self.wifi_poll_ms = self.wifi_poll_ms.clamp(10, 10_000);
        self.sensor_resolution_bits = self.sensor_resolution_bits.clamp(9, 12);
        if !self.calibration_offset_c.is_finite() {
            self.calibration_offset_c = 0.0;
        }
    }

    pub fn has_wifi_credentials(&self) -> bool {
        let ssid = self.wifi_ssid.trim();
        !ssid.is_empty() && ssid != "CHANGE_ME"
    }
}
