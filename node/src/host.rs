use std::{
    io::Read,
    time::{Duration, Instant},
};

use anyhow::Context;
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use tracing::info;

use smart_hub_common::{
    Actuator, ActuatorError, HttpResponse, Network, NetworkError, Node, NodeConfig, Outputs,
    PresenceSensor, ReportClient, SensorError, SwitchState, TemperatureProbe, TemperatureReading,
    TransportError,
};

use crate::clock::SystemClock;

const MAX_HTTP_BODY: usize = 4096;
const CONVERSION_TIME_MS: u64 = 750;
const PRESENCE_PERIOD: u64 = 10;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = NodeConfig::compiled();
    if let Ok(endpoint) = std::env::var("SMART_HUB_ENDPOINT") {
        config.endpoint = endpoint;
    }
    if let Some(interval) = std::env::var("SMART_HUB_CYCLE_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.cycle_interval_ms = interval;
    }
    config.sanitize();

    let fault_every = std::env::var("SMART_HUB_SIM_FAULT_EVERY")
        .ok()
        .and_then(|value| value.parse::<u64>().ok());

    let client = HttpReportClient::new(Duration::from_millis(config.http_timeout_ms))?;
    let board = SimulatedBoard::new(config.calibration_offset_c, fault_every);

    info!("simulated node reporting to {}", config.endpoint);

    let mut node = Node::new(config, board, HostNetwork, client, SystemClock::new());
    node.start();
    node.run()
}

// Stand-in for the DS18B20, PIR and output pins.
struct SimulatedBoard {
    offset_c: f32,
    fault_every: Option<u64>,
    conversions: u64,
    conversion_started: Option<Instant>,
    samples: u64,
    fan: SwitchState,
    light: SwitchState,
}

impl SimulatedBoard {
    fn new(offset_c: f32, fault_every: Option<u64>) -> Self {
        Self {
            offset_c,
            fault_every: fault_every.filter(|every| *every > 0),
            conversions: 0,
            conversion_started: None,
            samples: 0,
            fan: SwitchState::Off,
            light: SwitchState::Off,
        }
    }
}

impl TemperatureProbe for SimulatedBoard {
    fn request_conversion(&mut self) -> Result<(), SensorError> {
        self.conversions = self.conversions.saturating_add(1);
        self.conversion_started = Some(Instant::now());
        Ok(())
    }

    fn is_conversion_complete(&mut self) -> Result<bool, SensorError> {
        let started = self
            .conversion_started
            .ok_or_else(|| SensorError::Bus("no conversion in progress".to_string()))?;
        Ok(started.elapsed() >= Duration::from_millis(CONVERSION_TIME_MS))
    }

    fn read_temperature(&mut self) -> TemperatureReading {
        self.conversion_started = None;
        if let Some(every) = self.fault_every {
            if self.conversions % every == 0 {
                return TemperatureReading::Disconnected;
            }
        }

        let temp_c = 21.0 + (self.conversions % 8) as f32 * 0.2;
        TemperatureReading::from_celsius(temp_c + self.offset_c)
    }
}

impl PresenceSensor for SimulatedBoard {
    fn is_present(&mut self) -> bool {
        self.samples = self.samples.saturating_add(1);
        (self.samples / PRESENCE_PERIOD) % 2 == 0
    }
}

impl Outputs for SimulatedBoard {
    fn set(&mut self, actuator: Actuator, state: SwitchState) -> Result<(), ActuatorError> {
        let current = match actuator {
            Actuator::Fan => &mut self.fan,
            Actuator::Light => &mut self.light,
            Actuator::StatusLed => {
                info!("[GPIO] status led {}", state.as_str());
                return Ok(());
            }
        };

        if *current != state {
            info!("[GPIO] {} -> {}", actuator.as_str(), state.as_str());
            *current = state;
        }
        Ok(())
    }
}

/// The host is always on a network; association is not modelled.
struct HostNetwork;

impl Network for HostNetwork {
    fn begin(&mut self) -> Result<(), NetworkError> {
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        true
    }
}

struct HttpReportClient {
    client: Client,
}

impl HttpReportClient {
    fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl ReportClient for HttpReportClient {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status().as_u16();
        if response
            .content_length()
            .is_some_and(|len| len > MAX_HTTP_BODY as u64)
        {
            return Err(TransportError::BodyTooLarge {
                limit: MAX_HTTP_BODY,
            });
        }

        let body = read_capped(response, MAX_HTTP_BODY)?;
        Ok(HttpResponse { status, body })
    }
}

// Never buffers more than `limit + 1` bytes, whatever the peer sends.
fn read_capped<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| TransportError::Request(err.to_string()))?;
    if body.len() > limit {
        return Err(TransportError::BodyTooLarge { limit });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_probe_injects_faults() {
        let mut board = SimulatedBoard::new(0.25, Some(3));
        let mut readings = Vec::new();
        for _ in 0..3 {
            board.request_conversion().unwrap();
            readings.push(board.read_temperature());
        }

        let first = readings[0].celsius().unwrap();
        assert!((first - 21.45).abs() < 1e-4, "{first}");
        assert_eq!(readings[2], TemperatureReading::Disconnected);
    }

    #[test]
    fn conversion_poll_without_request_is_an_error() {
        let mut board = SimulatedBoard::new(0.0, None);
        assert!(board.is_conversion_complete().is_err());

        board.request_conversion().unwrap();
        assert!(!board.is_conversion_complete().unwrap());
    }

    #[test]
    fn response_body_is_capped() {
        let body = read_capped(&b"{\"fan\":\"on\"}"[..], MAX_HTTP_BODY).unwrap();
        assert_eq!(body, b"{\"fan\":\"on\"}");

        let exact = vec![b'x'; 16];
        assert_eq!(read_capped(&exact[..], 16).unwrap().len(), 16);

        let endless = std::io::repeat(b'x');
        assert!(matches!(
            read_capped(endless, MAX_HTTP_BODY),
            Err(TransportError::BodyTooLarge {
                limit: MAX_HTTP_BODY
            })
        ));
    }

    #[test]
    fn presence_alternates_in_blocks() {
        let mut board = SimulatedBoard::new(0.0, None);
        let samples: Vec<bool> = (0..20).map(|_| board.is_present()).collect();

        assert!(samples[..9].iter().all(|present| *present));
        assert!(samples[9..19].iter().all(|present| !*present));
        assert!(samples[19]);
    }
}
