use core::convert::TryInto;
use std::{net::Ipv4Addr, time::Duration};

use anyhow::{anyhow, Context};
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, InputOutput, Level, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::EspWifi,
};
use log::{info, warn};
use one_wire_bus::{Address, OneWire};

use smart_hub_common::{
    Actuator, ActuatorError, HttpResponse, Network, NetworkError, Node, NodeConfig, Outputs,
    PinConfig, PresenceSensor, ReportClient, SensorError, SwitchState, TemperatureProbe,
    TemperatureReading, TransportError,
};

use crate::clock::SystemClock;

const MAX_HTTP_BODY: usize = 4096;
const HTTP_CHUNK_SIZE: usize = 512;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let config = NodeConfig::compiled();
    info!(
        "log channel on UART0 at {} baud (CONFIG_ESP_CONSOLE_UART_BAUDRATE)",
        config.log_baud
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let board = EspBoard::new(&config).context("failed to initialize board")?;
    let network =
        EspNetwork::new(modem, sys_loop, nvs_partition, &config).context("wifi setup failed")?;
    let client = EspReportClient {
        timeout: Duration::from_millis(config.http_timeout_ms),
    };

    let mut node = Node::new(config, board, network, client, SystemClock::new());
    node.start();
    node.run()
}

struct EspBoard {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    ds18: Option<Ds18b20>,
    resolution: Resolution,
    offset_c: f32,
    delay: Ets,
    pir: PinDriver<'static, AnyInputPin, Input>,
    fan: PinDriver<'static, AnyOutputPin, Output>,
    light: PinDriver<'static, AnyOutputPin, Output>,
    status_led: PinDriver<'static, AnyOutputPin, Output>,
    pins: PinConfig,
}

impl EspBoard {
    fn new(config: &NodeConfig) -> anyhow::Result<Self> {
        let pins = config.pins;

        // Outputs come up low so the fan and light start in a known-off state.
        let mut fan = PinDriver::output(unsafe { AnyOutputPin::new(pins.fan) })?;
        fan.set_low()?;
        let mut light = PinDriver::output(unsafe { AnyOutputPin::new(pins.light) })?;
        light.set_low()?;
        let mut status_led = PinDriver::output(unsafe { AnyOutputPin::new(pins.status_led) })?;
        status_led.set_low()?;

        let pir = PinDriver::input(unsafe { AnyInputPin::new(pins.pir) })?;

        let mut one_wire_pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(pins.one_wire) })?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let mut board = Self {
            one_wire,
            ds18: None,
            resolution: resolution_from_bits(config.sensor_resolution_bits),
            offset_c: config.calibration_offset_c,
            delay: Ets,
            pir,
            fan,
            light,
            status_led,
            pins,
        };

        board.refresh_ds18();
        Ok(board)
    }

    fn refresh_ds18(&mut self) {
        let mut first_ds18: Option<Address> = None;
        let mut device_count = 0_u32;

        for addr in self.one_wire.devices(false, &mut self.delay) {
            match addr {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if first_ds18.is_none() && address.family_code() == ds18b20::FAMILY_CODE {
                        first_ds18 = Some(address);
                    }
                }
                Err(err) => {
                    warn!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        let Some(address) = first_ds18 else {
            warn!(
                "no DS18B20 found on GPIO{} ({} one-wire device(s) detected)",
                self.pins.one_wire, device_count
            );
            self.ds18 = None;
            return;
        };

        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid DS18B20 address {:?}: {err:?}", address);
                self.ds18 = None;
                return;
            }
        };

        if let Err(err) = sensor.set_config(
            i8::MIN,
            i8::MAX,
            self.resolution,
            &mut self.one_wire,
            &mut self.delay,
        ) {
            warn!("failed to set DS18B20 resolution: {err:?}");
        }

        info!(
            "DS18B20 ready on GPIO{} ({} one-wire device(s), using {:?}, offset {:+.2}°C)",
            self.pins.one_wire, device_count, address, self.offset_c
        );
        self.ds18 = Some(sensor);
    }

    fn pin_for(&mut self, actuator: Actuator) -> &mut PinDriver<'static, AnyOutputPin, Output> {
        match actuator {
            Actuator::Fan => &mut self.fan,
            Actuator::Light => &mut self.light,
            Actuator::StatusLed => &mut self.status_led,
        }
    }
}

impl TemperatureProbe for EspBoard {
    fn request_conversion(&mut self) -> Result<(), SensorError> {
        if self.ds18.is_none() {
            self.refresh_ds18();
        }
        if self.ds18.is_none() {
            return Err(SensorError::NotFound);
        }

        ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay).map_err(
            |err| {
                self.ds18 = None;
                SensorError::Bus(format!("failed to start conversion: {err:?}"))
            },
        )
    }

    // The DS18B20 holds the bus low during read slots until the conversion
    // finishes.
    fn is_conversion_complete(&mut self) -> Result<bool, SensorError> {
        self.one_wire
            .read_bit(&mut self.delay)
            .map_err(|err| SensorError::Bus(format!("{err:?}")))
    }

    fn read_temperature(&mut self) -> TemperatureReading {
        let Some(sensor) = self.ds18.as_ref() else {
            return TemperatureReading::Disconnected;
        };

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => TemperatureReading::from_celsius(data.temperature + self.offset_c),
            Err(err) => {
                warn!("failed to read DS18B20 data: {err:?}");
                self.ds18 = None;
                TemperatureReading::Disconnected
            }
        }
    }
}

impl PresenceSensor for EspBoard {
    fn is_present(&mut self) -> bool {
        self.pir.is_high()
    }
}

impl Outputs for EspBoard {
    fn set(&mut self, actuator: Actuator, state: SwitchState) -> Result<(), ActuatorError> {
        let level = if state.is_on() { Level::High } else { Level::Low };
        self.pin_for(actuator)
            .set_level(level)
            .map_err(|err| ActuatorError {
                actuator,
                reason: err.to_string(),
            })
    }
}

struct EspNetwork {
    wifi: EspWifi<'static>,
    has_credentials: bool,
}

impl EspNetwork {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        config: &NodeConfig,
    ) -> anyhow::Result<Self> {
        let mut wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;

        let auth_method = if config.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            password: config
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;
        wifi.start()?;

        Ok(Self {
            wifi,
            has_credentials: config.has_wifi_credentials(),
        })
    }
}

impl Network for EspNetwork {
    fn begin(&mut self) -> Result<(), NetworkError> {
        if !self.has_credentials {
            return Err(NetworkError::MissingCredentials);
        }
        self.wifi
            .connect()
            .map_err(|err| NetworkError::Request(err.to_string()))
    }

    fn is_associated(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn reconnect(&mut self) -> Result<(), NetworkError> {
        // Drop any half-open association before asking for a new one.
        let _ = self.wifi.disconnect();
        self.begin()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.sta_netif().get_ip_info().ok().map(|info| info.ip)
    }
}

/// Opens a fresh connection per report; nothing is kept between cycles.
struct EspReportClient {
    timeout: Duration,
}

impl ReportClient for EspReportClient {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        let request_err = |err: &dyn core::fmt::Debug| TransportError::Request(format!("{err:?}"));

        let conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&conf).map_err(|err| request_err(&err))?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];

        let mut request = client
            .request(Method::Post, url, &headers)
            .map_err(|err| request_err(&err))?;
        request.write_all(body).map_err(|err| request_err(&err))?;
        request.flush().map_err(|err| request_err(&err))?;
        let mut response = request.submit().map_err(|err| request_err(&err))?;

        let status = response.status();
        let mut payload = Vec::new();
        let mut chunk = [0_u8; HTTP_CHUNK_SIZE];
        loop {
            let read = response.read(&mut chunk).map_err(|err| request_err(&err))?;
            if read == 0 {
                break;
            }
            if payload.len() + read > MAX_HTTP_BODY {
                return Err(TransportError::BodyTooLarge {
                    limit: MAX_HTTP_BODY,
                });
            }
            payload.extend_from_slice(&chunk[..read]);
        }

        Ok(HttpResponse {
            status,
            body: payload,
        })
    }
}

fn resolution_from_bits(bits: u8) -> Resolution {
    match bits {
        9 => Resolution::Bits9,
        10 => Resolution::Bits10,
        11 => Resolution::Bits11,
        _ => Resolution::Bits12,
    }
}
