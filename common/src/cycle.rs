use log::{debug, info, warn};

use crate::{
    config::NodeConfig,
    endpoints::sensors_data_url,
    error::{ResponseError, SensorError},
    peripherals::{Board, Network, ReportClient},
    types::{Actuator, ActuatorCommand, SensorReport, SwitchState},
    wait::{try_wait_until, wait_until, Clock, WaitOutcome},
};

pub const BANNER: &str = "Welcome to Smart Hub 2.0";

const HTTP_OK: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Converting,
    Reporting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Actuated {
        report: SensorReport,
        command: ActuatorCommand,
    },
    SensorFault,
    ConversionTimedOut,
    HttpStatus {
        report: SensorReport,
        status: u16,
    },
    EncodeFailed,
    TransportFailed,
    MalformedResponse,
    Disconnected {
        reconnect_requested: bool,
    },
}

impl CycleOutcome {
    // A transport failure may still have reached the hub.
    pub fn post_attempted(&self) -> bool {
        self.response_received() || matches!(self, Self::TransportFailed)
    }

    pub fn response_received(&self) -> bool {
        matches!(
            self,
            Self::Actuated { .. } | Self::HttpStatus { .. } | Self::MalformedResponse
        )
    }
}

pub fn decode_command(body: &[u8]) -> Result<ActuatorCommand, ResponseError> {
    Ok(serde_json::from_slice(body)?)
}

pub struct Node<B, N, R, C> {
    config: NodeConfig,
    url: String,
    board: B,
    network: N,
    client: R,
    clock: C,
    phase: CyclePhase,
    outputs: ActuatorCommand,
}

impl<B, N, R, C> Node<B, N, R, C>
where
    B: Board,
    N: Network,
    R: ReportClient,
    C: Clock,
{
    pub fn new(config: NodeConfig, board: B, network: N, client: R, clock: C) -> Self {
        let url = sensors_data_url(&config.endpoint);
        Self {
            config,
            url,
            board,
            network,
            client,
            clock,
            phase: CyclePhase::Idle,
            outputs: ActuatorCommand::default(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn outputs(&self) -> ActuatorCommand {
        self.outputs
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    // A timed-out association leaves the node `Disconnected`; the first
    // cycle then reconnects instead of reporting.
    pub fn start(&mut self) -> WaitOutcome {
        self.drive(Actuator::Fan, SwitchState::Off);
        self.drive(Actuator::Light, SwitchState::Off);

        self.blink_status();

        info!("{BANNER}");
        info!("connecting to wifi `{}`", self.config.wifi_ssid);
        if let Err(err) = self.network.begin() {
            warn!("wifi begin failed: {err}");
        }

        let network = &mut self.network;
        let outcome = wait_until(
            &mut self.clock,
            self.config.wifi_connect_timeout_ms,
            self.config.wifi_poll_ms,
            || {
                let associated = network.is_associated();
                if !associated {
                    debug!(".");
                }
                associated
            },
        );

        match outcome {
            WaitOutcome::Ready => {
                match self.network.local_ip() {
                    Some(ip) => info!("WiFi connected. IP address is: {ip}"),
                    None => info!("WiFi connected"),
                }
                self.phase = CyclePhase::Idle;
            }
            WaitOutcome::TimedOut => {
                warn!(
                    "wifi not associated after {} ms; continuing with reconnect attempts",
                    self.config.wifi_connect_timeout_ms
                );
                self.phase = CyclePhase::Disconnected;
            }
        }

        outcome
    }

    pub fn run(&mut self) -> ! {
        loop {
            let outcome = self.run_cycle();
            debug!("cycle finished: {outcome:?}");
            self.clock.delay_ms(self.config.cycle_interval_ms);
        }
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        let presence = self.board.is_present();

        if !self.network.is_associated() {
            self.phase = CyclePhase::Disconnected;
            warn!("WiFi connection lost");
            let reconnect_requested = match self.network.reconnect() {
                Ok(()) => true,
                Err(err) => {
                    warn!("wifi reconnect request failed: {err}");
                    false
                }
            };
            return CycleOutcome::Disconnected {
                reconnect_requested,
            };
        }

        if self.phase == CyclePhase::Disconnected {
            info!("wifi reassociated");
        }

        self.phase = CyclePhase::Idle;
        let outcome = self.sense_and_report(presence);
        self.phase = CyclePhase::Idle;
        outcome
    }

    fn sense_and_report(&mut self, presence: bool) -> CycleOutcome {
        self.phase = CyclePhase::Converting;
        match self.convert() {
            Ok(WaitOutcome::Ready) => {}
            Ok(WaitOutcome::TimedOut) => {
                warn!(
                    "temperature conversion not complete after {} ms",
                    self.config.conversion_timeout_ms
                );
                return CycleOutcome::ConversionTimedOut;
            }
            Err(err) => {
                warn!("Temperature read failed: {err}");
                return CycleOutcome::SensorFault;
            }
        }

        let Some(temperature) = self.board.read_temperature().celsius() else {
            warn!("Temperature read failed");
            return CycleOutcome::SensorFault;
        };

        info!("Present Temperature: {temperature:.2}°C (presence: {presence})");
        self.report(SensorReport {
            temperature,
            presence,
        })
    }

    fn convert(&mut self) -> Result<WaitOutcome, SensorError> {
        self.board.request_conversion()?;
        let board = &mut self.board;
        try_wait_until(
            &mut self.clock,
            self.config.conversion_timeout_ms,
            self.config.conversion_poll_ms,
            || board.is_conversion_complete(),
        )
    }

    fn report(&mut self, report: SensorReport) -> CycleOutcome {
        self.phase = CyclePhase::Reporting;

        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(err) => {
                warn!("failed to encode report: {err}");
                return CycleOutcome::EncodeFailed;
            }
        };

        let response = match self.client.post_json(&self.url, &body) {
            Ok(response) => response,
            Err(err) => {
                warn!("HTTP POST to {} failed: {err}", self.url);
                return CycleOutcome::TransportFailed;
            }
        };

        if response.status != HTTP_OK {
            warn!("HTTP POST failed. Code: {}", response.status);
            return CycleOutcome::HttpStatus {
                report,
                status: response.status,
            };
        }

        info!("API Response: {}", String::from_utf8_lossy(&response.body));

        match decode_command(&response.body) {
            Ok(command) => {
                self.apply(command);
                CycleOutcome::Actuated { report, command }
            }
            Err(err) => {
                warn!("Deserialization failed: {err}");
                CycleOutcome::MalformedResponse
            }
        }
    }

    fn apply(&mut self, command: ActuatorCommand) {
        self.drive(Actuator::Fan, command.fan);
        match command.fan {
            SwitchState::On => info!("Cooling the place down"),
            SwitchState::Off => info!("Place is cool or no movements detected"),
        }

        self.drive(Actuator::Light, command.light);
        info!("Light is {}", command.light.as_str());
    }

    fn drive(&mut self, actuator: Actuator, state: SwitchState) {
        if let Err(err) = self.board.set(actuator, state) {
            warn!("{err}");
            return;
        }

        match actuator {
            Actuator::Fan => self.outputs.fan = state,
            Actuator::Light => self.outputs.light = state,
            Actuator::StatusLed => {}
        }
    }

    fn blink_status(&mut self) {
        for state in [SwitchState::On, SwitchState::Off] {
            if let Err(err) = self.board.set(Actuator::StatusLed, state) {
                warn!("{err}");
            }
            self.clock.delay_ms(self.config.status_blink_ms);
        }
    }
}
