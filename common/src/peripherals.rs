use std::net::Ipv4Addr;

use crate::{
    error::{ActuatorError, NetworkError, SensorError, TransportError},
    types::{Actuator, SwitchState, TemperatureReading},
};

pub trait TemperatureProbe {
    fn request_conversion(&mut self) -> Result<(), SensorError>;

    fn is_conversion_complete(&mut self) -> Result<bool, SensorError>;

    // Driver failures come back as `Disconnected`.
    fn read_temperature(&mut self) -> TemperatureReading;
}

pub trait PresenceSensor {
    fn is_present(&mut self) -> bool;
}

pub trait Outputs {
    fn set(&mut self, actuator: Actuator, state: SwitchState) -> Result<(), ActuatorError>;
}

pub trait Board: TemperatureProbe + PresenceSensor + Outputs {}

impl<T: TemperatureProbe + PresenceSensor + Outputs> Board for T {}

pub trait Network {
    fn begin(&mut self) -> Result<(), NetworkError>;

    fn is_associated(&mut self) -> bool;

    fn reconnect(&mut self) -> Result<(), NetworkError> {
        self.begin()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait ReportClient {
    // Non-2xx statuses are responses, not errors.
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError>;
}
