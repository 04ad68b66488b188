pub mod config;
pub mod cycle;
pub mod endpoints;
pub mod error;
pub mod peripherals;
pub mod policy;
pub mod types;
pub mod wait;

pub use config::{NodeConfig, PinConfig};
pub use cycle::{decode_command, CycleOutcome, CyclePhase, Node, BANNER};
pub use endpoints::*;
pub use error::{
    ActuatorError, NetworkError, PolicyError, ResponseError, SensorError, TransportError,
};
pub use peripherals::{
    Board, HttpResponse, Network, Outputs, PresenceSensor, ReportClient, TemperatureProbe,
};
pub use policy::{HubSettings, LightWindow};
pub use types::{
    Actuator, ActuatorCommand, SensorReport, SwitchState, TemperatureReading,
    DEVICE_DISCONNECTED_C,
};
pub use wait::{try_wait_until, wait_until, Clock, WaitOutcome};
