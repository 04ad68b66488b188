use thiserror::Error;

use crate::types::Actuator;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no DS18B20 found on the one-wire bus")]
    NotFound,
    #[error("one-wire bus error: {0}")]
    Bus(String),
}

#[derive(Debug, Error)]
#[error("failed to drive {} output: {reason}", actuator.as_str())]
pub struct ActuatorError {
    pub actuator: Actuator,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("wifi credentials are not configured")]
    MissingCredentials,
    #[error("wifi request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("http request failed: {0}")]
    Request(String),
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("malformed actuator response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid time of day `{0}`, expected HH:MM or HH:MM:SS")]
    InvalidTime(String),
    #[error("invalid duration `{0}`, expected e.g. 1h30m or 45m")]
    InvalidDuration(String),
}
