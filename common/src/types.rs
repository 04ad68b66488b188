use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// Reported by the DS18B20 driver family for a failed or absent probe.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    fn from_value(value: Option<&Value>) -> Self {
        Self::from_bool(matches!(value, Some(Value::String(s)) if s == "on"))
    }
}

// Only the exact string "on" switches an output on. Any other string, a
// non-string value or null all decode as `Off`.
impl<'de> Deserialize<'de> for SwitchState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(Some(&value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Fan,
    Light,
    StatusLed,
}

impl Actuator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "fan",
            Self::Light => "light",
            Self::StatusLed => "status-led",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureReading {
    Celsius(f32),
    Disconnected,
}

impl TemperatureReading {
    pub fn from_celsius(temp_c: f32) -> Self {
        if !temp_c.is_finite() || temp_c == DEVICE_DISCONNECTED_C {
            Self::Disconnected
        } else {
            Self::Celsius(temp_c)
        }
    }

    pub fn celsius(self) -> Option<f32> {
        match self {
            Self::Celsius(temp_c) => Some(temp_c),
            Self::Disconnected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub temperature: f32,
    pub presence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActuatorCommand {
    pub fan: SwitchState,
    pub light: SwitchState,
}

// Only a JSON object is a command. Absent fields mean `Off` and extra
// fields are ignored.
impl<'de> Deserialize<'de> for ActuatorCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self {
            fan: SwitchState::from_value(fields.get("fan")),
            light: SwitchState::from_value(fields.get("light")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_on_switches_on() {
        let command: ActuatorCommand =
            serde_json::from_str(r#"{"fan":"on","light":"ON"}"#).unwrap();
        assert_eq!(command.fan, SwitchState::On);
        assert_eq!(command.light, SwitchState::Off);

        let command: ActuatorCommand =
            serde_json::from_str(r#"{"fan":" on","light":"maybe"}"#).unwrap();
        assert_eq!(command, ActuatorCommand::default());
    }

    #[test]
    fn missing_or_non_string_fields_decode_as_off() {
        let command: ActuatorCommand = serde_json::from_str(r#"{"light":"on"}"#).unwrap();
        assert_eq!(command.fan, SwitchState::Off);
        assert_eq!(command.light, SwitchState::On);

        let command: ActuatorCommand =
            serde_json::from_str(r#"{"fan":1,"light":null,"settings":"none"}"#).unwrap();
        assert_eq!(command, ActuatorCommand::default());
    }

    #[test]
    fn non_object_response_is_rejected() {
        assert!(serde_json::from_str::<ActuatorCommand>("[\"on\"]").is_err());
        assert!(serde_json::from_str::<ActuatorCommand>(r#"["on","on"]"#).is_err());
        assert!(serde_json::from_str::<ActuatorCommand>("\"on\"").is_err());
        assert!(serde_json::from_str::<ActuatorCommand>("null").is_err());
        assert!(serde_json::from_str::<ActuatorCommand>("fan=on").is_err());
    }

    #[test]
    fn report_serializes_expected_fields() {
        let body = serde_json::to_string(&SensorReport {
            temperature: 21.5,
            presence: true,
        })
        .unwrap();
        assert_eq!(body, r#"{"temperature":21.5,"presence":true}"#);
    }

    #[test]
    fn sentinel_maps_to_disconnected() {
        assert_eq!(
            TemperatureReading::from_celsius(DEVICE_DISCONNECTED_C),
            TemperatureReading::Disconnected
        );
        assert_eq!(
            TemperatureReading::from_celsius(f32::NAN),
            TemperatureReading::Disconnected
        );
        assert_eq!(TemperatureReading::from_celsius(21.5).celsius(), Some(21.5));
    }
}
