use chrono::{Duration, NaiveTime};

use crate::{
    error::PolicyError,
    types::{ActuatorCommand, SensorReport, SwitchState},
};

const TIME_FORMAT: &str = "%H:%M:%S";

pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, PolicyError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| PolicyError::InvalidTime(value.to_string()))
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Parses durations written as `<h>h<m>m<s>s`, e.g. `2h`, `1h30m`, `45m10s`.
/// Units must appear in that order and at least one must be present.
pub fn parse_duration(value: &str) -> Result<Duration, PolicyError> {
    let invalid = || PolicyError::InvalidDuration(value.to_string());

    let mut total_secs: i64 = 0;
    let mut digits = String::new();
    let mut last_unit = 0_u8;

    for c in value.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let (rank, scale) = match c {
            'h' => (1, 3_600),
            'm' => (2, 60),
            's' => (3, 1),
            _ => return Err(invalid()),
        };
        if digits.is_empty() || rank <= last_unit {
            return Err(invalid());
        }

        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        total_secs = amount
            .checked_mul(scale)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
        last_unit = rank;
    }

    if last_unit == 0 || !digits.is_empty() {
        return Err(invalid());
    }

    Duration::try_seconds(total_secs).ok_or_else(invalid)
}

/// Daily range during which the light may be on. `off` before `on` means the
/// window runs past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightWindow {
    pub on: NaiveTime,
    pub off: NaiveTime,
}

impl LightWindow {
    pub fn starting_at(on: NaiveTime, duration: Duration) -> Self {
        let (off, _) = on.overflowing_add_signed(duration);
        Self { on, off }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.on <= self.off {
            self.on <= time && time <= self.off
        } else {
            time >= self.on || time <= self.off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubSettings {
    pub user_temp: i32,
    pub light: LightWindow,
}

impl HubSettings {
    /// Builds settings from the user's strings. `user_light` is either a time
    /// of day or `sunset` (any case), which resolves to `sunset`.
    pub fn from_request(
        user_temp: i32,
        user_light: &str,
        light_duration: &str,
        sunset: NaiveTime,
    ) -> Result<Self, PolicyError> {
        let on = if user_light.trim().eq_ignore_ascii_case("sunset") {
            sunset
        } else {
            parse_time_of_day(user_light)?
        };
        let duration = parse_duration(light_duration)?;

        Ok(Self {
            user_temp,
            light: LightWindow::starting_at(on, duration),
        })
    }

    pub fn decide(&self, report: &SensorReport, local_time: NaiveTime) -> ActuatorCommand {
        let fan = report.presence && report.temperature >= self.user_temp as f32;
        let light = report.presence && self.light.contains(local_time);

        ActuatorCommand {
            fan: SwitchState::from_bool(fan),
            light: SwitchState::from_bool(light),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn hms(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    fn report(temperature: f32, presence: bool) -> SensorReport {
        SensorReport {
            temperature,
            presence,
        }
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("45m10s").unwrap(), Duration::seconds(2_710));
        assert_eq!(parse_duration(" 90s ").unwrap(), Duration::seconds(90));
    }

    #[test]
    fn rejects_malformed_durations() {
        for value in ["", "abc", "30", "m", "30m1h", "1h1h", "1.5h", "-1h"] {
            assert_eq!(
                parse_duration(value),
                Err(PolicyError::InvalidDuration(value.to_string())),
                "{value}"
            );
        }
    }

    #[test]
    fn parses_times_with_and_without_seconds() {
        assert_eq!(parse_time_of_day("18:45").unwrap(), hms(18, 45, 0));
        assert_eq!(parse_time_of_day("06:05:30").unwrap(), hms(6, 5, 30));
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("sunset").is_err());
        assert_eq!(format_time_of_day(hms(6, 5, 30)), "06:05:30");
    }

    #[test]
    fn window_wraps_past_midnight() {
        let window = LightWindow::starting_at(hms(22, 0, 0), Duration::hours(4));
        assert_eq!(window.off, hms(2, 0, 0));

        assert!(window.contains(hms(23, 30, 0)));
        assert!(window.contains(hms(1, 0, 0)));
        assert!(window.contains(hms(2, 0, 0)));
        assert!(!window.contains(hms(12, 0, 0)));
        assert!(!window.contains(hms(21, 59, 59)));
    }

    #[test]
    fn same_day_window_is_inclusive() {
        let window = LightWindow::starting_at(hms(18, 0, 0), Duration::minutes(90));

        assert!(window.contains(hms(18, 0, 0)));
        assert!(window.contains(hms(19, 30, 0)));
        assert!(!window.contains(hms(19, 30, 1)));
        assert!(!window.contains(hms(17, 59, 0)));
    }

    #[test]
    fn fan_needs_presence_and_threshold() {
        let settings =
            HubSettings::from_request(25, "18:00", "2h", hms(18, 45, 0)).unwrap();
        let noon = hms(12, 0, 0);

        assert_eq!(settings.decide(&report(25.0, true), noon).fan, SwitchState::On);
        assert_eq!(settings.decide(&report(24.9, true), noon).fan, SwitchState::Off);
        assert_eq!(settings.decide(&report(30.0, false), noon).fan, SwitchState::Off);
    }

    #[test]
    fn light_needs_presence_inside_window() {
        let settings =
            HubSettings::from_request(30, "sunset", "3h", hms(18, 45, 0)).unwrap();
        assert_eq!(settings.light.on, hms(18, 45, 0));
        assert_eq!(settings.light.off, hms(21, 45, 0));

        let evening = hms(20, 0, 0);
        assert_eq!(
            settings.decide(&report(21.5, true), evening),
            ActuatorCommand {
                fan: SwitchState::Off,
                light: SwitchState::On,
            }
        );
        assert_eq!(
            settings.decide(&report(21.5, false), evening).light,
            SwitchState::Off
        );
        assert_eq!(
            settings.decide(&report(21.5, true), hms(22, 0, 0)).light,
            SwitchState::Off
        );
    }

    #[test]
    fn sunset_keyword_is_case_insensitive() {
        let settings =
            HubSettings::from_request(20, " Sunset ", "1h", hms(18, 10, 0)).unwrap();
        assert_eq!(settings.light.on, hms(18, 10, 0));
    }
}
