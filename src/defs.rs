use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use thiserror::Error;

/// A recurring daily time-of-day trigger, also the shape of a clock reading.
///
/// The wire representation is `"HH:MM:SS"` (24-hour, colon-separated).
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Error, PartialEq)]
pub enum TimeParseError {
    #[error("expected HH:MM:SS, got \"{0}\"")]
    Malformed(String),

    #[error("time component out of range in \"{0}\"")]
    OutOfRange(String),
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8, second: u8) -> Option<Self> {
        (hour < 24 && minute < 60 && second < 60).then_some(Self {
            hour,
            minute,
            second,
        })
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TimeParseError::Malformed(s.to_owned());

        let mut parts = s.trim().split(':');

        let hour = parts.next().ok_or_else(malformed)?;
        let minute = parts.next().ok_or_else(malformed)?;
        let second = parts.next().ok_or_else(malformed)?;

        if parts.next().is_some() {
            return Err(malformed());
        }

        let [hour, minute, second] = [hour, minute, second]
            .map(|part| part.trim().parse::<u8>().map_err(|_| malformed()));

        TimeOfDay::new(hour?, minute?, second?)
            .ok_or_else(|| TimeParseError::OutOfRange(s.to_owned()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/* == Fan speed == */

/// Commanded fan speed level, mapped onto an 8-bit PWM duty cycle.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Display, EnumIter, Eq, PartialEq, Serialize,
)]
pub enum FanSpeed {
    Off,
    #[default]
    Low,
    Medium,
    High,
    Max,
}

impl FanSpeed {
    pub fn duty(self) -> u8 {
        match self {
            FanSpeed::Off => 0,
            FanSpeed::Low => 63,
            FanSpeed::Medium => 127,
            FanSpeed::High => 191,
            FanSpeed::Max => 255,
        }
    }
}
