use async_trait::async_trait;
use chrono::{Local, Timelike};

use crate::defs::TimeOfDay;

use super::{Clock, SensorError};

/// Local wall clock. The host is expected to keep itself NTP-synchronized.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn now(&mut self) -> Result<TimeOfDay, SensorError> {
        let now = Local::now();

        TimeOfDay::new(now.hour() as u8, now.minute() as u8, now.second() as u8)
            .ok_or_else(|| SensorError::Unavailable("system clock out of range".into()))
    }
}
