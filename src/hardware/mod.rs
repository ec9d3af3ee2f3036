use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::defs::{FanSpeed, TimeOfDay};

pub mod clock;
pub mod sim;

pub use clock::SystemClock;
pub use sim::{SimActuators, SimSensors};

/// Temperature and fan tachometer acquisition.
#[async_trait]
pub trait Sensors: Send {
    /// Enclosure temperature in °F.
    async fn read_temperature(&mut self) -> Result<f32, SensorError>;

    /// Raw fan tachometer reading.
    async fn read_fan_tachometer(&mut self) -> Result<u32, SensorError>;
}

/// Wall-clock source for schedule evaluation.
#[async_trait]
pub trait Clock: Send {
    async fn now(&mut self) -> Result<TimeOfDay, SensorError>;
}

/// Relay and PWM outputs driving the enclosure loads.
#[async_trait]
pub trait Actuators: Send {
    async fn set_recording_power(&mut self, on: bool);
    async fn set_fan_power(&mut self, on: bool);
    async fn set_fan_speed(&mut self, speed: FanSpeed);
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}
