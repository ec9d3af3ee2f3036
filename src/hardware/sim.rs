use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;

use crate::defs::FanSpeed;

use super::{Actuators, SensorError, Sensors};

const AMBIENT_F: f32 = 82.0;
const SOLAR_GAIN_F: f32 = 14.0;
const FAN_PULL_F: f32 = 18.0;
const TIME_CONSTANT_S: f32 = 120.0;

const TACH_PULSES_AT_MAX: u32 = 3200;

/// In-process stand-in for the enclosure's physical sensors and relays.
///
/// A first-order thermal model: the enclosure heats toward ambient plus
/// solar gain, and the fan pulls it back down proportionally to its duty.
pub fn simulated() -> (SimSensors, SimActuators) {
    let enclosure = Arc::new(Mutex::new(Enclosure::new()));

    (
        SimSensors {
            enclosure: enclosure.clone(),
        },
        SimActuators { enclosure },
    )
}

#[derive(Clone)]
pub struct SimSensors {
    enclosure: Arc<Mutex<Enclosure>>,
}

pub struct SimActuators {
    enclosure: Arc<Mutex<Enclosure>>,
}

#[derive(Debug)]
struct Enclosure {
    temperature_f: f32,
    fan_powered: bool,
    fan_speed: FanSpeed,
    recording_powered: bool,
    updated: Instant,
}

impl Enclosure {
    fn new() -> Self {
        Self {
            temperature_f: AMBIENT_F + SOLAR_GAIN_F,
            fan_powered: false,
            fan_speed: FanSpeed::default(),
            recording_powered: false,
            updated: Instant::now(),
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.updated).as_secs_f32();
        self.updated = now;

        let cooling = match self.fan_powered {
            true => FAN_PULL_F * self.fan_speed.duty() as f32 / 255.0,
            false => 0.0,
        };

        let target = AMBIENT_F + SOLAR_GAIN_F - cooling;
        let alpha = (elapsed / TIME_CONSTANT_S).min(1.0);

        self.temperature_f += (target - self.temperature_f) * alpha;
    }

    fn tachometer(&self) -> u32 {
        match self.fan_powered {
            true => TACH_PULSES_AT_MAX * self.fan_speed.duty() as u32 / 255,
            false => 0,
        }
    }
}

#[async_trait]
impl Sensors for SimSensors {
    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let mut enclosure = self.enclosure.lock().unwrap();
        enclosure.advance();
        Ok(enclosure.temperature_f)
    }

    async fn read_fan_tachometer(&mut self) -> Result<u32, SensorError> {
        Ok(self.enclosure.lock().unwrap().tachometer())
    }
}

#[async_trait]
impl Actuators for SimActuators {
    async fn set_recording_power(&mut self, on: bool) {
        self.enclosure.lock().unwrap().recording_powered = on;
    }

    async fn set_fan_power(&mut self, on: bool) {
        let mut enclosure = self.enclosure.lock().unwrap();
        enclosure.advance();
        enclosure.fan_powered = on;
    }

    async fn set_fan_speed(&mut self, speed: FanSpeed) {
        let mut enclosure = self.enclosure.lock().unwrap();
        enclosure.advance();
        enclosure.fan_speed = speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sim_cools_when_fan_runs() {
        let (mut sensors, mut actuators) = simulated();

        let idle = sensors.read_temperature().await.unwrap();
        assert!(idle > AMBIENT_F);

        actuators.set_fan_power(true).await;
        actuators.set_fan_speed(FanSpeed::Max).await;

        // Push the model well past its time constant.
        {
            let mut enclosure = actuators.enclosure.lock().unwrap();
            enclosure.updated -= std::time::Duration::from_secs(3600);
        }

        let cooled = sensors.read_temperature().await.unwrap();
        assert!(cooled < idle);

        assert_eq!(sensors.read_fan_tachometer().await.unwrap(), TACH_PULSES_AT_MAX);
    }
}
