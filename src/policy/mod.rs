use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::{
    config::{FailSafe, PolicyConfig},
    defs::{FanSpeed, TimeOfDay},
    hardware::{Actuators, Clock, Sensors},
    state::{SharedState, StationState, control::Outputs},
};

/// Evaluates the fan and recording policy once per tick and drives the
/// actuators. The engine is the sole writer of the observed outputs in
/// [`crate::state::ControlState`].
pub struct PolicyEngine<S, C, A> {
    sensors: S,
    clock: C,
    actuators: A,

    state: SharedState,
    tick_interval: Duration,
    fail_safe: FailSafe,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Decision {
    fan_active: bool,
    recording_active: bool,
    fan_speed: FanSpeed,
    trigger: Option<usize>,
}

impl<S: Sensors, C: Clock, A: Actuators> PolicyEngine<S, C, A> {
    pub fn new(config: &PolicyConfig, state: SharedState, sensors: S, clock: C, actuators: A) -> Self {
        Self {
            sensors,
            clock,
            actuators,
            state,
            tick_interval: config.tick_interval(),
            fail_safe: config.fail_safe,
        }
    }

    /// Runs forever. Individual ticks never propagate failures; a bad
    /// reading applies the configured fail-safe and the loop continues.
    pub async fn run(mut self) {
        tracing::info!(interval = ?self.tick_interval, "Policy engine started");

        let mut tick = interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            self.tick_once().await;
        }
    }

    pub async fn tick_once(&mut self) {
        let temperature = self.sensors.read_temperature().await;
        let now = self.clock.now().await;

        match (temperature, now) {
            (Ok(temperature), Ok(now)) => self.evaluate(temperature, now).await,

            (temperature, now) => {
                if let Err(error) = &temperature {
                    tracing::warn!(%error, "Temperature read failed");
                }

                if let Err(error) = &now {
                    tracing::warn!(%error, "Clock read failed");
                }

                self.apply_fail_safe().await;
            }
        }
    }

    async fn evaluate(&mut self, temperature: f32, now: TimeOfDay) {
        let decision = {
            let mut state = self.state.lock().await;
            let decision = Self::decide(&state, temperature, now);

            state.control.outputs = Outputs {
                recording_active: decision.recording_active,
                fan_active: decision.fan_active,
                fan_speed_level: decision.fan_speed,
            };

            decision
        };

        tracing::trace!(?decision, temperature, %now, "Tick evaluated");

        if let Some(index) = decision.trigger {
            tracing::debug!(index, "Schedule entry triggered the recording window");
        }

        self.drive(decision).await;
    }

    /// Pure decision function over one consistent state snapshot.
    fn decide(state: &StationState, temperature: f32, now: TimeOfDay) -> Decision {
        let control = &state.control;

        let fan_active = temperature >= control.fan_threshold() || control.force_fan;

        // First matching entry wins; later entries sharing the hour are
        // masked. The window never crosses the hour boundary.
        let trigger = state
            .schedule
            .entries()
            .iter()
            .position(|entry| now.hour == entry.hour && (now.minute as u32) < control.on_duration());

        let recording_active = control.force_recording || trigger.is_some();

        Decision {
            fan_active,
            recording_active,
            fan_speed: control.fan_speed,
            trigger,
        }
    }

    async fn drive(&mut self, decision: Decision) {
        self.actuators.set_fan_power(decision.fan_active).await;
        self.actuators.set_fan_speed(decision.fan_speed).await;

        self.actuators
            .set_recording_power(decision.recording_active)
            .await;
    }

    async fn apply_fail_safe(&mut self) {
        match self.fail_safe {
            // Keep the last known outputs in place.
            FailSafe::HoldLast => {}

            FailSafe::ForceOff => {
                tracing::warn!("Fail-safe: forcing loads off");

                let fan_speed = {
                    let mut state = self.state.lock().await;
                    let fan_speed = state.control.outputs.fan_speed_level;
                    state.control.outputs = Outputs {
                        fan_speed_level: fan_speed,
                        ..Outputs::default()
                    };
                    fan_speed
                };

                self.drive(Decision {
                    fan_active: false,
                    recording_active: false,
                    fan_speed,
                    trigger: None,
                })
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;

    use crate::{config::Config, hardware::SensorError};

    use super::*;

    struct FixedSensors {
        temperature: f32,
        failing: bool,
    }

    #[async_trait]
    impl Sensors for FixedSensors {
        async fn read_temperature(&mut self) -> Result<f32, SensorError> {
            match self.failing {
                true => Err(SensorError::Unavailable("probe offline".into())),
                false => Ok(self.temperature),
            }
        }

        async fn read_fan_tachometer(&mut self) -> Result<u32, SensorError> {
            Ok(0)
        }
    }

    struct FixedClock(TimeOfDay);

    #[async_trait]
    impl Clock for FixedClock {
        async fn now(&mut self) -> Result<TimeOfDay, SensorError> {
            Ok(self.0)
        }
    }

    #[derive(Clone, Default)]
    struct SpyActuators {
        pins: Arc<StdMutex<(bool, bool, FanSpeed)>>,
    }

    #[async_trait]
    impl Actuators for SpyActuators {
        async fn set_recording_power(&mut self, on: bool) {
            self.pins.lock().unwrap().0 = on;
        }

        async fn set_fan_power(&mut self, on: bool) {
            self.pins.lock().unwrap().1 = on;
        }

        async fn set_fan_speed(&mut self, speed: FanSpeed) {
            self.pins.lock().unwrap().2 = speed;
        }
    }

    fn engine_at(
        temperature: f32,
        now: TimeOfDay,
        fail_safe: FailSafe,
    ) -> (
        PolicyEngine<FixedSensors, FixedClock, SpyActuators>,
        SharedState,
        SpyActuators,
    ) {
        let config = Config::default();

        let state = StationState::from_config(&config).into_shared();
        let actuators = SpyActuators::default();

        let policy = PolicyConfig {
            fail_safe,
            ..Default::default()
        };

        let engine = PolicyEngine::new(
            &policy,
            state.clone(),
            FixedSensors {
                temperature,
                failing: false,
            },
            FixedClock(now),
            actuators.clone(),
        );

        (engine, state, actuators)
    }

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_fan_follows_threshold() {
        let (mut engine, state, pins) = engine_at(95.0, at(12, 0), FailSafe::HoldLast);
        engine.tick_once().await;

        assert!(state.lock().await.control.outputs.fan_active);
        assert!(pins.pins.lock().unwrap().1);

        engine.sensors.temperature = 89.9;
        engine.tick_once().await;

        assert!(!state.lock().await.control.outputs.fan_active);
        assert!(!pins.pins.lock().unwrap().1);
    }

    #[tokio::test]
    async fn test_fan_override_beats_temperature() {
        let (mut engine, state, _) = engine_at(0.0, at(12, 0), FailSafe::HoldLast);

        state.lock().await.control.force_fan = true;
        engine.tick_once().await;

        assert!(state.lock().await.control.outputs.fan_active);
    }

    #[tokio::test]
    async fn test_recording_window() {
        // Default schedule has an 18:00:00 entry, default duration 15 min.
        let (mut engine, state, pins) = engine_at(70.0, at(18, 10), FailSafe::HoldLast);
        engine.tick_once().await;

        assert!(state.lock().await.control.outputs.recording_active);
        assert!(pins.pins.lock().unwrap().0);

        engine.clock.0 = at(18, 20);
        engine.tick_once().await;

        assert!(!state.lock().await.control.outputs.recording_active);
        assert!(!pins.pins.lock().unwrap().0);
    }

    #[tokio::test]
    async fn test_recording_override_without_schedule_match() {
        let (mut engine, state, _) = engine_at(70.0, at(12, 30), FailSafe::HoldLast);

        state.lock().await.control.force_recording = true;
        engine.tick_once().await;

        assert!(state.lock().await.control.outputs.recording_active);
    }

    #[tokio::test]
    async fn test_fail_safe_force_off() {
        let (mut engine, state, pins) = engine_at(95.0, at(18, 5), FailSafe::ForceOff);

        engine.tick_once().await;
        assert!(state.lock().await.control.outputs.fan_active);

        engine.sensors.failing = true;
        engine.tick_once().await;

        let outputs = state.lock().await.control.outputs;
        assert!(!outputs.fan_active);
        assert!(!outputs.recording_active);

        let guard = pins.pins.lock().unwrap();
        assert!(!guard.0);
        assert!(!guard.1);
    }

    #[tokio::test]
    async fn test_fail_safe_hold_last() {
        let (mut engine, state, pins) = engine_at(95.0, at(18, 5), FailSafe::HoldLast);

        engine.tick_once().await;
        engine.sensors.failing = true;
        engine.tick_once().await;

        let outputs = state.lock().await.control.outputs;
        assert!(outputs.fan_active);
        assert!(outputs.recording_active);
        assert!(pins.pins.lock().unwrap().1);
    }

    #[tokio::test]
    async fn test_tick_observes_flag_updates_atomically() {
        // Temperature below threshold and no schedule match, so each output
        // mirrors its override flag exactly. A writer flips both flags
        // together under one lock; a tick racing it must land on one side
        // of that update, never between the two writes.
        let (mut engine, state, _) = engine_at(0.0, at(12, 30), FailSafe::HoldLast);

        let writer = {
            let state = state.clone();

            tokio::spawn(async move {
                for _ in 0..200 {
                    {
                        let mut guard = state.lock().await;
                        let on = !guard.control.force_fan;
                        guard.control.force_fan = on;
                        guard.control.force_recording = on;
                    }

                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            engine.tick_once().await;

            let outputs = state.lock().await.control.outputs;
            assert_eq!(outputs.fan_active, outputs.recording_active);
        }

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_commanded_fan_speed_reaches_actuator() {
        let (mut engine, state, pins) = engine_at(95.0, at(12, 0), FailSafe::HoldLast);

        state.lock().await.control.fan_speed = FanSpeed::High;
        engine.tick_once().await;

        assert_eq!(pins.pins.lock().unwrap().2, FanSpeed::High);
        assert_eq!(
            state.lock().await.control.outputs.fan_speed_level,
            FanSpeed::High
        );
    }
}
