use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;

pub mod control;
pub mod schedule;

pub use control::ControlState;
pub use schedule::ScheduleTable;

/// The shared state both long-lived tasks operate on.
///
/// A single lock guards the schedule and the control knobs together so a
/// policy tick always observes them as one consistent snapshot, and so no
/// protocol mutation is ever visible half-applied.
#[derive(Debug)]
pub struct StationState {
    pub schedule: ScheduleTable,
    pub control: ControlState,
}

pub type SharedState = Arc<Mutex<StationState>>;

impl StationState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schedule: ScheduleTable::with_entries(
                config.schedule.capacity,
                &config.schedule.entries,
            ),
            control: ControlState::new(config.control.fan_threshold_f, config.control.on_duration_min),
        }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }
}
