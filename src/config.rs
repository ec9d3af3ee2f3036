use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::defs::TimeOfDay;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub policy: PolicyConfig,
    pub schedule: ScheduleConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Per-read idle timeout on session I/O, in seconds.
    pub idle_timeout_s: u64,
    /// Initial delay before retrying a failed accept, in milliseconds.
    pub accept_backoff_ms: u64,
    /// Upper bound on the accept retry delay, in milliseconds.
    pub max_backoff_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub tick_interval_ms: u64,
    pub fail_safe: FailSafe,
}

/// What the policy engine does with its outputs when a sensor or clock
/// read fails mid-tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailSafe {
    /// Keep driving the last known good outputs.
    #[default]
    HoldLast,
    /// Drive both loads off until readings recover.
    ForceOff,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub capacity: usize,
    pub entries: Vec<TimeOfDay>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub fan_threshold_f: f32,
    pub on_duration_min: u32,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let data = fs::read(path)
            .await
            .wrap_err_with(|| format!("Failed to read config file {path}"))?;

        serde_yaml::from_slice(&data).wrap_err_with(|| format!("Failed to parse {path}"))
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_s)
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl PolicyConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            idle_timeout_s: 300,
            accept_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            fail_safe: FailSafe::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        // The stock observing schedule shipped with the enclosure.
        let entries = [(18, 0), (23, 0), (0, 0), (1, 0), (2, 0)]
            .into_iter()
            .filter_map(|(hour, minute)| TimeOfDay::new(hour, minute, 0))
            .collect();

        Self {
            capacity: 5,
            entries,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            fan_threshold_f: 90.0,
            on_duration_min: 15,
        }
    }
}
