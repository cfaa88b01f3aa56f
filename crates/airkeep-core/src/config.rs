use serde::{Deserialize, Serialize};

use crate::storage::{DEFAULT_RECORD_ADDRESS, FRAM_I2C_ADDRESS, MB85RC256V_CAPACITY};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Where the single record lives in FRAM
    pub record_address: u32,
    pub bus: BusConfig,
    pub timing: TimingConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            record_address: DEFAULT_RECORD_ADDRESS,
            bus: BusConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    pub frequency_khz: u32,
    pub storage_address: u8,
    pub storage_capacity: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frequency_khz: 100,
            storage_address: FRAM_I2C_ADDRESS,
            storage_capacity: MB85RC256V_CAPACITY,
        }
    }
}

/// Delays of the startup sequence and the logging loop, in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait at the top of every cycle, matching the sensor's 5 s cadence loosely
    pub read_interval_ms: u32,
    /// Wait after a successful write, throttling FRAM writes
    pub write_interval_ms: u32,
    /// Backoff between readiness polls
    pub ready_poll_ms: u32,
    /// Warm-up pause after reinit, before periodic measurement starts
    pub settle_ms: u32,
    /// Give up on a cycle after this many negative readiness polls.
    /// `None` polls until the sensor is ready.
    pub max_ready_polls: Option<u32>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: 3000,
            write_interval_ms: 2000,
            ready_poll_ms: 100,
            settle_ms: 1500,
            max_ready_polls: None,
        }
    }
}
