//! Application-wide state and error types for airkeep

use thiserror_no_std::Error;

use crate::sensors::SensorError;
use crate::storage::StorageError;

/// Where the sensor is in its startup lifecycle, as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Awake,
    /// Periodic measurement stopped (or assumed stopped)
    Idle,
    Reinitialized,
    PeriodicSampling,
    /// Starting periodic measurement failed; cycles are skipped
    Degraded,
}

impl RunState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Awake => "awake",
            Self::Idle => "idle",
            Self::Reinitialized => "reinitialized",
            Self::PeriodicSampling => "sampling",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(StorageError),
    #[error("Sensor fault: {0}")]
    SensorFault(SensorError),
    #[error("Invalid reading: {co2_ppm} ppm is outside the plausible range")]
    ReadInvalid { co2_ppm: u16 },
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        Self::StorageUnavailable(value)
    }
}

impl From<SensorError> for AppError {
    fn from(value: SensorError) -> Self {
        Self::SensorFault(value)
    }
}
