mod scd4x;

pub use scd4x::*;

use embedded_hal_async::i2c::ErrorKind;
use thiserror_no_std::Error;

use crate::reading::SensorReading;

/// Errors reported by a [`SensorSource`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: I2C error during {operation}: {kind}")]
    I2cError {
        sensor: &'static str,
        operation: &'static str,
        kind: ErrorKind,
    },

    #[error("{sensor}: CRC mismatch in {operation} response")]
    CrcMismatch {
        sensor: &'static str,
        operation: &'static str,
    },

    /// The driver refused the command or the sensor reported a failure
    #[error("{sensor}: {operation} failed")]
    CommandFailed {
        sensor: &'static str,
        operation: &'static str,
    },

    #[error("{sensor}: data not ready after {polls} polls")]
    Timeout { sensor: &'static str, polls: u32 },

    #[error("{sensor}: periodic measurement is not running")]
    NotSampling { sensor: &'static str },
}

/// Trait for sensors that buffer measurements in a periodic sampling mode.
///
/// Lifecycle: `wake` → `stop_periodic_measurement` → `reinit` →
/// `start_periodic_measurement`, then any number of `is_data_ready` /
/// `read_measurement` pairs. `read_measurement` must only be called after
/// `is_data_ready` returned `true`.
pub trait SensorSource {
    /// Wake the sensor from power-down. The sensor is unusable if this fails.
    fn wake(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Leave periodic sampling mode. Fails harmlessly if already stopped.
    fn stop_periodic_measurement(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Reload the sensor's settings from its own EEPROM.
    fn reinit(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    fn start_periodic_measurement(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Non-blocking check for a buffered measurement.
    fn is_data_ready(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Consume the buffered measurement.
    fn read_measurement(&mut self) -> impl Future<Output = Result<SensorReading, SensorError>>;
}
