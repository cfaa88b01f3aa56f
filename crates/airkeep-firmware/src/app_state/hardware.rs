//! Hardware initialization for the airkeep logger
//!
//! Brings up the I2C bus and hands each peripheral driver its own handle to
//! it. Transport comes first, then storage and sensor drivers, which is the
//! order the controller expects them to be usable in.

use airkeep_core::async_i2c_bus::SharedI2cDevice;
use airkeep_core::config::BusConfig;
use airkeep_core::sensors::SCD4xSensor;
use airkeep_core::storage::Mb85rcFram;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::time::Rate;
use log::info;
use static_cell::StaticCell;

pub type I2cBus = I2c<'static, esp_hal::Async>;

pub type SharedI2c = SharedI2cDevice<'static, CriticalSectionRawMutex, I2cBus>;

/// Drivers for everything on the I2C bus
pub struct LoggerHardware {
    pub sensor: SCD4xSensor<SharedI2c, embassy_time::Delay>,
    pub fram: Mb85rcFram<SharedI2c>,
}

/// Create the I2C peripheral on the ESP32-S3 default pins (SDA 8, SCL 9).
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO8<'static>,
    scl: esp_hal::peripherals::GPIO9<'static>,
    frequency_khz: u32,
) -> Result<I2cBus, ConfigError> {
    let i2c = I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(frequency_khz)),
    )?
    .with_sda(sda)
    .with_scl(scl)
    .into_async();

    Ok(i2c)
}

/// Share the bus between the SCD4x and the FRAM.
///
/// Must be called once; the bus lives in a static for the rest of the program.
pub fn init_i2c_hardware(i2c0: I2cBus, bus: &BusConfig) -> LoggerHardware {
    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, I2cBus>> = StaticCell::new();
    let i2c0_bus = I2C0_BUS.init(AsyncMutex::new(i2c0));

    info!("I2C bus initialized ({} kHz)", bus.frequency_khz);

    let fram = Mb85rcFram::with_capacity(
        SharedI2cDevice::new(i2c0_bus),
        bus.storage_address,
        bus.storage_capacity,
    );
    let sensor = SCD4xSensor::new(SharedI2cDevice::new(i2c0_bus), embassy_time::Delay);

    LoggerHardware { sensor, fram }
}
