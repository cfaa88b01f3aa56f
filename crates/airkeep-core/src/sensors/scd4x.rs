use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{Error as _, ErrorKind, I2c};
use log::{debug, error, info, warn};
use scd4x::Scd4xAsync;

use super::{SensorError, SensorSource};
use crate::reading::SensorReading;

/// I2C address of the SCD40/SCD41. Fixed in silicon.
pub const SCD4X_I2C_ADDRESS: u8 = 0x62;

const SENSOR_NAME: &str = "SCD4x";

const WAKE_UP: u16 = 0x36F6;
const WAKE_UP_MS: u32 = 30;

/// SCD40/SCD41 sensor on top of the `scd4x` driver.
///
/// The driver owns one handle to the bus. A second handle is kept for
/// `wake_up`, which the sensor never acknowledges.
pub struct SCD4xSensor<I, D> {
    sensor: Scd4xAsync<I, D>,
    i2c: I,
    delay: D,
}

impl<I, D> SCD4xSensor<I, D>
where
    I: I2c + Clone,
    D: DelayNs + Clone,
{
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: Scd4xAsync::new(i2c.clone(), delay.clone()),
            i2c,
            delay,
        }
    }
}

fn driver_error<E: embedded_hal_async::i2c::Error>(
    operation: &'static str,
) -> impl FnOnce(scd4x::Error<E>) -> SensorError {
    move |e| {
        let err = match e {
            scd4x::Error::I2c(e) => SensorError::I2cError {
                sensor: SENSOR_NAME,
                operation,
                kind: e.kind(),
            },
            scd4x::Error::Crc => SensorError::CrcMismatch {
                sensor: SENSOR_NAME,
                operation,
            },
            _ => SensorError::CommandFailed {
                sensor: SENSOR_NAME,
                operation,
            },
        };
        error!("{}", err);
        err
    }
}

impl<I, D> SensorSource for SCD4xSensor<I, D>
where
    I: I2c + Clone,
    D: DelayNs + Clone,
{
    async fn wake(&mut self) -> Result<(), SensorError> {
        match self.i2c.write(SCD4X_I2C_ADDRESS, &WAKE_UP.to_be_bytes()).await {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => {
                debug!("{}: wake_up not acknowledged (expected)", SENSOR_NAME);
            }
            Err(e) => {
                let kind = e.kind();
                error!("{} wake_up failed: {:?}", SENSOR_NAME, kind);
                return Err(SensorError::I2cError {
                    sensor: SENSOR_NAME,
                    operation: "wake up",
                    kind,
                });
            }
        }

        self.delay.delay_ms(WAKE_UP_MS).await;
        info!("{}: awake", SENSOR_NAME);
        Ok(())
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sensor
            .stop_periodic_measurement()
            .await
            .map_err(driver_error("stop periodic measurement"))
    }

    async fn reinit(&mut self) -> Result<(), SensorError> {
        self.sensor.reinit().await.map_err(driver_error("reinit"))
    }

    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sensor
            .start_periodic_measurement()
            .await
            .map_err(driver_error("start periodic measurement"))?;

        info!("{}: periodic measurement started", SENSOR_NAME);
        Ok(())
    }

    async fn is_data_ready(&mut self) -> Result<bool, SensorError> {
        self.sensor
            .data_ready_status()
            .await
            .map_err(driver_error("get data ready status"))
    }

    async fn read_measurement(&mut self) -> Result<SensorReading, SensorError> {
        let data = self
            .sensor
            .measurement()
            .await
            .map_err(driver_error("read measurement"))?;

        if data.co2 == 0 {
            warn!("{}: measurement reported 0 ppm", SENSOR_NAME);
        }

        Ok(SensorReading::new(data.co2, data.temperature, data.humidity))
    }
}
