use embedded_hal_async::i2c::{Error as _, I2c};
use log::{error, info, warn};

use super::{NonVolatileMemory, StorageError, check_bounds};

/// Default I2C address of an MB85RC FRAM (A0..A2 tied low).
pub const FRAM_I2C_ADDRESS: u8 = 0x50;

/// Size of the MB85RC256V, the part on the Adafruit breakout.
pub const MB85RC256V_CAPACITY: u32 = 32 * 1024;

/// Largest range reachable with the family's 16-bit memory address.
pub const MB85RC_MAX_CAPACITY: u32 = 0x1_0000;

/// Reserved slave ID used for the "Device ID" command (0xF8 as an 8-bit address).
const DEVICE_ID_ADDRESS: u8 = 0xF8 >> 1;

const MANUFACTURER_FUJITSU: u16 = 0x00A;
const MANUFACTURER_CYPRESS: u16 = 0x004;

/// Data bytes per I2C write frame.
const WRITE_CHUNK: usize = 32;

/// Manufacturer and product code reported by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub manufacturer: u16,
    pub product: u16,
}

impl DeviceId {
    fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            manufacturer: (u16::from(bytes[0]) << 4) | (u16::from(bytes[1]) >> 4),
            product: (u16::from(bytes[1] & 0x0F) << 8) | u16::from(bytes[2]),
        }
    }

    fn is_supported(&self) -> bool {
        matches!(
            self.manufacturer,
            MANUFACTURER_FUJITSU | MANUFACTURER_CYPRESS
        )
    }
}

/// I2C FRAM (MB85RC family, up to 64 KiB with 16-bit memory addresses).
///
/// FRAM writes complete at bus speed and survive ~10^12 cycles, so the same
/// record can be overwritten on every measurement without wear levelling.
pub struct Mb85rcFram<I> {
    i2c: I,
    address: u8,
    capacity: u32,
}

impl<I: I2c> Mb85rcFram<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self::with_capacity(i2c, address, MB85RC256V_CAPACITY)
    }

    /// `capacity` is capped at [`MB85RC_MAX_CAPACITY`].
    pub fn with_capacity(i2c: I, address: u8, capacity: u32) -> Self {
        if capacity > MB85RC_MAX_CAPACITY {
            warn!(
                "FRAM capacity {} exceeds 16-bit addressing, using {}",
                capacity, MB85RC_MAX_CAPACITY
            );
        }

        Self {
            i2c,
            address,
            capacity: capacity.min(MB85RC_MAX_CAPACITY),
        }
    }

    pub fn release(self) -> I {
        self.i2c
    }

    /// Read the 3-byte device ID.
    pub async fn device_id(&mut self) -> Result<DeviceId, StorageError> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(DEVICE_ID_ADDRESS, &[self.address << 1], &mut buf)
            .await
            .map_err(|e| {
                error!(
                    "FRAM device ID read at 0x{:02x} failed: {:?}",
                    self.address,
                    e.kind()
                );
                StorageError::NotFound {
                    address: self.address,
                }
            })?;

        Ok(DeviceId::from_bytes(buf))
    }
}

impl<I: I2c> NonVolatileMemory for Mb85rcFram<I> {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        let id = self.device_id().await?;

        if !id.is_supported() {
            error!(
                "Unexpected FRAM manufacturer 0x{:03x} (product 0x{:03x})",
                id.manufacturer, id.product
            );
            return Err(StorageError::UnknownDevice {
                manufacturer: id.manufacturer,
                product: id.product,
            });
        }

        info!(
            "FRAM Manufacturer ID: 0x{:03x}, Product ID: 0x{:03x}",
            id.manufacturer, id.product
        );
        Ok(())
    }

    async fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(address, buf.len(), self.capacity)?;
        if buf.is_empty() {
            return Ok(());
        }

        let memory_address = (address as u16).to_be_bytes();
        self.i2c
            .write_read(self.address, &memory_address, buf)
            .await
            .map_err(|e| StorageError::I2cError {
                operation: "read",
                kind: e.kind(),
            })
    }

    async fn write(&mut self, address: u32, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(address, data.len(), self.capacity)?;

        let mut frame = [0u8; 2 + WRITE_CHUNK];
        let mut memory_address = address;

        for chunk in data.chunks(WRITE_CHUNK) {
            frame[..2].copy_from_slice(&(memory_address as u16).to_be_bytes());
            frame[2..2 + chunk.len()].copy_from_slice(chunk);

            self.i2c
                .write(self.address, &frame[..2 + chunk.len()])
                .await
                .map_err(|e| StorageError::I2cError {
                    operation: "write",
                    kind: e.kind(),
                })?;

            memory_address += chunk.len() as u32;
        }

        Ok(())
    }
}
