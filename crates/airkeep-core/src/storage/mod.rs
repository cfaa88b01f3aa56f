//! Non-volatile storage for the single persisted [`SensorReading`] record.
//!
//! The storage model is deliberately minimal: one fixed-size record at one
//! fixed address, overwritten in full on every successful measurement. There is
//! no journal or checksum; a record torn by power loss is caught on the next
//! boot by the plausibility check in [`crate::reading`].

pub mod fram;
pub mod ram;

pub use fram::*;
pub use ram::RamStorage;

use embedded_hal_async::i2c::ErrorKind;
use log::debug;
use thiserror_no_std::Error;

use crate::reading::{RECORD_SIZE, SensorReading};

/// Address of the record in non-volatile memory unless configured otherwise.
pub const DEFAULT_RECORD_ADDRESS: u32 = 0;

/// Errors reported by a [`NonVolatileMemory`] device.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Nothing answered the device ID request
    #[error("no storage device responding at I2C address 0x{address:02x}")]
    NotFound { address: u8 },

    #[error("unsupported storage device (manufacturer 0x{manufacturer:03x}, product 0x{product:03x})")]
    UnknownDevice { manufacturer: u16, product: u16 },

    #[error("I2C error during storage {operation}: {kind}")]
    I2cError {
        operation: &'static str,
        kind: ErrorKind,
    },

    #[error("{len} bytes at 0x{address:04x} exceed storage capacity of {capacity} bytes")]
    OutOfBounds {
        address: u32,
        len: usize,
        capacity: u32,
    },

    #[error("write at 0x{address:04x} was not accepted by the device")]
    WriteFailed { address: u32 },
}

/// Byte-addressable memory that keeps its contents across power cycles.
///
/// Writes are assumed durable once they return. No atomicity is promised
/// beyond what the device itself offers.
pub trait NonVolatileMemory {
    /// Size of the addressable range in bytes.
    fn capacity(&self) -> u32;

    /// Probe the device. Called once at boot before any read or write.
    fn init(&mut self) -> impl Future<Output = Result<(), StorageError>> {
        async { Ok(()) }
    }

    fn read(
        &mut self,
        address: u32,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), StorageError>>;

    fn write(&mut self, address: u32, data: &[u8])
    -> impl Future<Output = Result<(), StorageError>>;
}

/// Reject accesses that would run past the end of the device.
pub fn check_bounds(address: u32, len: usize, capacity: u32) -> Result<(), StorageError> {
    let end = u64::from(address) + len as u64;
    if end > u64::from(capacity) {
        return Err(StorageError::OutOfBounds {
            address,
            len,
            capacity,
        });
    }
    Ok(())
}

/// Single-record store on top of a [`NonVolatileMemory`].
pub struct PersistentStore<M> {
    memory: M,
    record_address: u32,
}

impl<M: NonVolatileMemory> PersistentStore<M> {
    pub const fn new(memory: M, record_address: u32) -> Self {
        Self {
            memory,
            record_address,
        }
    }

    /// Probe the underlying device.
    pub async fn init(&mut self) -> Result<(), StorageError> {
        self.memory.init().await
    }

    /// Read exactly one record's worth of bytes from `address`.
    pub async fn read_record(&mut self, address: u32) -> Result<[u8; RECORD_SIZE], StorageError> {
        let mut record = [0u8; RECORD_SIZE];
        self.memory.read(address, &mut record).await?;
        Ok(record)
    }

    /// Overwrite one record at `address`.
    pub async fn write_record(
        &mut self,
        address: u32,
        record: &[u8; RECORD_SIZE],
    ) -> Result<(), StorageError> {
        self.memory.write(address, record).await
    }

    /// Decode whatever is stored at the record address.
    ///
    /// The result may be implausible; callers decide what that means.
    pub async fn load(&mut self) -> Result<SensorReading, StorageError> {
        let record = self.read_record(self.record_address).await?;
        Ok(SensorReading::from_bytes(&record))
    }

    /// Replace the stored record with `reading`.
    pub async fn save(&mut self, reading: &SensorReading) -> Result<(), StorageError> {
        self.write_record(self.record_address, &reading.to_bytes())
            .await?;
        debug!("Record written at 0x{:04x}", self.record_address);
        Ok(())
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Give back the underlying memory.
    pub fn release(self) -> M {
        self.memory
    }
}
