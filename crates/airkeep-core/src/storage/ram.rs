use embedded_hal_async::i2c::ErrorKind;

use super::{NonVolatileMemory, StorageError, check_bounds};

/// In-memory stand-in for an FRAM chip.
///
/// Used by the simulator (backed by an image file) and by tests. It can
/// pretend to be missing from the bus, or answer but fail reads or writes.
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
    present: bool,
    fail_reads: bool,
    fail_writes: bool,
    writes: u32,
}

impl<const N: usize> RamStorage<N> {
    /// Zero-filled memory, as a factory-fresh FRAM reads back.
    pub const fn new() -> Self {
        Self::from_image([0; N])
    }

    pub const fn from_image(bytes: [u8; N]) -> Self {
        Self {
            bytes,
            present: true,
            fail_reads: false,
            fail_writes: false,
            writes: 0,
        }
    }

    /// A device that never answers.
    pub const fn unplugged() -> Self {
        let mut storage = Self::new();
        storage.present = false;
        storage
    }

    /// Keep answering `init` but fail every read on the bus.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn image(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Put bytes back as they were, without counting a write.
    pub fn restore(&mut self, address: u32, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(address, data.len(), self.capacity())?;
        let start = address as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Number of accepted writes since creation.
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    fn ensure_present(&self) -> Result<(), StorageError> {
        if self.present {
            Ok(())
        } else {
            Err(StorageError::NotFound {
                address: super::FRAM_I2C_ADDRESS,
            })
        }
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NonVolatileMemory for RamStorage<N> {
    fn capacity(&self) -> u32 {
        N as u32
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        self.ensure_present()
    }

    async fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.ensure_present()?;
        check_bounds(address, buf.len(), self.capacity())?;
        if self.fail_reads {
            return Err(StorageError::I2cError {
                operation: "read",
                kind: ErrorKind::Bus,
            });
        }

        let start = address as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    async fn write(&mut self, address: u32, data: &[u8]) -> Result<(), StorageError> {
        self.ensure_present()?;
        check_bounds(address, data.len(), self.capacity())?;
        if self.fail_writes {
            return Err(StorageError::WriteFailed { address });
        }

        let start = address as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
