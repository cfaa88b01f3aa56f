//! The persisted sensor snapshot.
//!
//! Implements the fixed record layout stored in FRAM:
//! - SensorReading: 10 bytes, no header, no checksum, no version
//!
//! Binary format (little-endian):
//! - co2: 2 bytes (u16, ppm)
//! - temperature: 4 bytes (f32, °C)
//! - humidity: 4 bytes (f32, %RH)

/// Size of one encoded [`SensorReading`] record in bytes.
pub const RECORD_SIZE: usize = 10;

/// Upper bound (exclusive) of a CO2 value we are willing to trust, in ppm.
pub const CO2_PLAUSIBLE_MAX_PPM: f32 = 10_000.0;

/// Returns `true` if a CO2 value is physically sensible.
///
/// The value must not be the NaN sentinel and must lie in `(0, 10000)` ppm.
/// Uninitialized FRAM (all zero, all `0xFF`) and interrupted writes fail this
/// check, which is how "no valid previous data" is detected on boot.
pub fn is_plausible_co2(ppm: f32) -> bool {
    !ppm.is_nan() && ppm > 0.0 && ppm < CO2_PLAUSIBLE_MAX_PPM
}

/// One CO2/temperature/humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub co2_ppm: u16,
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}

impl SensorReading {
    pub const fn new(co2_ppm: u16, temperature_celsius: f32, humidity_percent: f32) -> Self {
        Self {
            co2_ppm,
            temperature_celsius,
            humidity_percent,
        }
    }

    /// Whether this reading may be persisted or reported as recovered state.
    pub fn is_plausible(&self) -> bool {
        is_plausible_co2(f32::from(self.co2_ppm))
    }

    /// Returns the size of the encoded record in bytes (10).
    pub const fn size() -> usize {
        RECORD_SIZE
    }

    /// Converts the reading to its storage record.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];

        bytes[0..2].copy_from_slice(&self.co2_ppm.to_le_bytes());
        bytes[2..6].copy_from_slice(&self.temperature_celsius.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.humidity_percent.to_le_bytes());

        bytes
    }

    /// Decodes a storage record.
    ///
    /// Decoding never fails: garbage decodes to a reading that is rejected by
    /// [`SensorReading::is_plausible`].
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let co2_ppm = u16::from_le_bytes([bytes[0], bytes[1]]);
        let temperature_celsius = f32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let humidity_percent = f32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

        Self {
            co2_ppm,
            temperature_celsius,
            humidity_percent,
        }
    }
}

impl core::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} ppm, {:.2} C, {:.2} %",
            self.co2_ppm, self.temperature_celsius, self.humidity_percent
        )
    }
}
