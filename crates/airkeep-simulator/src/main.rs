//! Desktop simulator for the airkeep CO2 logger.
//!
//! Drives the real `airkeep-core` controller against a synthetic SCD4x and an
//! FRAM image kept in a file, so power-on recovery can be watched across
//! several simulated boots without hardware.
//!
//! # Environment
//!
//! | Variable               | Meaning                                        |
//! |------------------------|------------------------------------------------|
//! | `AIRKEEP_CONFIG`       | JSON file overriding [`LoggerConfig`] fields   |
//! | `AIRKEEP_FRAM_IMAGE`   | FRAM image path (default `airkeep-fram.bin`)   |
//! | `AIRKEEP_BOOTS`        | Number of simulated power cycles (default 2)   |
//! | `AIRKEEP_RUN_SECS`     | Wall-clock seconds per boot (default 3)        |
//! | `RUST_LOG`             | `env_logger` filter (default `info`)           |
//!
//! Simulated time runs [`TIME_SCALE`] times faster than wall-clock time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::ErrorKind;
use log::{info, warn};

use airkeep_core::sensors::{SensorError, SensorSource};
use airkeep_core::storage::{MB85RC256V_CAPACITY, NonVolatileMemory, RamStorage, StorageError};
use airkeep_core::{Controller, LoggerConfig, Recovery, SensorReading};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Simulated milliseconds per wall-clock millisecond.
const TIME_SCALE: u64 = 100;

const FRAM_SIZE: usize = MB85RC256V_CAPACITY as usize;

const DEFAULT_FRAM_IMAGE: &str = "airkeep-fram.bin";

/// Every n-th measurement reads back as 0 ppm, like a sensor glitch.
const GLITCH_EVERY: u32 = 7;

/// Every n-th readiness poll fails on the bus.
const BUS_FAULT_EVERY: u32 = 23;

/// Negative readiness polls after each measurement.
const NOT_READY_POLLS: u32 = 2;

// ---------------------------------------------------------------------------
// Synthetic sensor
// ---------------------------------------------------------------------------

/// SCD4x stand-in producing slowly varying indoor-air values.
struct SimulatedScd4x {
    sampling: bool,
    measurements: u32,
    polls: u32,
    pending_not_ready: u32,
}

impl SimulatedScd4x {
    fn new() -> Self {
        Self {
            sampling: false,
            measurements: 0,
            polls: 0,
            pending_not_ready: NOT_READY_POLLS,
        }
    }

    fn bus_fault(operation: &'static str) -> SensorError {
        SensorError::I2cError {
            sensor: "SCD4x (simulated)",
            operation,
            kind: ErrorKind::Bus,
        }
    }

    fn next_sample(&mut self) -> SensorReading {
        self.measurements += 1;
        // One measurement per 5 s sensor period
        let t = f64::from(self.measurements) * 5.0;

        if self.measurements % GLITCH_EVERY == 0 {
            return SensorReading::new(0, 0.0, 0.0);
        }

        // CO₂: 450–1050 ppm over a ~20 min cycle, rising with occupancy
        let co2 = 750.0 + 300.0 * (t / 200.0).sin() + 25.0 * (t / 31.0).cos();
        // Temperature: 21–25 °C
        let temperature = 23.0 + 2.0 * (t / 600.0).sin() + 0.2 * (t / 47.0).cos();
        // Humidity: 35–55 %
        let humidity = 45.0 + 10.0 * (t / 900.0).cos() + 1.0 * (t / 29.0).sin();

        SensorReading::new(co2.round() as u16, temperature as f32, humidity as f32)
    }
}

impl SensorSource for SimulatedScd4x {
    async fn wake(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sampling = false;
        Ok(())
    }

    async fn reinit(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sampling = true;
        Ok(())
    }

    async fn is_data_ready(&mut self) -> Result<bool, SensorError> {
        self.polls += 1;
        if self.polls % BUS_FAULT_EVERY == 0 {
            return Err(Self::bus_fault("data_ready"));
        }

        if !self.sampling || self.pending_not_ready > 0 {
            self.pending_not_ready = self.pending_not_ready.saturating_sub(1);
            return Ok(false);
        }
        Ok(true)
    }

    async fn read_measurement(&mut self) -> Result<SensorReading, SensorError> {
        if !self.sampling {
            return Err(Self::bus_fault("read_measurement"));
        }
        self.pending_not_ready = NOT_READY_POLLS;
        Ok(self.next_sample())
    }
}

// ---------------------------------------------------------------------------
// File-backed FRAM
// ---------------------------------------------------------------------------

/// FRAM whose contents survive the simulator process.
///
/// Every accepted write is flushed to the image file, so killing the
/// simulator mid-run behaves like pulling the power.
struct FileBackedFram {
    path: PathBuf,
    memory: RamStorage<FRAM_SIZE>,
}

impl FileBackedFram {
    fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let memory = match std::fs::read(&path) {
            Ok(bytes) => {
                let image: [u8; FRAM_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
                    anyhow!(
                        "{} is {} bytes, expected an image of {} bytes",
                        path.display(),
                        b.len(),
                        FRAM_SIZE
                    )
                })?;
                info!("Loaded FRAM image from {}", path.display());
                RamStorage::from_image(image)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No FRAM image at {}, starting blank", path.display());
                RamStorage::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };

        Ok(Self { path, memory })
    }

    fn flush(&self) -> std::io::Result<()> {
        std::fs::write(&self.path, self.memory.image())
    }

    /// Write to memory and the image file, or to neither.
    async fn write_through(&mut self, address: u32, data: &[u8]) -> Result<(), StorageError> {
        let mut previous = vec![0u8; data.len()];
        self.memory.read(address, &mut previous).await?;

        self.memory.write(address, data).await?;
        if let Err(e) = self.flush() {
            warn!("Could not flush FRAM image {}: {}", self.path.display(), e);
            self.memory.restore(address, &previous)?;
            return Err(StorageError::WriteFailed { address });
        }
        Ok(())
    }
}

impl NonVolatileMemory for FileBackedFram {
    fn capacity(&self) -> u32 {
        self.memory.capacity()
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        self.memory.init().await
    }

    async fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.memory.read(address, buf).await
    }

    async fn write(&mut self, address: u32, data: &[u8]) -> Result<(), StorageError> {
        self.write_through(address, data).await
    }
}

// ---------------------------------------------------------------------------
// Host time
// ---------------------------------------------------------------------------

/// Blocking delay that compresses simulated time by [`TIME_SCALE`].
#[derive(Clone, Copy)]
struct HostDelay;

impl DelayNs for HostDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns) / TIME_SCALE));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn load_config() -> anyhow::Result<LoggerConfig> {
    match std::env::var_os("AIRKEEP_CONFIG") {
        Some(path) => {
            let path = Path::new(&path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config = serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(LoggerConfig::default()),
    }
}

fn env_number(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a number, got {value:?}")),
        Err(_) => Ok(default),
    }
}

/// One power-on: boot, log until `run_secs` elapse, then drop everything.
fn simulate_boot(
    boot: u64,
    config: LoggerConfig,
    fram_image: &Path,
    run_secs: u64,
) -> anyhow::Result<()> {
    info!("=== Boot {} ===", boot);

    let fram = FileBackedFram::open(fram_image)?;
    let mut controller = Controller::new(SimulatedScd4x::new(), fram, HostDelay, config);

    let recovery = block_on(controller.start()).map_err(|e| anyhow!("fatal: {e}"))?;
    if let Recovery::Recovered(reading) = recovery {
        info!("Boot {} resumed from {}", boot, reading);
    }

    let shutdown = Arc::new(Signal::<CriticalSectionRawMutex, ()>::new());
    let timer = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(run_secs));
            shutdown.signal(());
        })
    };

    let stats = block_on(controller.run(&*shutdown));
    timer
        .join()
        .map_err(|_| anyhow!("shutdown timer thread panicked"))?;

    info!(
        "Boot {}: {} logged, {} rejected, {} sensor faults, {} storage faults, {} skipped",
        boot,
        stats.logged,
        stats.rejected,
        stats.sensor_faults,
        stats.storage_faults,
        stats.skipped
    );
    if let Some(reading) = controller.last_reading() {
        info!("Last record on \"power loss\": {}", reading);
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let fram_image = std::env::var_os("AIRKEEP_FRAM_IMAGE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAM_IMAGE));
    let boots = env_number("AIRKEEP_BOOTS", 2)?;
    let run_secs = env_number("AIRKEEP_RUN_SECS", 3)?;

    info!("airkeep simulator (time x{})", TIME_SCALE);

    for boot in 1..=boots {
        simulate_boot(boot, config, &fram_image, run_secs)?;
    }

    Ok(())
}
