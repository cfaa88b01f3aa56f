//! Power-on recovery and the read/validate/persist loop.
//!
//! The [`Controller`] owns the sensor, the store and the delay source. Nothing
//! is global, so tests drive it with scripted doubles and a delay that only
//! records what it was asked to wait.
//!
//! ## Startup ([`Controller::start`])
//!
//! 1. Probe storage (fatal on failure)
//! 2. Wake the sensor (fatal), stop periodic measurement and reinit (best effort)
//! 3. Recover the persisted record and report it if plausible
//! 4. Let the sensor settle
//! 5. Start periodic measurement, or fall back to [`RunState::Degraded`]
//!
//! ## Cycle ([`Controller::run_cycle`])
//!
//! wait → poll readiness (with backoff) → read → validate → write → wait.
//! Any fault ends the cycle early and storage is left untouched: the record is
//! only ever overwritten by a reading that passed the plausibility check.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::app_state::{AppError, RunState};
use crate::config::LoggerConfig;
use crate::reading::SensorReading;
use crate::sensors::{SensorError, SensorSource};
use crate::storage::{NonVolatileMemory, PersistentStore, StorageError};

/// Outcome of the boot-time recovery read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recovery {
    /// A plausible record was found
    Recovered(SensorReading),
    /// Storage held nothing usable (fresh, garbage, or unreadable)
    NoValidData,
}

/// Per-outcome cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Readings validated and written to storage
    pub logged: u32,
    /// Readings discarded by the plausibility check
    pub rejected: u32,
    pub sensor_faults: u32,
    pub storage_faults: u32,
    /// Cycles skipped because periodic measurement never started
    pub skipped: u32,
}

impl CycleStats {
    pub fn total(&self) -> u32 {
        self.logged + self.rejected + self.sensor_faults + self.storage_faults + self.skipped
    }
}

pub struct Controller<S, M, D> {
    sensor: S,
    store: PersistentStore<M>,
    delay: D,
    config: LoggerConfig,
    state: RunState,
    last_reading: Option<SensorReading>,
    stats: CycleStats,
}

impl<S, M, D> Controller<S, M, D>
where
    S: SensorSource,
    M: NonVolatileMemory,
    D: DelayNs,
{
    pub fn new(sensor: S, memory: M, delay: D, config: LoggerConfig) -> Self {
        Self {
            sensor,
            store: PersistentStore::new(memory, config.record_address),
            delay,
            config,
            state: RunState::Uninitialized,
            last_reading: None,
            stats: CycleStats::default(),
        }
    }

    /// Run the startup sequence.
    ///
    /// Returns an error only for the fatal conditions: storage missing or the
    /// sensor refusing to wake. A failure to start periodic measurement is
    /// not fatal; the controller is then [`RunState::Degraded`].
    pub async fn start(&mut self) -> Result<Recovery, AppError> {
        self.store.init().await.map_err(|e| {
            error!("Could not find a valid FRAM chip: {}", e);
            AppError::from(e)
        })?;
        info!("FRAM initialized");

        self.sensor.wake().await.map_err(|e| {
            error!("Error executing wake(): {}", e);
            AppError::from(e)
        })?;
        self.state = RunState::Awake;

        if let Err(e) = self.sensor.stop_periodic_measurement().await {
            warn!("Error trying to execute stop_periodic_measurement(): {}", e);
        }
        self.state = RunState::Idle;

        if let Err(e) = self.sensor.reinit().await {
            warn!("Error trying to execute reinit(): {}", e);
        }
        self.state = RunState::Reinitialized;
        info!("SCD4x sensor initialized");

        let recovery = self.recover().await;

        self.delay.delay_ms(self.config.timing.settle_ms).await;

        match self.sensor.start_periodic_measurement().await {
            Ok(()) => {
                self.state = RunState::PeriodicSampling;
                info!("Starting real-time CO2 measurement and logging...");
            }
            Err(e) => {
                self.state = RunState::Degraded;
                error!(
                    "Error trying to execute start_periodic_measurement(): {}",
                    e
                );
                warn!("Logger is {}; cycles will be skipped", self.state.label());
            }
        }

        Ok(recovery)
    }

    /// Read the persisted record and decide whether it is usable.
    pub async fn recover(&mut self) -> Recovery {
        let reading = match self.store.load().await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Failed to read last record: {}", e);
                info!("No valid previous data found in FRAM.");
                return Recovery::NoValidData;
            }
        };

        if reading.is_plausible() {
            info!("-------------------------------------------");
            info!(">> Recovered last known values: {}", reading);
            info!("-------------------------------------------");
            self.last_reading = Some(reading);
            Recovery::Recovered(reading)
        } else {
            info!("No valid previous data found in FRAM.");
            Recovery::NoValidData
        }
    }

    /// Run one logging cycle and fold its outcome into [`CycleStats`].
    ///
    /// The reading is only written when it was read without fault and passed
    /// the plausibility check.
    pub async fn run_cycle(&mut self) -> Result<SensorReading, AppError> {
        let result = self.cycle().await;

        match &result {
            Ok(_) => self.stats.logged += 1,
            Err(AppError::ReadInvalid { .. }) => self.stats.rejected += 1,
            Err(AppError::StorageUnavailable(_)) => self.stats.storage_faults += 1,
            Err(AppError::SensorFault(SensorError::NotSampling { .. })) => self.stats.skipped += 1,
            Err(AppError::SensorFault(_)) => self.stats.sensor_faults += 1,
        }

        result
    }

    /// Repeat [`Controller::run_cycle`] until `shutdown` is signaled.
    ///
    /// The signal is checked between cycles; a cycle in progress always
    /// finishes.
    pub async fn run<R: RawMutex>(&mut self, shutdown: &Signal<R, ()>) -> CycleStats {
        while !shutdown.signaled() {
            // Errors are logged inside the cycle and never end the loop
            let _ = self.run_cycle().await;
        }

        info!(
            "Logging stopped after {} cycles ({} logged)",
            self.stats.total(),
            self.stats.logged
        );
        self.stats
    }

    async fn cycle(&mut self) -> Result<SensorReading, AppError> {
        self.delay.delay_ms(self.config.timing.read_interval_ms).await;

        if self.state != RunState::PeriodicSampling {
            return Err(SensorError::NotSampling { sensor: "SCD4x" }.into());
        }

        self.wait_for_data_ready().await.map_err(|e| {
            error!("Error trying to execute is_data_ready(): {}", e);
            AppError::from(e)
        })?;

        let reading = self.sensor.read_measurement().await.map_err(|e| {
            error!("Error trying to execute read_measurement(): {}", e);
            AppError::from(e)
        })?;

        if !reading.is_plausible() {
            warn!("Failed to read CO2 from SCD4x sensor! ({})", reading);
            return Err(AppError::ReadInvalid {
                co2_ppm: reading.co2_ppm,
            });
        }

        self.persist(&reading).await?;

        self.delay
            .delay_ms(self.config.timing.write_interval_ms)
            .await;

        Ok(reading)
    }

    /// Poll readiness until the sensor has a measurement buffered.
    ///
    /// Returns the number of negative polls (each followed by one backoff
    /// delay). Unbounded unless `max_ready_polls` is configured.
    async fn wait_for_data_ready(&mut self) -> Result<u32, SensorError> {
        let mut polls = 0;

        while !self.sensor.is_data_ready().await? {
            if let Some(max) = self.config.timing.max_ready_polls {
                if polls >= max {
                    return Err(SensorError::Timeout {
                        sensor: "SCD4x",
                        polls,
                    });
                }
            }

            self.delay.delay_ms(self.config.timing.ready_poll_ms).await;
            polls += 1;
        }

        Ok(polls)
    }

    async fn persist(&mut self, reading: &SensorReading) -> Result<(), StorageError> {
        info!("Logging CO2, temperature, humidity: {}", reading);

        self.store.save(reading).await.map_err(|e| {
            error!("Failed to write record to FRAM: {}", e);
            e
        })?;

        info!("Data written to FRAM");
        self.last_reading = Some(*reading);
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Most recent plausible reading, recovered or freshly logged.
    pub fn last_reading(&self) -> Option<SensorReading> {
        self.last_reading
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn store(&self) -> &PersistentStore<M> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PersistentStore<M> {
        &mut self.store
    }

    /// Tear the controller down, e.g. to simulate a power cycle.
    pub fn release(self) -> (S, M, D) {
        (self.sensor, self.store.release(), self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::storage::RamStorage;
    use crate::testing::{RecordingDelay, ScriptedSensor, fault};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type TestController = Controller<ScriptedSensor, RamStorage<32>, RecordingDelay>;

    const GOOD: SensorReading = SensorReading::new(850, 22.5, 41.0);
    const OTHER: SensorReading = SensorReading::new(612, 20.25, 48.5);

    fn controller(sensor: ScriptedSensor, memory: RamStorage<32>) -> TestController {
        Controller::new(
            sensor,
            memory,
            RecordingDelay::default(),
            LoggerConfig::default(),
        )
    }

    fn memory_with(reading: SensorReading) -> RamStorage<32> {
        let mut image = [0u8; 32];
        image[..10].copy_from_slice(&reading.to_bytes());
        RamStorage::from_image(image)
    }

    /// Controller that has completed startup, with the delay log cleared.
    fn started(sensor: ScriptedSensor, memory: RamStorage<32>) -> TestController {
        let mut c = controller(sensor, memory);
        block_on(c.start()).unwrap();
        c.delay.delays_ms.clear();
        c
    }

    fn image(c: &TestController) -> [u8; 32] {
        *c.store().memory().image()
    }

    #[test]
    fn test_boot_with_fresh_storage_reports_no_data() {
        let mut c = controller(ScriptedSensor::new(), RamStorage::new());

        assert_eq!(block_on(c.start()), Ok(Recovery::NoValidData));
        assert_eq!(c.state(), RunState::PeriodicSampling);
        assert_eq!(c.last_reading(), None);
    }

    #[test]
    fn test_boot_recovers_plausible_record() {
        let mut c = controller(ScriptedSensor::new(), memory_with(GOOD));

        assert_eq!(block_on(c.start()), Ok(Recovery::Recovered(GOOD)));
        assert_eq!(c.last_reading(), Some(GOOD));
    }

    #[test]
    fn test_boot_with_garbage_record_reports_no_data() {
        let mut c = controller(ScriptedSensor::new(), RamStorage::from_image([0xFF; 32]));

        assert_eq!(block_on(c.start()), Ok(Recovery::NoValidData));
        assert_eq!(c.state(), RunState::PeriodicSampling);
    }

    #[test]
    fn test_unreadable_record_is_not_fatal() {
        let mut memory = memory_with(GOOD);
        memory.set_fail_reads(true);
        let mut c = controller(ScriptedSensor::new(), memory);

        assert_eq!(block_on(c.start()), Ok(Recovery::NoValidData));
        assert_eq!(c.last_reading(), None);
        assert_eq!(c.state(), RunState::PeriodicSampling);
        assert_eq!(c.sensor().calls, vec!["wake", "stop", "reinit", "start"]);
    }

    #[test]
    fn test_startup_order_and_settle_delay() {
        let mut c = controller(ScriptedSensor::new(), RamStorage::new());

        block_on(c.start()).unwrap();

        assert_eq!(c.sensor().calls, vec!["wake", "stop", "reinit", "start"]);
        assert_eq!(c.delay.delays_ms, vec![1500]);
    }

    #[test]
    fn test_missing_storage_is_fatal_before_sensor_use() {
        let mut c = controller(ScriptedSensor::new(), RamStorage::unplugged());

        let err = block_on(c.start()).unwrap_err();

        assert!(matches!(err, AppError::StorageUnavailable(StorageError::NotFound { .. })));
        assert!(c.sensor().calls.is_empty());
        assert_eq!(c.state(), RunState::Uninitialized);
    }

    #[test]
    fn test_wake_failure_is_fatal() {
        let sensor = ScriptedSensor {
            fail_wake: true,
            ..ScriptedSensor::new()
        };
        let mut c = controller(sensor, memory_with(GOOD));

        assert_eq!(block_on(c.start()), Err(AppError::SensorFault(fault("wake"))));
        assert_eq!(c.sensor().calls, vec!["wake"]);
        assert_eq!(c.state(), RunState::Uninitialized);
    }

    #[test]
    fn test_stop_and_reinit_failures_are_not_fatal() {
        let sensor = ScriptedSensor {
            fail_stop: true,
            fail_reinit: true,
            ..ScriptedSensor::new()
        };
        let mut c = controller(sensor, memory_with(GOOD));

        assert_eq!(block_on(c.start()), Ok(Recovery::Recovered(GOOD)));
        assert_eq!(c.state(), RunState::PeriodicSampling);
    }

    #[test]
    fn test_start_failure_degrades_and_skips_cycles() {
        let sensor = ScriptedSensor {
            fail_start: true,
            ..ScriptedSensor::new().then_measure(0, OTHER)
        };
        let mut c = started(sensor, memory_with(GOOD));
        let before = image(&c);

        assert_eq!(c.state(), RunState::Degraded);
        for _ in 0..3 {
            let err = block_on(c.run_cycle()).unwrap_err();
            assert!(matches!(
                err,
                AppError::SensorFault(SensorError::NotSampling { .. })
            ));
        }

        assert_eq!(c.sensor().count("ready"), 0);
        assert_eq!(c.sensor().count("read"), 0);
        assert_eq!(image(&c), before);
        assert_eq!(c.stats().skipped, 3);
        assert_eq!(c.delay.delays_ms, vec![3000, 3000, 3000]);
    }

    #[test]
    fn test_cycle_logs_and_persists() {
        let sensor = ScriptedSensor::new().then_measure(0, OTHER);
        let mut c = started(sensor, RamStorage::new());

        assert_eq!(block_on(c.run_cycle()), Ok(OTHER));

        assert_eq!(&image(&c)[..10], &OTHER.to_bytes());
        assert_eq!(c.last_reading(), Some(OTHER));
        assert_eq!(c.delay.delays_ms, vec![3000, 2000]);
        assert_eq!(c.stats().logged, 1);
    }

    #[test]
    fn test_ready_polling_backs_off_exactly_n_times() {
        for n in [0usize, 1, 7] {
            let sensor = ScriptedSensor::new().then_measure(n, OTHER);
            let mut c = started(sensor, RamStorage::new());

            assert_eq!(block_on(c.run_cycle()), Ok(OTHER));

            let backoffs = c.delay.delays_ms.iter().filter(|&&ms| ms == 100).count();
            assert_eq!(backoffs, n);
            assert_eq!(c.sensor().count("ready"), n + 1);
            assert_eq!(c.sensor().count("read"), 1);
        }
    }

    #[test]
    fn test_ready_fault_aborts_only_current_cycle() {
        let mut sensor = ScriptedSensor::new();
        sensor.ready.push_back(Ok(false));
        sensor.ready.push_back(Err(fault("get data ready status")));
        let sensor = sensor.then_measure(2, OTHER);
        let mut c = started(sensor, memory_with(GOOD));

        let first = block_on(c.run_cycle());
        assert_eq!(
            first,
            Err(AppError::SensorFault(fault("get data ready status")))
        );
        assert_eq!(&image(&c)[..10], &GOOD.to_bytes());
        assert_eq!(c.sensor().count("read"), 0);
        // read wait + one backoff, no write throttle
        assert_eq!(c.delay.delays_ms, vec![3000, 100]);

        c.delay.delays_ms.clear();
        assert_eq!(block_on(c.run_cycle()), Ok(OTHER));
        assert_eq!(c.delay.delays_ms, vec![3000, 100, 100, 2000]);
        assert_eq!(&image(&c)[..10], &OTHER.to_bytes());
    }

    #[test]
    fn test_read_fault_leaves_record_untouched() {
        let mut sensor = ScriptedSensor::new();
        sensor.ready.push_back(Ok(true));
        sensor.measurements.push_back(Err(fault("read measurement")));
        let mut c = started(sensor, memory_with(GOOD));

        assert!(block_on(c.run_cycle()).is_err());

        assert_eq!(&image(&c)[..10], &GOOD.to_bytes());
        assert_eq!(c.store().memory().write_count(), 0);
        assert_eq!(c.stats().sensor_faults, 1);
    }

    #[test]
    fn test_implausible_reading_is_discarded() {
        let sensor = ScriptedSensor::new()
            .then_measure(0, SensorReading::new(0, 21.0, 40.0))
            .then_measure(0, SensorReading::new(10_000, 21.0, 40.0));
        let mut c = started(sensor, memory_with(GOOD));

        assert_eq!(
            block_on(c.run_cycle()),
            Err(AppError::ReadInvalid { co2_ppm: 0 })
        );
        assert_eq!(
            block_on(c.run_cycle()),
            Err(AppError::ReadInvalid { co2_ppm: 10_000 })
        );

        assert_eq!(&image(&c)[..10], &GOOD.to_bytes());
        assert_eq!(c.last_reading(), Some(GOOD));
        assert_eq!(c.stats().rejected, 2);
    }

    #[test]
    fn test_storage_written_iff_read_ok_and_plausible() {
        let mut sensor = ScriptedSensor::new()
            .then_measure(1, SensorReading::new(500, 20.0, 40.0))
            .then_measure(0, SensorReading::new(0, 20.0, 40.0));
        sensor.ready.push_back(Err(fault("get data ready status")));
        let mut sensor = sensor.then_measure(3, SensorReading::new(9999, 30.0, 60.0));
        sensor.ready.push_back(Ok(true));
        sensor.measurements.push_back(Err(fault("read measurement")));
        let sensor = sensor.then_measure(0, SensorReading::new(401, 18.5, 35.0));

        let mut c = started(sensor, RamStorage::new());
        let mut written = Vec::new();

        for _ in 0..6 {
            let before = image(&c);
            let result = block_on(c.run_cycle());
            let after = image(&c);

            match result {
                Ok(reading) => {
                    assert!(reading.is_plausible());
                    assert_eq!(&after[..10], &reading.to_bytes());
                    written.push(reading.co2_ppm);
                }
                Err(_) => assert_eq!(after, before),
            }
        }

        assert_eq!(written, vec![500, 9999, 401]);
        assert_eq!(c.store().memory().write_count(), 3);
        assert_eq!(
            c.stats(),
            CycleStats {
                logged: 3,
                rejected: 1,
                sensor_faults: 2,
                storage_faults: 0,
                skipped: 0,
            }
        );
    }

    #[test]
    fn test_ready_poll_cap_times_out() {
        let mut sensor = ScriptedSensor::new();
        sensor.ready.extend(std::iter::repeat_n(Ok(false), 10));
        let mut c = controller(sensor, memory_with(GOOD));
        c.config.timing = TimingConfig {
            max_ready_polls: Some(4),
            ..TimingConfig::default()
        };
        block_on(c.start()).unwrap();
        c.delay.delays_ms.clear();

        assert_eq!(
            block_on(c.run_cycle()),
            Err(AppError::SensorFault(SensorError::Timeout {
                sensor: "SCD4x",
                polls: 4,
            }))
        );
        assert_eq!(c.sensor().count("ready"), 5);
        assert_eq!(c.delay.delays_ms, vec![3000, 100, 100, 100, 100]);
        assert_eq!(&image(&c)[..10], &GOOD.to_bytes());
    }

    #[test]
    fn test_storage_write_failure_is_per_cycle() {
        let sensor = ScriptedSensor::new()
            .then_measure(0, OTHER)
            .then_measure(0, GOOD);
        let mut c = started(sensor, RamStorage::new());

        c.store_mut().memory_mut().set_fail_writes(true);
        assert!(matches!(
            block_on(c.run_cycle()),
            Err(AppError::StorageUnavailable(StorageError::WriteFailed { .. }))
        ));
        assert_eq!(c.last_reading(), None);

        c.store_mut().memory_mut().set_fail_writes(false);
        assert_eq!(block_on(c.run_cycle()), Ok(GOOD));
        assert_eq!(c.stats().storage_faults, 1);
        assert_eq!(c.stats().logged, 1);
    }

    #[test]
    fn test_power_cycle_recovers_last_logged_reading() {
        let sensor = ScriptedSensor::new()
            .then_measure(0, GOOD)
            .then_measure(0, OTHER)
            .then_measure(0, SensorReading::new(0, 0.0, 0.0));
        let mut c = started(sensor, RamStorage::new());
        for _ in 0..3 {
            let _ = block_on(c.run_cycle());
        }

        let (_, memory, _) = c.release();
        let mut rebooted = controller(ScriptedSensor::new(), memory);

        assert_eq!(block_on(rebooted.start()), Ok(Recovery::Recovered(OTHER)));
    }

    #[test]
    fn test_run_stops_when_signaled() {
        static SHUTDOWN: Signal<CriticalSectionRawMutex, ()> = Signal::new();
        SHUTDOWN.signal(());

        let mut c = started(ScriptedSensor::new().then_measure(0, GOOD), RamStorage::new());
        let stats = block_on(c.run(&SHUTDOWN));

        assert_eq!(stats.total(), 0);
        assert_eq!(c.sensor().count("ready"), 0);
    }

    #[test]
    fn test_run_loops_until_signaled_mid_run() {
        static SHUTDOWN: Signal<CriticalSectionRawMutex, ()> = Signal::new();

        /// Raises the shutdown signal from inside its third measurement.
        struct StopAfter {
            inner: ScriptedSensor,
            reads: u32,
        }

        impl SensorSource for StopAfter {
            async fn wake(&mut self) -> Result<(), SensorError> {
                self.inner.wake().await
            }
            async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
                self.inner.stop_periodic_measurement().await
            }
            async fn reinit(&mut self) -> Result<(), SensorError> {
                self.inner.reinit().await
            }
            async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
                self.inner.start_periodic_measurement().await
            }
            async fn is_data_ready(&mut self) -> Result<bool, SensorError> {
                self.inner.is_data_ready().await
            }
            async fn read_measurement(&mut self) -> Result<SensorReading, SensorError> {
                self.reads += 1;
                if self.reads == 3 {
                    SHUTDOWN.signal(());
                }
                Ok(SensorReading::new(400 + self.reads as u16, 21.0, 40.0))
            }
        }

        let sensor = StopAfter {
            inner: ScriptedSensor::new(),
            reads: 0,
        };
        let mut c = Controller::new(
            sensor,
            RamStorage::<32>::new(),
            RecordingDelay::default(),
            LoggerConfig::default(),
        );
        block_on(c.start()).unwrap();

        let stats = block_on(c.run(&SHUTDOWN));

        assert_eq!(stats.logged, 3);
        assert_eq!(c.last_reading().map(|r| r.co2_ppm), Some(403));
    }
}
