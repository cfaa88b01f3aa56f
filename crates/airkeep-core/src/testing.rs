//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::ErrorKind;

use crate::reading::SensorReading;
use crate::sensors::{SensorError, SensorSource};

/// Delay that returns immediately and records every requested wait in ms.
#[derive(Debug, Default, Clone)]
pub struct RecordingDelay {
    pub delays_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.delays_ms.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.delays_ms.push(us / 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}

pub fn fault(operation: &'static str) -> SensorError {
    SensorError::I2cError {
        sensor: "scripted",
        operation,
        kind: ErrorKind::Bus,
    }
}

/// Sensor whose readiness polls and measurements follow a script.
///
/// An exhausted readiness script answers "ready"; an exhausted measurement
/// script answers with a bus fault.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    pub ready: VecDeque<Result<bool, SensorError>>,
    pub measurements: VecDeque<Result<SensorReading, SensorError>>,
    pub fail_wake: bool,
    pub fail_stop: bool,
    pub fail_reinit: bool,
    pub fail_start: bool,
    pub calls: Vec<&'static str>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `not_ready` negative polls followed by one positive poll and a measurement.
    pub fn then_measure(mut self, not_ready: usize, reading: SensorReading) -> Self {
        self.ready.extend(core::iter::repeat_n(Ok(false), not_ready));
        self.ready.push_back(Ok(true));
        self.measurements.push_back(Ok(reading));
        self
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn lifecycle(&mut self, call: &'static str, fail: bool) -> Result<(), SensorError> {
        self.calls.push(call);
        if fail { Err(fault(call)) } else { Ok(()) }
    }
}

impl SensorSource for ScriptedSensor {
    async fn wake(&mut self) -> Result<(), SensorError> {
        self.lifecycle("wake", self.fail_wake)
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.lifecycle("stop", self.fail_stop)
    }

    async fn reinit(&mut self) -> Result<(), SensorError> {
        self.lifecycle("reinit", self.fail_reinit)
    }

    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.lifecycle("start", self.fail_start)
    }

    async fn is_data_ready(&mut self) -> Result<bool, SensorError> {
        self.calls.push("ready");
        self.ready.pop_front().unwrap_or(Ok(true))
    }

    async fn read_measurement(&mut self) -> Result<SensorReading, SensorError> {
        self.calls.push("read");
        self.measurements
            .pop_front()
            .unwrap_or(Err(fault("read measurement")))
    }
}
