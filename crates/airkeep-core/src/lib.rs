//! Hardware-independent core library for airkeep
//!
//! This crate contains all platform-agnostic logic of the airkeep CO2 logger:
//! the persisted [`reading::SensorReading`] record and its plausibility check,
//! the [`sensors::SensorSource`] and [`storage::NonVolatileMemory`] seams with
//! their SCD4x and FRAM drivers, and the [`controller::Controller`] that runs
//! power-on recovery followed by the read/validate/persist loop.
//!
//! It is `#![no_std]` so it compiles on both embedded targets (ESP32-S3) and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod app_state;
pub mod async_i2c_bus;
pub mod config;
pub mod controller;
pub mod reading;
pub mod sensors;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use app_state::{AppError, RunState};
pub use config::LoggerConfig;
pub use controller::{Controller, CycleStats, Recovery};
pub use reading::SensorReading;
