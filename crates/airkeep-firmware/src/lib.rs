//! ESP32-S3 firmware-specific modules for airkeep
//!
//! This crate contains the hardware-specific code that cannot compile on
//! desktop targets: ESP32 peripheral initialization and the concrete wiring of
//! the SCD4x and FRAM drivers onto the shared I2C bus.

#![no_std]

pub mod app_state;
