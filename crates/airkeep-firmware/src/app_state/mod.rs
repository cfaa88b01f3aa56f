//! Firmware-specific application state extensions
//!
//! Re-exports the hardware-independent app state from `airkeep_core` and
//! adds ESP32-specific hardware initialization.

mod hardware;

pub use hardware::*;

// Re-export all shared app state types from airkeep-core
pub use airkeep_core::app_state::*;
