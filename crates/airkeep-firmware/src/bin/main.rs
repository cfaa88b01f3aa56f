#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airkeep_core::{Controller, LoggerConfig, Recovery};
use airkeep_firmware::app_state::{create_i2c_bus, init_i2c_hardware};
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Nothing raises this on hardware; logging ends with a reset.
static SHUTDOWN: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Park forever after a fatal error. Recovery needs a power cycle or reset.
async fn halt() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("ESP32S3-SCD40-FRAM logger");

    let config = LoggerConfig::default();

    let i2c = match create_i2c_bus(
        peripherals.I2C0,
        peripherals.GPIO8,
        peripherals.GPIO9,
        config.bus.frequency_khz,
    ) {
        Ok(i2c) => i2c,
        Err(e) => {
            error!("I2C configuration rejected: {:?}", e);
            halt().await
        }
    };

    let hardware = init_i2c_hardware(i2c, &config.bus);
    let mut controller = Controller::new(
        hardware.sensor,
        hardware.fram,
        embassy_time::Delay,
        config,
    );

    match controller.start().await {
        Ok(Recovery::Recovered(reading)) => info!("Resuming from {}", reading),
        Ok(Recovery::NoValidData) => info!("Starting with empty history"),
        Err(e) => {
            error!("Fatal: {}. Halting until reset.", e);
            halt().await
        }
    }

    let stats = controller.run(&SHUTDOWN).await;
    info!("Logger exited: {:?}", stats);

    halt().await
}
