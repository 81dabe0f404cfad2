//! DonCon drum controller configuration firmware for RP2040.
//!
//! This crate provides the embedded side of the drum's serial configuration
//! interface: the host configurator talks to it over USB CDC ACM, settings
//! persist in the last flash sector, and raw sensor levels can be streamed
//! for threshold tuning.
//!
//! # Hardware Configuration
//!
//! | Function | GPIO | Description |
//! |----------|------|-------------|
//! | ADC0 | 26 | Don Left piezo |
//! | ADC1 | 27 | Ka Left piezo |
//! | ADC2 | 28 | Don Right piezo |
//! | ADC3 | 29 | Ka Right piezo |
//!
//! # Architecture
//!
//! The firmware uses the Embassy async runtime with three tasks:
//!
//! - **USB Task**: Manages the USB device stack
//! - **Config Task**: Reads tokens from the serial port, drives the
//!   [`ConfigHandler`] and samples the sensors while streaming
//! - **Settings Task**: Picks up settings published on [`SETTINGS`]
//!
//! Applied settings are published through an Embassy
//! [`Signal`](embassy_sync::signal::Signal) with "latest value wins"
//! semantics.
//!
//! # Modules
//!
//! - [`usb_serial`]: USB CDC transport ([`UsbSerial`])
//! - [`flash_store`]: Flash-backed settings ([`FlashSettingsStore`])
//! - [`sensors`]: ADC sampling ([`AdcSampler`])
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)

#![no_std]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

// Re-export core types for convenience
pub use doncon_config::{
    lines, ConfigHandler, DeviceRequest, HandlerError, InputSnapshot, SettingKey, Settings,
    SettingsStore, StoreError,
};

pub mod flash_store;
pub mod sensors;
pub mod usb_serial;

pub use flash_store::{FlashSettingsStore, SettingsFlash, FLASH_SIZE, SETTINGS_OFFSET};
pub use sensors::AdcSampler;
pub use usb_serial::{configure_usb_cdc, SerialError, UsbSerial, MAX_PACKET_SIZE};

/// Settings most recently applied through the configuration interface.
pub static SETTINGS: Signal<CriticalSectionRawMutex, Settings> = Signal::new();
