//! Serial configuration protocol for the DonCon drum controller.
//!
//! This crate implements the host-facing side of the drum's configuration
//! interface without any platform-specific dependencies. It can be used both
//! in embedded `no_std` firmware and on host for testing.
//!
//! # Overview
//!
//! - [`handler`]: Protocol state machine ([`ConfigHandler`])
//! - [`parser`]: Inbound token parsing ([`parse_line`], [`Command`])
//! - [`settings`]: Parameter model and key space ([`Settings`], [`SettingKey`])
//! - [`store`]: Settings storage trait ([`SettingsStore`], [`MemoryStore`])
//! - [`persist`]: Flash image codec ([`persist::encode`], [`persist::decode`])
//! - [`telemetry`]: Averaged sensor stream ([`InputSnapshot`], [`StreamAccumulator`])
//!
//! # Protocol
//!
//! ASCII tokens, one per line (the line ending is optional):
//!
//! ```text
//! 1000  read all        -> "<key>:<value>" per key, then "Version:<version>"
//! 1001  save to flash
//! 1002  enter write mode, then "<key>:<value>" per parameter
//! 1003  reload from flash
//! 1004  reboot to BOOTSEL
//! 2000  start streaming -> "<ka_l>,<don_l>,<don_r>,<ka_r>" lines
//! 2001  stop streaming
//! ```
//!
//! Anything the handler does not understand is ignored without a reply.
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and logging (for embedded targets)
//! - **`log`**: Log through the `log` facade instead
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod handler;
pub mod parser;
pub mod persist;
pub mod settings;
pub mod store;
pub mod telemetry;

// Re-export main types at crate root
pub use handler::{ConfigHandler, DeviceRequest, HandlerError, FIRMWARE_VERSION};
pub use parser::{lines, parse_line, Command, Inbound, ParseError};
pub use persist::{PersistError, IMAGE_SIZE};
pub use settings::{
    ButtonKeys, Channel, DebounceDelays, DoubleTriggerMode, DrumKeys, SettingKey, Settings,
    Thresholds,
};
pub use store::{MemoryStore, SettingsStore, StoreError};
pub use telemetry::{InputSnapshot, SensorAverages, StreamAccumulator, STREAM_INTERVAL_MS};
