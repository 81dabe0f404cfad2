//! ConfigHandler: the serial configuration protocol state machine.

use core::fmt::{self, Write};

use crate::parser::{parse_line, Command, Inbound};
use crate::settings::SettingKey;
use crate::store::{SettingsStore, StoreError};
use crate::telemetry::{InputSnapshot, StreamAccumulator, STREAM_INTERVAL_MS};

/// Firmware version reported by the read-all command.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value returned by [`ConfigHandler::get_setting_by_key`] for unknown keys.
pub const UNKNOWN_KEY_VALUE: u16 = 0;

/// Device-level action the caller must perform after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceRequest {
    /// Flush pending output, then reboot into the USB bootloader.
    /// Normal operation does not resume.
    RebootToBootloader,
}

/// Error type for handler operations.
///
/// These are never written to the host; they are returned so the caller can
/// log them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerError {
    /// The output sink rejected a write (buffer full).
    Output,
    /// Saving or reloading the settings failed.
    Store(StoreError),
}

impl From<fmt::Error> for HandlerError {
    fn from(_: fmt::Error) -> Self {
        HandlerError::Output
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        HandlerError::Store(err)
    }
}

/// Active write-mode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WriteSession {
    /// Key/value pairs accepted since the session started.
    count: u32,
}

/// Serial configuration protocol handler.
///
/// Interprets inbound tokens as commands or, in write mode, as `key:value`
/// parameter writes, and turns input snapshots into an averaged telemetry
/// stream while streaming is on.
///
/// Write mode and streaming are independent; either, both or neither may be
/// active. Both entry points, [`process_line`](Self::process_line) and
/// [`send_sensor_data_if_streaming`](Self::send_sensor_data_if_streaming),
/// do a bounded amount of work and never block.
///
/// Output goes to any [`core::fmt::Write`] sink, typically a
/// `heapless::String` that the caller flushes to the transport.
///
/// # Example
///
/// ```
/// use doncon_config::{ConfigHandler, MemoryStore, SettingKey, SettingsStore};
///
/// let mut store = MemoryStore::default();
/// let mut handler = ConfigHandler::new(&mut store);
/// let mut out = heapless::String::<1024>::new();
///
/// handler.process_line(b"1002", 0, &mut out).unwrap();
/// handler.process_line(b"0:800", 0, &mut out).unwrap();
/// assert!(out.is_empty());
/// assert_eq!(store.get(SettingKey::DON_LEFT_THRESHOLD), 800);
/// ```
pub struct ConfigHandler<S, F = fn()> {
    store: S,
    on_settings_applied: Option<F>,
    write: Option<WriteSession>,
    stream: Option<StreamAccumulator>,
    version: &'static str,
    stream_interval_ms: u64,
}

impl<S: SettingsStore> ConfigHandler<S, fn()> {
    /// Create a handler without an applied-settings callback.
    pub fn new(store: S) -> Self {
        Self::build(store, None)
    }
}

impl<S: SettingsStore, F: FnMut()> ConfigHandler<S, F> {
    /// Create a handler that calls `on_settings_applied` after every accepted
    /// parameter write and after every reload from flash.
    pub fn with_settings_applied(store: S, on_settings_applied: F) -> Self {
        Self::build(store, Some(on_settings_applied))
    }

    fn build(store: S, on_settings_applied: Option<F>) -> Self {
        Self {
            store,
            on_settings_applied,
            write: None,
            stream: None,
            version: FIRMWARE_VERSION,
            stream_interval_ms: STREAM_INTERVAL_MS,
        }
    }

    /// Report `version` instead of the crate version on read-all.
    #[must_use]
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Emit telemetry every `interval_ms` instead of [`STREAM_INTERVAL_MS`].
    #[must_use]
    pub fn with_stream_interval(mut self, interval_ms: u64) -> Self {
        self.stream_interval_ms = interval_ms;
        self
    }

    /// Process one inbound token.
    ///
    /// A recognized command code is executed even while write mode is active,
    /// and write mode stays active afterwards. Any other token is treated as
    /// `key:value` write data in write mode and ignored otherwise. Malformed
    /// tokens, unknown keys and unknown command codes produce no output.
    ///
    /// Returns a [`DeviceRequest`] when the command needs the caller to act
    /// on the device.
    pub fn process_line<W: Write + ?Sized>(
        &mut self,
        line: &[u8],
        now_ms: u64,
        out: &mut W,
    ) -> Result<Option<DeviceRequest>, HandlerError> {
        match parse_line(line) {
            Ok(Inbound::Command(command)) => self.handle_command(command, now_ms, out),
            Ok(Inbound::Write { key, value }) => {
                if self.write.is_some() {
                    self.handle_write_data(key, value);
                } else {
                    trace!("write outside write mode ignored");
                }
                Ok(None)
            }
            Err(e) => {
                trace!("ignored token: {:?}", e);
                Ok(None)
            }
        }
    }

    /// Execute one command.
    pub fn handle_command<W: Write + ?Sized>(
        &mut self,
        command: Command,
        now_ms: u64,
        out: &mut W,
    ) -> Result<Option<DeviceRequest>, HandlerError> {
        debug!("command {}", command.code());
        match command {
            Command::ReadAll => self.send_all_settings(out)?,
            Command::SaveToFlash => {
                self.store.save().inspect_err(|e| {
                    warn!("save failed: {:?}", e);
                })?;
                info!("settings saved");
            }
            Command::EnterWriteMode => {
                self.write = Some(WriteSession::default());
            }
            Command::ReloadFromFlash => {
                let result = self.store.load();
                // Notify even on failure: a failed load leaves defaults in place.
                self.notify_settings_applied();
                result.inspect_err(|e| {
                    warn!("reload failed: {:?}", e);
                })?;
                info!("settings reloaded");
            }
            Command::RebootToBootsel => {
                info!("reboot to bootloader requested");
                return Ok(Some(DeviceRequest::RebootToBootloader));
            }
            Command::StartStreaming => {
                self.stream = Some(StreamAccumulator::start(now_ms));
            }
            Command::StopStreaming => {
                self.stream = None;
            }
        }
        Ok(None)
    }

    /// Feed one input snapshot into the telemetry stream.
    ///
    /// Does nothing unless streaming. Otherwise the snapshot is accumulated
    /// and, once the stream interval has elapsed, one CSV line with the
    /// per-channel means is written to `out`.
    pub fn send_sensor_data_if_streaming<W: Write + ?Sized>(
        &mut self,
        snapshot: &InputSnapshot,
        now_ms: u64,
        out: &mut W,
    ) -> Result<(), HandlerError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        stream.push(snapshot);
        if let Some(averages) = stream.poll(now_ms, self.stream_interval_ms) {
            averages.write_csv(out)?;
        }
        Ok(())
    }

    /// Transport disconnected: leave write mode and stop streaming.
    pub fn reset(&mut self) {
        if self.write.is_some() || self.stream.is_some() {
            debug!("session reset");
        }
        self.write = None;
        self.stream = None;
    }

    /// Read a parameter by raw protocol key.
    ///
    /// Returns [`UNKNOWN_KEY_VALUE`] for keys outside the key space.
    #[must_use]
    pub fn get_setting_by_key(&self, key: i32) -> u16 {
        SettingKey::try_from(key)
            .map(|key| self.store.get(key))
            .unwrap_or(UNKNOWN_KEY_VALUE)
    }

    /// Write a parameter by raw protocol key.
    ///
    /// Returns `false` without touching the store for keys outside the key
    /// space or values the parameter cannot hold.
    pub fn set_setting_by_key(&mut self, key: i32, value: u16) -> bool {
        match SettingKey::try_from(key) {
            Ok(key) => self.store.set(key, value),
            Err(_) => false,
        }
    }

    /// Whether write mode is active.
    #[inline]
    #[must_use]
    pub fn is_write_mode(&self) -> bool {
        self.write.is_some()
    }

    /// Parameter writes accepted since write mode was last entered.
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> u32 {
        self.write.map_or(0, |session| session.count)
    }

    /// Whether telemetry streaming is active.
    #[inline]
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Get a reference to the settings store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a mutable reference to the settings store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Decompose the handler into its settings store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn handle_write_data(&mut self, key: SettingKey, value: u16) {
        if !self.store.set(key, value) {
            trace!("value {} rejected for key {}", value, key.index());
            return;
        }

        if let Some(session) = self.write.as_mut() {
            session.count = session.count.saturating_add(1);
            trace!("set {}:{} (#{})", key.index(), value, session.count);
        }
        self.notify_settings_applied();
    }

    fn send_all_settings<W: Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        for key in SettingKey::iter() {
            writeln!(out, "{}:{}", key.index(), self.store.get(key))?;
        }
        writeln!(out, "Version:{}", self.version)
    }

    fn notify_settings_applied(&mut self) {
        if let Some(callback) = self.on_settings_applied.as_mut() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::settings::Settings;
    use crate::store::MemoryStore;
    use core::cell::Cell;
    use std::string::String;
    use std::vec::Vec;

    fn snapshot(don_left: u16, ka_left: u16, don_right: u16, ka_right: u16) -> InputSnapshot {
        InputSnapshot {
            don_left,
            ka_left,
            don_right,
            ka_right,
        }
    }

    /// Parse read-all output into (key, value) pairs and the version string.
    fn parse_read_all(out: &str) -> (Vec<(u16, u16)>, String) {
        let mut pairs = Vec::new();
        let mut version = String::new();
        for line in out.lines() {
            let (k, v) = line.split_once(':').unwrap();
            if k == "Version" {
                version = v.into();
            } else {
                pairs.push((k.parse().unwrap(), v.parse().unwrap()));
            }
        }
        (pairs, version)
    }

    #[test]
    fn test_initial_state() {
        let handler = ConfigHandler::new(MemoryStore::default());
        assert!(!handler.is_write_mode());
        assert!(!handler.is_streaming());
        assert_eq!(handler.write_count(), 0);
    }

    #[test]
    fn test_read_all_matches_store() {
        let mut store = MemoryStore::default();
        store.settings_mut().debounce.key_timeout = 77;
        let mut handler = ConfigHandler::new(store).with_version("1.2.3");

        let mut out = String::new();
        let request = handler.process_line(b"1000\n", 0, &mut out).unwrap();
        assert_eq!(request, None);

        let (pairs, version) = parse_read_all(&out);
        assert_eq!(version, "1.2.3");
        assert_eq!(pairs.len(), SettingKey::COUNT);
        for (expected_key, (key, value)) in SettingKey::iter().zip(pairs) {
            assert_eq!(key, expected_key.index());
            assert_eq!(value, handler.store().get(expected_key));
        }
        assert!(out.ends_with("Version:1.2.3\n"));
        assert!(out.contains("7:77\n"));
    }

    #[test]
    fn test_write_then_read_back() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        handler.process_line(b"0:800", 0, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(handler.write_count(), 1);

        handler.process_line(b"1000", 0, &mut out).unwrap();
        let (pairs, _) = parse_read_all(&out);
        assert_eq!(pairs[0], (0, 800));
    }

    #[test]
    fn test_write_ignored_outside_write_mode() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        handler.process_line(b"0:800", 0, &mut out).unwrap();
        assert_eq!(
            handler.store().settings().trigger_thresholds.don_left,
            Settings::default().trigger_thresholds.don_left
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_out_of_range_key_leaves_store_unchanged() {
        let calls = Cell::new(0);
        let mut handler =
            ConfigHandler::with_settings_applied(MemoryStore::default(), || {
                calls.set(calls.get() + 1)
            });
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        for line in [&b"42:5"[..], b"-1:5", b"999:1", b"0:70000", b"0:abc", b"garbage"] {
            handler.process_line(line, 0, &mut out).unwrap();
        }

        assert_eq!(*handler.store().settings(), Settings::default());
        assert_eq!(handler.write_count(), 0);
        assert_eq!(calls.get(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_rejected_value_is_not_counted() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        handler.process_line(b"1002", 0, &mut out).unwrap();
        handler.process_line(b"9:7", 0, &mut out).unwrap();
        assert_eq!(handler.write_count(), 0);
        assert_eq!(handler.get_setting_by_key(9), 0);
    }

    #[test]
    fn test_callback_once_per_write() {
        let calls = Cell::new(0);
        let mut handler =
            ConfigHandler::with_settings_applied(MemoryStore::default(), || {
                calls.set(calls.get() + 1)
            });
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        assert_eq!(calls.get(), 0);
        handler.process_line(b"0:800\n1:900", 0, &mut out).unwrap();
        // Two tokens in one line is malformed, nothing applied
        assert_eq!(calls.get(), 0);
        for line in crate::parser::lines(b"0:800\n1:900\n4:20\n") {
            handler.process_line(line, 0, &mut out).unwrap();
        }
        assert_eq!(calls.get(), 3);
        assert_eq!(handler.write_count(), 3);
    }

    #[test]
    fn test_reload_discards_edits_and_notifies_once() {
        let calls = Cell::new(0);
        let mut store = MemoryStore::default();
        let mut handler = ConfigHandler::with_settings_applied(&mut store, || {
            calls.set(calls.get() + 1)
        });
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        handler.process_line(b"0:800", 0, &mut out).unwrap();
        handler.process_line(b"1:900", 0, &mut out).unwrap();
        assert_eq!(calls.get(), 2);

        handler.process_line(b"1003", 0, &mut out).unwrap();
        assert_eq!(calls.get(), 3);
        assert_eq!(*handler.store().settings(), Settings::default());
        drop(handler);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_save_persists() {
        let mut store = MemoryStore::default();
        let mut handler = ConfigHandler::new(&mut store);
        let mut out = String::new();

        for line in [&b"1002"[..], b"5:44", b"1001"] {
            handler.process_line(line, 0, &mut out).unwrap();
        }
        assert!(out.is_empty());
        drop(handler);
        assert_eq!(store.persisted().debounce.ka, 44);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_command_in_write_mode_keeps_write_mode() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        handler.process_line(b"2:1234", 0, &mut out).unwrap();
        handler.process_line(b"1000", 0, &mut out).unwrap();
        assert!(out.contains("2:1234\n"));
        assert!(handler.is_write_mode());
        assert_eq!(handler.write_count(), 1);

        handler.process_line(b"3:1111", 0, &mut out).unwrap();
        assert_eq!(handler.get_setting_by_key(3), 1111);
        assert_eq!(handler.write_count(), 2);
    }

    #[test]
    fn test_reenter_write_mode_resets_count() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        for line in [&b"1002"[..], b"0:1", b"1:2", b"1002"] {
            handler.process_line(line, 0, &mut out).unwrap();
        }
        assert!(handler.is_write_mode());
        assert_eq!(handler.write_count(), 0);
    }

    #[test]
    fn test_unknown_command_is_silent() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        for line in [&b"1005"[..], b"3000", b"", b"hello"] {
            assert_eq!(handler.process_line(line, 0, &mut out), Ok(None));
        }
        assert!(out.is_empty());
        assert!(!handler.is_write_mode());
        assert!(!handler.is_streaming());
    }

    #[test]
    fn test_unknown_integer_in_write_mode_is_ignored() {
        let calls = Cell::new(0);
        let mut handler =
            ConfigHandler::with_settings_applied(MemoryStore::default(), || {
                calls.set(calls.get() + 1)
            });
        let mut out = String::new();

        handler.process_line(b"1002", 0, &mut out).unwrap();
        for line in [&b"5"[..], b"0", b"1005", b"-1"] {
            assert_eq!(handler.process_line(line, 0, &mut out), Ok(None));
        }

        assert_eq!(*handler.store().settings(), Settings::default());
        assert_eq!(handler.write_count(), 0);
        assert_eq!(calls.get(), 0);
        assert!(out.is_empty());
        assert!(handler.is_write_mode());

        handler.process_line(b" 0 : 800 ", 0, &mut out).unwrap();
        assert_eq!(handler.get_setting_by_key(0), 800);
        assert_eq!(handler.write_count(), 1);
    }

    #[test]
    fn test_write_count_saturates() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        handler.process_line(b"1002", 0, &mut out).unwrap();
        handler.write = Some(WriteSession { count: u32::MAX });

        handler.process_line(b"4:20", 0, &mut out).unwrap();
        assert_eq!(handler.write_count(), u32::MAX);
        assert_eq!(handler.get_setting_by_key(4), 20);
    }

    #[test]
    fn test_reboot_request() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        assert_eq!(
            handler.process_line(b"1004", 0, &mut out),
            Ok(Some(DeviceRequest::RebootToBootloader))
        );
    }

    #[test]
    fn test_streaming_emits_mean_once_per_interval() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();

        handler.process_line(b"2000", 1000, &mut out).unwrap();
        assert!(handler.is_streaming());

        let samples = [
            snapshot(100, 10, 40, 7),
            snapshot(200, 20, 50, 8),
            snapshot(300, 30, 60, 9),
            snapshot(400, 40, 70, 12),
        ];
        for (i, s) in samples.iter().enumerate() {
            handler
                .send_sensor_data_if_streaming(s, 1000 + i as u64, &mut out)
                .unwrap();
        }
        assert!(out.is_empty());

        let last = snapshot(500, 50, 80, 14);
        handler
            .send_sensor_data_if_streaming(&last, 1000 + STREAM_INTERVAL_MS, &mut out)
            .unwrap();
        // ka_left, don_left, don_right, ka_right
        assert_eq!(out, "30,300,60,10\n");

        out.clear();
        handler
            .send_sensor_data_if_streaming(&last, 1001 + STREAM_INTERVAL_MS, &mut out)
            .unwrap();
        assert!(out.is_empty());
        handler
            .send_sensor_data_if_streaming(&last, 1000 + 2 * STREAM_INTERVAL_MS, &mut out)
            .unwrap();
        assert_eq!(out, "50,500,80,14\n");
    }

    #[test]
    fn test_stop_streaming_stops_emissions() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();

        handler.process_line(b"2000", 0, &mut out).unwrap();
        handler.process_line(b"2001", 0, &mut out).unwrap();
        assert!(!handler.is_streaming());

        for t in 0..100 {
            handler
                .send_sensor_data_if_streaming(&snapshot(1, 2, 3, 4), t, &mut out)
                .unwrap();
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_restart_streaming_discards_partial_window() {
        let mut handler = ConfigHandler::new(MemoryStore::default()).with_stream_interval(5);
        let mut out = String::new();

        handler.process_line(b"2000", 0, &mut out).unwrap();
        handler
            .send_sensor_data_if_streaming(&snapshot(4000, 4000, 4000, 4000), 1, &mut out)
            .unwrap();
        handler.process_line(b"2000", 2, &mut out).unwrap();
        handler
            .send_sensor_data_if_streaming(&snapshot(10, 20, 30, 40), 7, &mut out)
            .unwrap();
        assert_eq!(out, "20,10,30,40\n");
    }

    #[test]
    fn test_streaming_and_write_mode_are_independent() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();

        handler.process_line(b"2000", 0, &mut out).unwrap();
        handler.process_line(b"1002", 0, &mut out).unwrap();
        assert!(handler.is_streaming() && handler.is_write_mode());

        handler.process_line(b"2001", 0, &mut out).unwrap();
        assert!(!handler.is_streaming());
        assert!(handler.is_write_mode());
    }

    #[test]
    fn test_reset_clears_sessions() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = String::new();
        handler.process_line(b"2000", 0, &mut out).unwrap();
        handler.process_line(b"1002", 0, &mut out).unwrap();

        handler.reset();
        assert!(!handler.is_streaming());
        assert!(!handler.is_write_mode());

        handler.process_line(b"0:800", 0, &mut out).unwrap();
        assert_ne!(handler.get_setting_by_key(0), 800);
    }

    #[test]
    fn test_key_accessors() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        assert!(handler.set_setting_by_key(6, 99));
        assert_eq!(handler.get_setting_by_key(6), 99);
        assert!(!handler.set_setting_by_key(42, 1));
        assert!(!handler.set_setting_by_key(-3, 1));
        assert_eq!(handler.get_setting_by_key(42), UNKNOWN_KEY_VALUE);
        assert_eq!(handler.get_setting_by_key(i32::MIN), UNKNOWN_KEY_VALUE);
    }

    #[test]
    fn test_output_overflow_is_reported() {
        let mut handler = ConfigHandler::new(MemoryStore::default());
        let mut out = heapless::String::<16>::new();
        assert_eq!(
            handler.process_line(b"1000", 0, &mut out),
            Err(HandlerError::Output)
        );
    }
}
