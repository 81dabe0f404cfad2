//! Settings store trait and error types.

use crate::settings::{SettingKey, Settings};

/// Error type for settings store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Flash read, erase, or program failed.
    Flash,
    /// Persisted image is missing or failed validation.
    Corrupt,
    /// Image does not fit the storage buffer.
    BufferTooSmall,
}

/// Key-indexed parameter storage with flash durability.
///
/// The store holds the live settings used by the rest of the firmware.
/// [`save`](Self::save) persists them, [`load`](Self::load) replaces them with
/// the persisted copy, discarding unsaved edits.
pub trait SettingsStore {
    /// Current in-memory settings.
    fn settings(&self) -> &Settings;

    /// Mutable access to the in-memory settings.
    fn settings_mut(&mut self) -> &mut Settings;

    /// Persist the current settings.
    fn save(&mut self) -> Result<(), StoreError>;

    /// Replace the current settings with the persisted copy.
    fn load(&mut self) -> Result<(), StoreError>;

    /// Read one parameter by key.
    #[inline]
    fn get(&self, key: SettingKey) -> u16 {
        self.settings().get(key)
    }

    /// Write one parameter by key. Returns `false` if the value was rejected.
    #[inline]
    fn set(&mut self, key: SettingKey, value: u16) -> bool {
        self.settings_mut().set(key, value)
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for &mut T {
    fn settings(&self) -> &Settings {
        (**self).settings()
    }

    fn settings_mut(&mut self) -> &mut Settings {
        (**self).settings_mut()
    }

    fn save(&mut self) -> Result<(), StoreError> {
        (**self).save()
    }

    fn load(&mut self) -> Result<(), StoreError> {
        (**self).load()
    }
}

/// RAM-only settings store.
///
/// Keeps a "persisted" copy next to the live settings so save/reload behave
/// like the flash-backed store. Useful on host and for boards without
/// reserved flash.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    current: Settings,
    persisted: Settings,
    saves: u32,
}

impl MemoryStore {
    /// Create a store whose live and persisted copies are both `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            current: settings,
            persisted: settings,
            saves: 0,
        }
    }

    /// The last saved settings.
    #[must_use]
    pub fn persisted(&self) -> &Settings {
        &self.persisted
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> u32 {
        self.saves
    }
}

impl SettingsStore for MemoryStore {
    fn settings(&self) -> &Settings {
        &self.current
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.current
    }

    fn save(&mut self) -> Result<(), StoreError> {
        self.persisted = self.current;
        self.saves += 1;
        Ok(())
    }

    fn load(&mut self) -> Result<(), StoreError> {
        self.current = self.persisted;
        Ok(())
    }
}
