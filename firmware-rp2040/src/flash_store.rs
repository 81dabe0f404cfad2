//! Flash-backed settings store.
//!
//! The settings image lives in the last 4 KiB erase sector of the on-board
//! flash, outside the firmware image.

use defmt::{info, warn};
use doncon_config::persist;
use doncon_config::{Settings, SettingsStore, StoreError, IMAGE_SIZE};
use embassy_rp::flash::{Blocking, Error as FlashError, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;

/// Size of the on-board QSPI flash.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Flash offset of the settings sector.
pub const SETTINGS_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

/// One flash program page.
const PAGE_SIZE: usize = 256;

const _: () = assert!(IMAGE_SIZE <= PAGE_SIZE);

/// Blocking flash driver type used by the store.
pub type SettingsFlash<'d> = Flash<'d, FLASH, Blocking, FLASH_SIZE>;

#[inline]
fn flash_error_to_store_error(e: FlashError) -> StoreError {
    warn!("flash error: {:?}", e);
    StoreError::Flash
}

/// [`SettingsStore`] persisting to the last flash sector.
pub struct FlashSettingsStore<'d> {
    flash: SettingsFlash<'d>,
    settings: Settings,
}

impl<'d> FlashSettingsStore<'d> {
    /// Create the store and load the persisted settings.
    ///
    /// A blank or corrupt sector leaves the defaults in place.
    pub fn new(flash: SettingsFlash<'d>) -> Self {
        let mut store = Self {
            flash,
            settings: Settings::default(),
        };
        match store.load() {
            Ok(()) => info!("settings loaded from flash"),
            Err(e) => warn!("no usable settings in flash ({:?}), using defaults", e),
        }
        store
    }
}

impl SettingsStore for FlashSettingsStore<'_> {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let mut page = [0xFFu8; PAGE_SIZE];
        persist::encode(&self.settings, &mut page).map_err(|_| StoreError::BufferTooSmall)?;

        self.flash
            .blocking_erase(SETTINGS_OFFSET, SETTINGS_OFFSET + ERASE_SIZE as u32)
            .map_err(flash_error_to_store_error)?;
        self.flash
            .blocking_write(SETTINGS_OFFSET, &page)
            .map_err(flash_error_to_store_error)?;
        Ok(())
    }

    fn load(&mut self) -> Result<(), StoreError> {
        let mut page = [0u8; PAGE_SIZE];
        self.flash
            .blocking_read(SETTINGS_OFFSET, &mut page)
            .map_err(flash_error_to_store_error)?;

        match persist::decode(&page) {
            Ok(settings) => {
                self.settings = settings;
                Ok(())
            }
            Err(e) => {
                warn!("settings image rejected: {:?}", e);
                self.settings = Settings::default();
                Err(StoreError::Corrupt)
            }
        }
    }
}
