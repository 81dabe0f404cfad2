//! Raw drum sensor sampling via the RP2040 ADC.
//!
//! # Pins
//!
//! | Channel | GPIO |
//! |---------|------|
//! | Don Left | 26 |
//! | Ka Left | 27 |
//! | Don Right | 28 |
//! | Ka Right | 29 |
//!
//! GPIO 29 is wired to VSYS on the Raspberry Pi Pico; use a board that breaks
//! it out.

use doncon_config::InputSnapshot;
use embassy_rp::adc::{Adc, Blocking, Channel, Error as AdcError};

/// Reads the four piezo channels into an [`InputSnapshot`].
pub struct AdcSampler<'d> {
    /// Blocking mode keeps DMA free for flash access
    adc: Adc<'d, Blocking>,
    don_left: Channel<'d>,
    ka_left: Channel<'d>,
    don_right: Channel<'d>,
    ka_right: Channel<'d>,
}

impl<'d> AdcSampler<'d> {
    /// Create a sampler from the ADC and one channel per drum zone.
    #[must_use]
    pub fn new(
        adc: Adc<'d, Blocking>,
        don_left: Channel<'d>,
        ka_left: Channel<'d>,
        don_right: Channel<'d>,
        ka_right: Channel<'d>,
    ) -> Self {
        Self {
            adc,
            don_left,
            ka_left,
            don_right,
            ka_right,
        }
    }

    /// Take one reading of every channel.
    pub fn sample(&mut self) -> Result<InputSnapshot, AdcError> {
        Ok(InputSnapshot {
            don_left: self.adc.blocking_read(&mut self.don_left)?,
            ka_left: self.adc.blocking_read(&mut self.ka_left)?,
            don_right: self.adc.blocking_read(&mut self.don_right)?,
            ka_right: self.adc.blocking_read(&mut self.ka_right)?,
        })
    }
}
