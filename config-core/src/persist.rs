//! Flash image codec for [`Settings`].
//!
//! Settings are stored by protocol key, so the image layout follows the key
//! space rather than the struct layout:
//!
//! ```text
//! "DCON" | version u16 | key count u16 | value u16 x count | CRC-16
//! ```
//!
//! All integers are little-endian. The CRC (CRC-16/IBM-3740) covers every
//! byte before it. An image written by older firmware with fewer keys decodes
//! with defaults for the keys it lacks.

use crc::{Crc, CRC_16_IBM_3740};

use crate::settings::{SettingKey, Settings};

/// CRC-16/IBM-3740 calculator with lookup table.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

const MAGIC: [u8; 4] = *b"DCON";
const FORMAT_VERSION: u16 = 1;
const HEADER_SIZE: usize = 8;
const CRC_SIZE: usize = 2;

/// Size in bytes of an image holding every key.
pub const IMAGE_SIZE: usize = HEADER_SIZE + SettingKey::COUNT * 2 + CRC_SIZE;

/// Error type for image encoding and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// Output buffer shorter than [`IMAGE_SIZE`].
    BufferTooSmall,
    /// No image present (erased flash or foreign data).
    BadMagic,
    /// Image written by an incompatible format version.
    UnsupportedVersion,
    /// Image shorter than its header claims.
    Truncated,
    /// CRC mismatch.
    Checksum,
}

/// Encode `settings` into `buf`, returning the image length.
pub fn encode(settings: &Settings, buf: &mut [u8]) -> Result<usize, PersistError> {
    if buf.len() < IMAGE_SIZE {
        return Err(PersistError::BufferTooSmall);
    }

    buf[..4].copy_from_slice(&MAGIC);
    buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf[6..8].copy_from_slice(&(SettingKey::COUNT as u16).to_le_bytes());

    let mut pos = HEADER_SIZE;
    for key in SettingKey::iter() {
        buf[pos..pos + 2].copy_from_slice(&settings.get(key).to_le_bytes());
        pos += 2;
    }

    let crc = CRC16.checksum(&buf[..pos]);
    buf[pos..pos + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    Ok(pos + CRC_SIZE)
}

/// Decode an image produced by [`encode`].
///
/// Trailing bytes after the CRC are ignored, so a whole flash sector can be
/// passed in. Keys beyond the current key space are skipped; stored values
/// that the current firmware rejects keep their defaults.
pub fn decode(image: &[u8]) -> Result<Settings, PersistError> {
    if image.len() < HEADER_SIZE || image[..4] != MAGIC {
        return Err(PersistError::BadMagic);
    }

    let version = u16::from_le_bytes([image[4], image[5]]);
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion);
    }

    let count = u16::from_le_bytes([image[6], image[7]]) as usize;
    let end = HEADER_SIZE + count * 2;
    if image.len() < end + CRC_SIZE {
        return Err(PersistError::Truncated);
    }

    let stored_crc = u16::from_le_bytes([image[end], image[end + 1]]);
    if CRC16.checksum(&image[..end]) != stored_crc {
        return Err(PersistError::Checksum);
    }

    let mut settings = Settings::default();
    for (index, value) in image[HEADER_SIZE..end].chunks_exact(2).enumerate() {
        let Some(key) = SettingKey::new(index as u16) else {
            break;
        };
        settings.set(key, u16::from_le_bytes([value[0], value[1]]));
    }
    Ok(settings)
}
