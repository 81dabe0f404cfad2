//! Inbound token parsing for the serial configuration protocol.
//!
//! The host sends ASCII tokens, optionally newline terminated:
//!
//! ```text
//! 1000        read all settings
//! 1001        save settings to flash
//! 1002        enter write mode
//! 1003        reload settings from flash
//! 1004        reboot to BOOTSEL
//! 2000        start sensor streaming
//! 2001        stop sensor streaming
//! <key>:<value>   set one parameter (write mode only)
//! ```

use crate::settings::SettingKey;

/// Protocol command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    ReadAll = 1000,
    SaveToFlash = 1001,
    EnterWriteMode = 1002,
    ReloadFromFlash = 1003,
    RebootToBootsel = 1004,
    StartStreaming = 2000,
    StopStreaming = 2001,
}

impl Command {
    /// Wire code of this command.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Command {
    type Error = ParseError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1000 => Command::ReadAll,
            1001 => Command::SaveToFlash,
            1002 => Command::EnterWriteMode,
            1003 => Command::ReloadFromFlash,
            1004 => Command::RebootToBootsel,
            2000 => Command::StartStreaming,
            2001 => Command::StopStreaming,
            _ => return Err(ParseError::UnknownCommand),
        })
    }
}

/// Why a token was not understood. Never reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Blank token.
    Empty,
    /// Not an integer and not `key:value`.
    Malformed,
    /// Integer that is not a command code.
    UnknownCommand,
    /// Key outside the parameter key space.
    KeyOutOfRange,
    /// Value does not fit a parameter.
    ValueOutOfRange,
}

/// A parsed inbound token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum Inbound {
    /// A recognized command code.
    Command(Command),
    /// A `key:value` parameter write.
    Write { key: SettingKey, value: u16 },
}

/// Parse one token.
///
/// Surrounding whitespace and line endings are ignored. A token that parses
/// as an integer is always treated as a command code, never as write data.
pub fn parse_line(line: &[u8]) -> Result<Inbound, ParseError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    match line.iter().position(|&b| b == b':') {
        None => {
            let code = parse_int(line)?;
            Command::try_from(code).map(Inbound::Command)
        }
        Some(colon) => {
            let key = parse_int(&line[..colon])?;
            let value = parse_int(&line[colon + 1..])?;

            let key = SettingKey::try_from(key).map_err(|_| ParseError::KeyOutOfRange)?;
            let value = u16::try_from(value).map_err(|_| ParseError::ValueOutOfRange)?;
            Ok(Inbound::Write { key, value })
        }
    }
}

/// Split one transport chunk into tokens.
///
/// Tokens are separated by CR or LF; blank tokens are skipped. A chunk without
/// any line ending is a single token.
pub fn lines(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    chunk
        .split(|&b| b == b'\n' || b == b'\r')
        .map(<[u8]>::trim_ascii)
        .filter(|token| !token.is_empty())
}

/// Parse a signed decimal integer with optional surrounding spaces.
#[inline]
fn parse_int(s: &[u8]) -> Result<i32, ParseError> {
    core::str::from_utf8(s.trim_ascii())
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or(ParseError::Malformed)
}
