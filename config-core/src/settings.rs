//! Tunable drum parameters and the flat key space used by the serial protocol.
//!
//! The configurator addresses every parameter by an integer key. [`SettingKey`]
//! is that key, and [`Settings::get`] / [`Settings::set`] translate between it
//! and the structured [`Settings`] fields.
//!
//! | Key | Parameter |
//! |-----|-----------|
//! | 0-3 | Trigger thresholds (Don L, Ka L, Don R, Ka R) |
//! | 4 | Don debounce (ms) |
//! | 5 | Ka debounce (ms) |
//! | 6 | Crosstalk debounce (ms) |
//! | 7 | Key release timeout (ms) |
//! | 8 | Individual key debounce (ms) |
//! | 9 | Double trigger mode (0 = off, 1 = threshold) |
//! | 10-13 | Double trigger thresholds |
//! | 14-17 | Cutoff thresholds |
//! | 18-21 | Keyboard P1 drum keycodes |
//! | 22-25 | Keyboard P2 drum keycodes |
//! | 26-41 | Controller button keycodes |
//!
//! Keycodes are USB HID keyboard usage IDs.

/// Index of a tunable parameter in the protocol key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettingKey(u8);

impl SettingKey {
    /// Number of keys in the protocol key space.
    pub const COUNT: usize = 42;

    pub const DON_LEFT_THRESHOLD: Self = Self(0);
    pub const KA_LEFT_THRESHOLD: Self = Self(1);
    pub const DON_RIGHT_THRESHOLD: Self = Self(2);
    pub const KA_RIGHT_THRESHOLD: Self = Self(3);
    pub const DON_DEBOUNCE: Self = Self(4);
    pub const KA_DEBOUNCE: Self = Self(5);
    pub const CROSSTALK_DEBOUNCE: Self = Self(6);
    pub const KEY_TIMEOUT: Self = Self(7);
    pub const INDIVIDUAL_DEBOUNCE: Self = Self(8);
    pub const DOUBLE_TRIGGER_MODE: Self = Self(9);

    const DOUBLE_TRIGGER_BASE: u8 = 10;
    const CUTOFF_BASE: u8 = 14;
    const KEYS_P1_BASE: u8 = 18;
    const KEYS_P2_BASE: u8 = 22;
    const BUTTON_KEYS_BASE: u8 = 26;

    /// Create a key from its protocol index, or `None` if out of range.
    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Option<Self> {
        if (index as usize) < Self::COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Protocol index of this key.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0 as u16
    }

    /// All keys in ascending order.
    pub fn iter() -> impl Iterator<Item = Self> {
        (0..Self::COUNT as u8).map(Self)
    }
}

/// Error for integers outside the key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidKey;

impl TryFrom<i32> for SettingKey {
    type Error = InvalidKey;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(InvalidKey)
    }
}

/// One of the four drum sensor channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    DonLeft,
    KaLeft,
    DonRight,
    KaRight,
}

impl Channel {
    /// Channels in key order.
    pub const ALL: [Channel; 4] = [
        Channel::DonLeft,
        Channel::KaLeft,
        Channel::DonRight,
        Channel::KaRight,
    ];
}

/// Per-channel threshold values (12-bit ADC domain).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    pub don_left: u16,
    pub ka_left: u16,
    pub don_right: u16,
    pub ka_right: u16,
}

impl Thresholds {
    /// Same threshold for Don channels and for Ka channels.
    #[must_use]
    pub const fn symmetric(don: u16, ka: u16) -> Self {
        Self {
            don_left: don,
            ka_left: ka,
            don_right: don,
            ka_right: ka,
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, channel: Channel) -> u16 {
        match channel {
            Channel::DonLeft => self.don_left,
            Channel::KaLeft => self.ka_left,
            Channel::DonRight => self.don_right,
            Channel::KaRight => self.ka_right,
        }
    }

    #[inline]
    pub fn set(&mut self, channel: Channel, value: u16) {
        match channel {
            Channel::DonLeft => self.don_left = value,
            Channel::KaLeft => self.ka_left = value,
            Channel::DonRight => self.don_right = value,
            Channel::KaRight => self.ka_right = value,
        }
    }
}

/// Lockout and hold times, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebounceDelays {
    /// Don-to-Don lockout.
    pub don: u16,
    /// Ka-to-Ka lockout.
    pub ka: u16,
    /// Don-to-Ka lockout.
    pub crosstalk: u16,
    /// Key press duration reported to the host.
    pub key_timeout: u16,
    /// Global signal hold time per key.
    pub individual: u16,
}

/// How a second hit within the debounce window is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DoubleTriggerMode {
    #[default]
    Off = 0,
    Threshold = 1,
}

impl TryFrom<u16> for DoubleTriggerMode {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DoubleTriggerMode::Off),
            1 => Ok(DoubleTriggerMode::Threshold),
            _ => Err(()),
        }
    }
}

/// Keyboard keycodes for the four drum zones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrumKeys {
    pub don_left: u8,
    pub ka_left: u8,
    pub don_right: u8,
    pub ka_right: u8,
}

impl DrumKeys {
    fn slot_mut(&mut self, channel: Channel) -> &mut u8 {
        match channel {
            Channel::DonLeft => &mut self.don_left,
            Channel::KaLeft => &mut self.ka_left,
            Channel::DonRight => &mut self.don_right,
            Channel::KaRight => &mut self.ka_right,
        }
    }

    fn get(&self, channel: Channel) -> u8 {
        match channel {
            Channel::DonLeft => self.don_left,
            Channel::KaLeft => self.ka_left,
            Channel::DonRight => self.don_right,
            Channel::KaRight => self.ka_right,
        }
    }
}

/// Keyboard keycodes for the controller buttons, in key order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonKeys {
    pub up: u8,
    pub down: u8,
    pub left: u8,
    pub right: u8,
    pub north: u8,
    pub east: u8,
    pub south: u8,
    pub west: u8,
    pub l: u8,
    pub r: u8,
    pub start: u8,
    pub select: u8,
    pub home: u8,
    pub share: u8,
    pub l3: u8,
    pub r3: u8,
}

impl ButtonKeys {
    const COUNT: u8 = 16;

    fn slot_mut(&mut self, index: u8) -> Option<&mut u8> {
        Some(match index {
            0 => &mut self.up,
            1 => &mut self.down,
            2 => &mut self.left,
            3 => &mut self.right,
            4 => &mut self.north,
            5 => &mut self.east,
            6 => &mut self.south,
            7 => &mut self.west,
            8 => &mut self.l,
            9 => &mut self.r,
            10 => &mut self.start,
            11 => &mut self.select,
            12 => &mut self.home,
            13 => &mut self.share,
            14 => &mut self.l3,
            15 => &mut self.r3,
            _ => return None,
        })
    }

    fn get(&self, index: u8) -> Option<u8> {
        Some(match index {
            0 => self.up,
            1 => self.down,
            2 => self.left,
            3 => self.right,
            4 => self.north,
            5 => self.east,
            6 => self.south,
            7 => self.west,
            8 => self.l,
            9 => self.r,
            10 => self.start,
            11 => self.select,
            12 => self.home,
            13 => self.share,
            14 => self.l3,
            15 => self.r3,
            _ => return None,
        })
    }
}

/// Complete set of tunable drum parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub trigger_thresholds: Thresholds,
    pub debounce: DebounceDelays,
    pub double_trigger_mode: DoubleTriggerMode,
    pub double_trigger_thresholds: Thresholds,
    pub cutoff_thresholds: Thresholds,
    pub keys_p1: DrumKeys,
    pub keys_p2: DrumKeys,
    pub button_keys: ButtonKeys,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger_thresholds: Thresholds::symmetric(1000, 1500),
            debounce: DebounceDelays {
                don: 30,
                ka: 30,
                crosstalk: 30,
                key_timeout: 25,
                individual: 15,
            },
            double_trigger_mode: DoubleTriggerMode::Off,
            double_trigger_thresholds: Thresholds::symmetric(2500, 2500),
            cutoff_thresholds: Thresholds::symmetric(4095, 4095),
            // F D J K
            keys_p1: DrumKeys {
                don_left: 0x09,
                ka_left: 0x07,
                don_right: 0x0D,
                ka_right: 0x0E,
            },
            // V C B N
            keys_p2: DrumKeys {
                don_left: 0x19,
                ka_left: 0x06,
                don_right: 0x05,
                ka_right: 0x11,
            },
            button_keys: ButtonKeys {
                up: 0x52,
                down: 0x51,
                left: 0x50,
                right: 0x4F,
                north: 0x1A,
                east: 0x16,
                south: 0x28,
                west: 0x29,
                l: 0x14,
                r: 0x08,
                start: 0x2C,
                select: 0x2B,
                home: 0x4A,
                share: 0x46,
                l3: 0x1D,
                r3: 0x1B,
            },
        }
    }
}

/// Which structured field a key addresses.
enum Field {
    Threshold(Channel),
    Debounce(u8),
    DoubleTriggerMode,
    DoubleTriggerThreshold(Channel),
    Cutoff(Channel),
    KeyP1(Channel),
    KeyP2(Channel),
    Button(u8),
}

impl Field {
    fn of(key: SettingKey) -> Self {
        let i = key.0;
        let channel = |base: u8| Channel::ALL[(i - base) as usize];
        match i {
            0..=3 => Field::Threshold(channel(0)),
            4..=8 => Field::Debounce(i - 4),
            9 => Field::DoubleTriggerMode,
            10..=13 => Field::DoubleTriggerThreshold(channel(SettingKey::DOUBLE_TRIGGER_BASE)),
            14..=17 => Field::Cutoff(channel(SettingKey::CUTOFF_BASE)),
            18..=21 => Field::KeyP1(channel(SettingKey::KEYS_P1_BASE)),
            22..=25 => Field::KeyP2(channel(SettingKey::KEYS_P2_BASE)),
            // SettingKey is always < COUNT, so this covers 26..=41
            _ => Field::Button(i - SettingKey::BUTTON_KEYS_BASE),
        }
    }
}

impl Settings {
    /// Read the value addressed by `key`.
    #[must_use]
    pub fn get(&self, key: SettingKey) -> u16 {
        match Field::of(key) {
            Field::Threshold(ch) => self.trigger_thresholds.get(ch),
            Field::Debounce(n) => match n {
                0 => self.debounce.don,
                1 => self.debounce.ka,
                2 => self.debounce.crosstalk,
                3 => self.debounce.key_timeout,
                _ => self.debounce.individual,
            },
            Field::DoubleTriggerMode => self.double_trigger_mode as u16,
            Field::DoubleTriggerThreshold(ch) => self.double_trigger_thresholds.get(ch),
            Field::Cutoff(ch) => self.cutoff_thresholds.get(ch),
            Field::KeyP1(ch) => self.keys_p1.get(ch) as u16,
            Field::KeyP2(ch) => self.keys_p2.get(ch) as u16,
            Field::Button(n) => self.button_keys.get(n).unwrap_or(0) as u16,
        }
    }

    /// Write the value addressed by `key`.
    ///
    /// Returns `false` and leaves the settings untouched when the value does
    /// not fit the field: a double trigger mode other than 0 or 1, or a
    /// keycode above 255.
    pub fn set(&mut self, key: SettingKey, value: u16) -> bool {
        match Field::of(key) {
            Field::Threshold(ch) => self.trigger_thresholds.set(ch, value),
            Field::Debounce(n) => {
                let slot = match n {
                    0 => &mut self.debounce.don,
                    1 => &mut self.debounce.ka,
                    2 => &mut self.debounce.crosstalk,
                    3 => &mut self.debounce.key_timeout,
                    _ => &mut self.debounce.individual,
                };
                *slot = value;
            }
            Field::DoubleTriggerMode => match DoubleTriggerMode::try_from(value) {
                Ok(mode) => self.double_trigger_mode = mode,
                Err(()) => return false,
            },
            Field::DoubleTriggerThreshold(ch) => self.double_trigger_thresholds.set(ch, value),
            Field::Cutoff(ch) => self.cutoff_thresholds.set(ch, value),
            Field::KeyP1(ch) => return set_keycode(self.keys_p1.slot_mut(ch), value),
            Field::KeyP2(ch) => return set_keycode(self.keys_p2.slot_mut(ch), value),
            Field::Button(n) => match self.button_keys.slot_mut(n) {
                Some(slot) => return set_keycode(slot, value),
                None => return false,
            },
        }
        true
    }
}

fn set_keycode(slot: &mut u8, value: u16) -> bool {
    match u8::try_from(value) {
        Ok(code) => {
            *slot = code;
            true
        }
        Err(_) => false,
    }
}

// Button keys fill the tail of the key space exactly.
const _: () = assert!(
    (SettingKey::BUTTON_KEYS_BASE + ButtonKeys::COUNT) as usize == SettingKey::COUNT
);
