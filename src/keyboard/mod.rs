// SPDX-License-Identifier: GPL-3.0-only
//! Synthetic keyboard output

#[cfg(feature = "uinput-keyboard")]
pub mod uinput;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Linux input event code of the brightness down key
pub const KEY_BRIGHTNESSDOWN: u16 = 224;

/// Linux input event code of the brightness up key
pub const KEY_BRIGHTNESSUP: u16 = 225;

/// Logical key produced from a brightness notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrightnessKey {
    Up,
    Down,
}

impl fmt::Display for BrightnessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrightnessKey::Up => f.write_str("brightness up"),
            BrightnessKey::Down => f.write_str("brightness down"),
        }
    }
}

/// Key codes emitted for each logical key
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Keymap {
    pub up: u16,
    pub down: u16,
}

impl Default for Keymap {
    fn default() -> Self {
        Self {
            up: KEY_BRIGHTNESSUP,
            down: KEY_BRIGHTNESSDOWN,
        }
    }
}

impl Keymap {
    pub fn code(&self, key: BrightnessKey) -> u16 {
        match key {
            BrightnessKey::Up => self.up,
            BrightnessKey::Down => self.down,
        }
    }
}

/// Destination of synthetic key presses
///
/// Fire and forget: failures are the implementation's to log.
pub trait KeyboardOutput: Send + 'static {
    fn emit(&mut self, key: BrightnessKey, going_down: bool, timestamp: Instant);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keymap() {
        let keymap = Keymap::default();
        assert_eq!(keymap.code(BrightnessKey::Up), KEY_BRIGHTNESSUP);
        assert_eq!(keymap.code(BrightnessKey::Down), KEY_BRIGHTNESSDOWN);
    }

    #[test]
    fn test_partial_keymap_from_toml() {
        let keymap: Keymap = toml::from_str("up = 191").unwrap();
        assert_eq!(keymap.up, 191);
        assert_eq!(keymap.down, KEY_BRIGHTNESSDOWN);
    }
}
