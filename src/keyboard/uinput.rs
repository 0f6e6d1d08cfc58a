// SPDX-License-Identifier: GPL-3.0-only
//! Virtual keyboard using evdev/uinput
//!
//! Creates a keyboard that only knows the two brightness keys. Desktop
//! environments pick it up like any other keyboard.

use std::time::Instant;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};

use super::{BrightnessKey, KeyboardOutput, Keymap};
use crate::error::{Error, Result};

/// uinput backed keyboard
pub struct UinputKeyboard {
    device: VirtualDevice,
    keymap: Keymap,
}

impl std::fmt::Debug for UinputKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UinputKeyboard({:?})", self.keymap)
    }
}

impl UinputKeyboard {
    /// Create the virtual device
    ///
    /// # Arguments
    /// * `name` - Device name (shown in `evtest` and `libinput list-devices`)
    /// * `keymap` - Codes emitted for brightness up and down
    pub fn new(name: &str, keymap: Keymap) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::new(keymap.up));
        keys.insert(Key::new(keymap.down));

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(name).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| Error::Keyboard(format!("failed to create {}: {}", name, e)))?;

        info!(
            "Created virtual keyboard {} (up: {}, down: {})",
            name, keymap.up, keymap.down
        );
        Ok(Self { device, keymap })
    }
}

impl KeyboardOutput for UinputKeyboard {
    // The kernel stamps uinput events on arrival, which is the emission time.
    fn emit(&mut self, key: BrightnessKey, going_down: bool, _timestamp: Instant) {
        let code = self.keymap.code(key);
        let event = InputEvent::new(EventType::KEY, code, i32::from(going_down));

        if let Err(e) = self.device.emit(&[event]) {
            warn!("uinput emit failed for {} (down: {}): {}", key, going_down, e);
        }
    }
}
