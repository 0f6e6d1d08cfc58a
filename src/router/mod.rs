// SPDX-License-Identifier: GPL-3.0-only
//! Brightness notification routing
//!
//! [`KeyRouter`] turns ACPI video notification codes into brightness keys.
//! Before a key is typed it is offered to every present consumer. If one of
//! them claims it, the consumer owns the visible effect and nothing is typed;
//! otherwise a key press and release go out through the keyboard.
//!
//! The router itself is plain synchronous state. [`gate::EventGate`] runs it
//! on a single task so that notifications, broadcasts and consumer presence
//! changes never overlap.

pub mod gate;

use std::sync::Arc;
use std::time::Instant;

use crate::consumers::{Component, ComponentId, SubscriptionManager};
use crate::keyboard::{BrightnessKey, KeyboardOutput};
use crate::registry::{HardwareMessage, MessageKind};
use crate::state::PublishedState;

// ACPI Specification, Appendix B: notification values of output devices.

/// Cycle brightness
pub const BRIGHTNESS_CYCLE: u32 = 0x85;
/// Increase brightness
pub const BRIGHTNESS_UP: u32 = 0x86;
/// Decrease brightness
pub const BRIGHTNESS_DOWN: u32 = 0x87;
/// Zero brightness
pub const BRIGHTNESS_ZERO: u32 = 0x88;
/// Display device off
pub const BRIGHTNESS_OFF: u32 = 0x89;

/// Key offered to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: BrightnessKey,
    pub timestamp: Instant,
    pub going_down: bool,
    /// Set by a consumer that takes ownership of the key
    pub consumed: bool,
}

impl KeyEvent {
    pub fn press(key: BrightnessKey, timestamp: Instant) -> Self {
        Self {
            key,
            timestamp,
            going_down: true,
            consumed: false,
        }
    }
}

/// What a notification code means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Key(BrightnessKey),
    /// Known brightness operation without a key (cycle, zero, off)
    Unimplemented,
    Unknown,
}

pub fn classify(code: u32) -> Classification {
    match code {
        BRIGHTNESS_UP => Classification::Key(BrightnessKey::Up),
        BRIGHTNESS_DOWN => Classification::Key(BrightnessKey::Down),
        BRIGHTNESS_CYCLE | BRIGHTNESS_ZERO | BRIGHTNESS_OFF => Classification::Unimplemented,
        _ => Classification::Unknown,
    }
}

/// Result of routing one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOutcome {
    UpHandled,
    DownHandled,
    Unimplemented(u32),
    Unknown(u32),
}

/// Notification to key translation and consumer broadcast
pub struct KeyRouter<K> {
    consumers: SubscriptionManager,
    keyboard: K,
    state: Arc<PublishedState>,
}

impl<K> std::fmt::Debug for KeyRouter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyRouter(consumers: {})", self.consumers.len())
    }
}

impl<K: KeyboardOutput> KeyRouter<K> {
    pub fn new(keyboard: K, state: Arc<PublishedState>) -> Self {
        Self {
            consumers: SubscriptionManager::new(),
            keyboard,
            state,
        }
    }

    pub fn consumers(&self) -> &SubscriptionManager {
        &self.consumers
    }

    pub fn state(&self) -> &Arc<PublishedState> {
        &self.state
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    pub fn on_published(&mut self, component: Component) -> bool {
        self.consumers.on_published(component)
    }

    pub fn on_terminated(&mut self, id: ComponentId) -> bool {
        self.consumers.on_terminated(id)
    }

    /// Handle a message delivered by the registry
    ///
    /// Only device notifications with a payload are routed; everything else
    /// is logged and yields `None`.
    pub fn handle_message(&mut self, message: &HardwareMessage) -> Option<RouterOutcome> {
        match (message.kind, message.payload) {
            (MessageKind::DeviceNotification, Some(code)) => {
                Some(self.on_notification(&message.source, code))
            }
            (MessageKind::DeviceNotification, None) => {
                debug!("{} sent a device notification without argument", message.source);
                None
            }
            (MessageKind::Other(kind), _) => {
                debug!("{} sent message {:08X}", message.source, kind);
                None
            }
        }
    }

    /// Route notification `code` raised by `source`
    pub fn on_notification(&mut self, source: &str, code: u32) -> RouterOutcome {
        let key = match classify(code) {
            Classification::Key(key) => key,
            Classification::Unimplemented => {
                debug!("{} brightness operation {:#04x} not implemented", source, code);
                return RouterOutcome::Unimplemented(code);
            }
            Classification::Unknown => {
                debug!("{} unknown notification {:#06x}", source, code);
                return RouterOutcome::Unknown(code);
            }
        };

        let consumed = self.route(key);
        debug!(source, consumed, "ACPI {}", key);
        self.state.record_first_event(source, consumed);

        match key {
            BrightnessKey::Up => RouterOutcome::UpHandled,
            BrightnessKey::Down => RouterOutcome::DownHandled,
        }
    }

    /// Offer `key` to the consumers, type it if nobody claims it
    ///
    /// Returns whether a consumer claimed the key.
    fn route(&mut self, key: BrightnessKey) -> bool {
        let consumers = self.consumers.current_consumers();
        let mut event = KeyEvent::press(key, Instant::now());
        broadcast(consumers, &mut event);

        if event.consumed {
            event.going_down = false;
            broadcast(consumers, &mut event);
            return true;
        }

        self.keyboard.emit(key, true, Instant::now());
        self.keyboard.emit(key, false, Instant::now());
        false
    }

    pub fn into_keyboard(self) -> K {
        self.keyboard
    }
}

/// Deliver `event` to every consumer in order
///
/// Iteration never stops early. Once a consumer claims the key, the claim
/// sticks for the rest of the broadcast.
fn broadcast(consumers: &[Component], event: &mut KeyEvent) {
    let mut consumed = event.consumed;
    for consumer in consumers {
        let receiver = consumer.receiver();
        receiver.key_time(event.timestamp);
        receiver.key_event(event);
        if event.consumed && !consumed {
            debug!("{} claimed {}", consumer.name(), event.key);
        }
        consumed |= event.consumed;
        event.consumed = consumed;
    }
}
