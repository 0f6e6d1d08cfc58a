// SPDX-License-Identifier: GPL-3.0-only
//! Device registry abstraction
//!
//! The registry is a hierarchical tree of device nodes, the way ACPI exposes
//! display output devices below a video controller. The panel resolver only
//! needs to walk children, read a few attributes and turn a node into its
//! platform counterpart, so that is all these traits expose.

pub mod tree;

#[cfg(feature = "udev-registry")]
pub mod udev_tree;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Property holding the registry path of a node's platform device
pub const ACPI_PATH_PROPERTY: &str = "acpi-path";

/// Kind of message delivered to an interest callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// ACPI device notification; the payload carries the notification code
    DeviceNotification,
    /// Any other message type
    Other(u32),
}

/// Message delivered by the registry to a registered interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareMessage {
    pub kind: MessageKind,
    /// Name of the device that raised the message
    pub source: String,
    pub payload: Option<u32>,
}

impl HardwareMessage {
    /// Device notification carrying `code`
    pub fn device_notification(source: impl Into<String>, code: u32) -> Self {
        Self {
            kind: MessageKind::DeviceNotification,
            source: source.into(),
            payload: Some(code),
        }
    }
}

/// Callback invoked for every message raised by a device of interest
///
/// The callback is built from a typed handle, so whoever receives the message
/// never has to check what it is talking to.
pub type NotificationCallback = Arc<dyn Fn(HardwareMessage) + Send + Sync>;

/// A node in the device registry
pub trait RegistryEntry: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Short identifier, e.g. `DD1F`
    fn name(&self) -> Option<String>;

    /// Hex address string, e.g. `400`
    fn location(&self) -> Option<String>;

    /// Immediate children in registry order
    fn children(&self) -> Vec<Self>;

    /// Immediate child whose name equals `path`
    fn child_from_path(&self, path: &str) -> Option<Self>;

    /// String property lookup
    fn property(&self, key: &str) -> Option<String>;

    /// Whether this node is a platform (ACPI) device that can raise notifications
    fn is_platform_device(&self) -> bool;
}

/// Ownership token for a registered interest
///
/// Removing consumes the handle, so it cannot be removed twice. Holders must
/// remove it before the device it was registered on is released.
pub trait NotifierHandle: Send + 'static {
    fn remove(self);
}

/// The registry itself
pub trait DeviceRegistry: Send + Sync {
    type Entry: RegistryEntry;
    type Notifier: NotifierHandle;

    /// Look up a node by its registry path
    fn from_path(&self, path: &str) -> Option<Self::Entry>;

    /// Subscribe `callback` to the state-change messages of `device`
    fn register_interest(
        &self,
        device: &Self::Entry,
        callback: NotificationCallback,
    ) -> Result<Self::Notifier>;
}

/// Convert a device-tree node into its platform device
///
/// Follows the node's `acpi-path` property. A node found at that path that is
/// not a platform device is dropped right here.
pub fn to_platform_device<R: DeviceRegistry>(
    registry: &R,
    node: Option<R::Entry>,
) -> Option<R::Entry> {
    let node = node?;
    let path = node.property(ACPI_PATH_PROPERTY)?;
    let candidate = registry.from_path(&path)?;
    if candidate.is_platform_device() {
        Some(candidate)
    } else {
        debug!(
            "{:?} at {} is not a platform device",
            candidate.name(),
            path
        );
        None
    }
}

/// Parse a hex location string, with or without a `0x` prefix
pub fn parse_hex(location: &str) -> Option<u64> {
    let trimmed = location.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).ok()
}
