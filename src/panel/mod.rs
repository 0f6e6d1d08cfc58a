// SPDX-License-Identifier: GPL-3.0-only
//! Brightness panel discovery
//!
//! ACPI Specification, Appendix B (Video Extensions): each display output
//! device below a video controller reports its type through `_ADR`. The panel
//! raising brightness notifications is the one typed as an internal flat
//! panel, except where firmware does not follow the encoding.

pub mod locator;
pub mod resolver;

use std::fmt;

use crate::registry::RegistryEntry;

/// Bits of `_ADR` holding the display type
pub const DISPLAY_TYPE_MASK: u64 = 0x0F00;

/// VGA CRT or VESA compatible analog monitor
pub const CRT_MONITOR: u64 = 0x0100;

/// Internal/integrated digital flat panel
pub const LCD_PANEL: u64 = 0x0400;

/// Integrated LCD panel #1 using the backwards compatible ID
pub const LEGACY_PANEL: u64 = 0x0110;

/// Mask used when an address has to match exactly
pub const FULL_MASK: u64 = 0xFFFF_FFFF;

/// Output device used when `_ADR` carries no type information
pub const DEFAULT_PANEL_PATH: &str = "DD1F";

/// Output device some firmware raises notifications on instead
pub const ALTERNATE_PANEL_PATH: &str = "DD02";

/// Video controllers of the machine
#[derive(Debug, Clone)]
pub struct PlatformVideo<E> {
    pub builtin: Option<E>,
    pub external: Vec<E>,
}

impl<E> Default for PlatformVideo<E> {
    fn default() -> Self {
        Self {
            builtin: None,
            external: Vec::new(),
        }
    }
}

/// Where a panel was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSlot {
    Primary,
    Fallback,
    /// Panel of the n-th external adapter that has one
    Discrete(usize),
}

impl fmt::Display for PanelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelSlot::Primary => f.write_str("primary"),
            PanelSlot::Fallback => f.write_str("fallback"),
            PanelSlot::Discrete(index) => write!(f, "discrete[{}]", index),
        }
    }
}

/// Result of panel discovery
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSet<E> {
    pub primary: Option<E>,
    pub fallback: Option<E>,
    pub discrete: Vec<E>,
}

impl<E> Default for PanelSet<E> {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: None,
            discrete: Vec::new(),
        }
    }
}

impl<E: RegistryEntry> PanelSet<E> {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.fallback.is_none() && self.discrete.is_empty()
    }

    /// Every resolved panel with its slot, primary first
    pub fn slots(&self) -> Vec<(PanelSlot, &E)> {
        let mut slots = Vec::new();
        if let Some(primary) = &self.primary {
            slots.push((PanelSlot::Primary, primary));
        }
        if let Some(fallback) = &self.fallback {
            slots.push((PanelSlot::Fallback, fallback));
        }
        slots.extend(
            self.discrete
                .iter()
                .enumerate()
                .map(|(index, panel)| (PanelSlot::Discrete(index), panel)),
        );
        slots
    }

    /// Consume the set into its panels, primary first
    pub fn into_slots(self) -> Vec<(PanelSlot, E)> {
        let mut slots = Vec::new();
        if let Some(primary) = self.primary {
            slots.push((PanelSlot::Primary, primary));
        }
        if let Some(fallback) = self.fallback {
            slots.push((PanelSlot::Fallback, fallback));
        }
        slots.extend(
            self.discrete
                .into_iter()
                .enumerate()
                .map(|(index, panel)| (PanelSlot::Discrete(index), panel)),
        );
        slots
    }
}
