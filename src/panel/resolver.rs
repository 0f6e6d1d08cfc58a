// SPDX-License-Identifier: GPL-3.0-only
//! Panel resolution
//!
//! Firmware vendors implement the `_ADR` display type encoding unevenly, so
//! the primary panel is looked up through a chain of matchers, each one only
//! tried when the previous found nothing:
//!
//! 1. a child typed as LCD panel under [`DISPLAY_TYPE_MASK`]
//! 2. a child at the legacy panel ID [`LEGACY_PANEL`]
//! 3. the [`DEFAULT_PANEL_PATH`] child, only when no child is typed as CRT
//!    (the type encoding looks absent altogether)
//!
//! A primary that was not typed as LCD and is not named like the alternate
//! output device is backed up by the [`ALTERNATE_PANEL_PATH`] child, because
//! some firmware raises notifications there. Every external adapter gets at
//! most one discrete panel.
//!
//! Every match goes through [`to_platform_device`]; a candidate without a
//! platform device counts as no match.

use super::locator::find_by_address;
use super::{
    ALTERNATE_PANEL_PATH, CRT_MONITOR, DEFAULT_PANEL_PATH, DISPLAY_TYPE_MASK, FULL_MASK, LCD_PANEL,
    LEGACY_PANEL, PanelSet, PlatformVideo,
};
use crate::registry::{DeviceRegistry, RegistryEntry, to_platform_device};

/// Which matcher produced the primary panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimarySource {
    TypedLcd,
    Legacy,
    Default,
}

fn lcd_panel<E: RegistryEntry>(video: &E) -> Option<E> {
    find_by_address(video, LCD_PANEL, DISPLAY_TYPE_MASK)
}

fn legacy_panel<E: RegistryEntry>(video: &E) -> Option<E> {
    find_by_address(video, LEGACY_PANEL, FULL_MASK)
}

fn default_panel<E: RegistryEntry>(video: &E) -> Option<E> {
    if find_by_address(video, CRT_MONITOR, DISPLAY_TYPE_MASK).is_some() {
        return None;
    }
    video.child_from_path(DEFAULT_PANEL_PATH)
}

fn builtin_primary<R: DeviceRegistry>(
    registry: &R,
    video: &R::Entry,
) -> Option<(R::Entry, PrimarySource)> {
    let steps: [(fn(&R::Entry) -> Option<R::Entry>, PrimarySource); 3] = [
        (lcd_panel, PrimarySource::TypedLcd),
        (legacy_panel, PrimarySource::Legacy),
        (default_panel, PrimarySource::Default),
    ];

    steps.into_iter().find_map(|(matcher, source)| {
        let panel = to_platform_device(registry, matcher(video))?;
        debug!("Builtin panel {:?} found by {:?} match", panel.name(), source);
        Some((panel, source))
    })
}

fn needs_fallback<E: RegistryEntry>(primary: Option<&(E, PrimarySource)>) -> bool {
    match primary {
        None => true,
        Some((_, PrimarySource::TypedLcd)) => false,
        Some((panel, _)) => !panel
            .name()
            .is_some_and(|name| name.starts_with(ALTERNATE_PANEL_PATH)),
    }
}

fn discrete_panel<R: DeviceRegistry>(registry: &R, video: &R::Entry) -> Option<R::Entry> {
    to_platform_device(registry, lcd_panel(video))
        .or_else(|| to_platform_device(registry, legacy_panel(video)))
}

/// Resolve the panels whose notifications become brightness keys
///
/// Pure with respect to the registry: the same tree always yields the same set.
pub fn resolve<R: DeviceRegistry>(
    registry: &R,
    video: &PlatformVideo<R::Entry>,
) -> PanelSet<R::Entry> {
    let mut panels = PanelSet::default();

    if let Some(builtin) = &video.builtin {
        let primary = builtin_primary(registry, builtin);

        if needs_fallback(primary.as_ref()) {
            panels.fallback =
                to_platform_device(registry, builtin.child_from_path(ALTERNATE_PANEL_PATH));
            if let Some(fallback) = &panels.fallback {
                debug!("Using {:?} as fallback panel", fallback.name());
            }
        }

        panels.primary = primary.map(|(panel, _)| panel);
    }

    panels.discrete = video
        .external
        .iter()
        .filter_map(|external| discrete_panel(registry, external))
        .collect();

    info!(
        "Resolved panels: primary {:?}, fallback {:?}, discrete {}",
        panels.primary.as_ref().and_then(|p| p.name()),
        panels.fallback.as_ref().and_then(|p| p.name()),
        panels.discrete.len()
    );

    panels
}
