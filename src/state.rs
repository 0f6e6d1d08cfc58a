// SPDX-License-Identifier: GPL-3.0-only
//! Observability state published by the service
//!
//! Every value here is written at most once. The first brightness key is
//! recorded so it is possible to tell afterwards which panel actually raises
//! notifications on this machine.

use std::sync::OnceLock;

use serde::Serialize;

/// The first brightness key seen by the router
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FirstBrightnessEvent {
    /// Device that raised the notification
    pub panel: String,
    /// Whether a consumer took the key instead of the keyboard
    pub consumer_routed: bool,
}

/// A panel the service registered interest on
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PanelRecord {
    pub slot: String,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct PublishedState {
    panels: OnceLock<Vec<PanelRecord>>,
    first_event: OnceLock<FirstBrightnessEvent>,
}

impl PublishedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Record the registered panels; later calls are ignored
    pub fn set_panels(&self, panels: Vec<PanelRecord>) -> bool {
        self.panels.set(panels).is_ok()
    }

    pub fn panels(&self) -> &[PanelRecord] {
        self.panels.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Record the first brightness key
    ///
    /// Returns `true` only for the call that actually stored the record.
    pub fn record_first_event(&self, panel: &str, consumer_routed: bool) -> bool {
        if self.first_event.get().is_some() {
            return false;
        }
        let stored = self
            .first_event
            .set(FirstBrightnessEvent {
                panel: panel.to_string(),
                consumer_routed,
            })
            .is_ok();
        if stored {
            info!(
                panel = %panel,
                consumer_routed,
                "First brightness key received"
            );
        }
        stored
    }

    pub fn first_event(&self) -> Option<&FirstBrightnessEvent> {
        self.first_event.get()
    }
}
