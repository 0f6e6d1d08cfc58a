// SPDX-License-Identifier: GPL-3.0-only
//! In-process directory of published components
//!
//! Components come and go at any time and from any thread. Watches filter
//! them by a boolean marker property and hear about every matching
//! publication and termination, in the order the directory applied them.
//! Callbacks run one change at a time and must not call back into the
//! directory.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Component, ComponentId};
use crate::error::{Error, Result};

/// Presence change reported to a watch
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Published(Component),
    Terminated(ComponentId),
}

/// Callback receiving presence changes
pub type PresenceCallback = Arc<dyn Fn(PresenceEvent) + Send + Sync>;

struct Watch {
    token: u64,
    marker: String,
    callback: PresenceCallback,
}

#[derive(Default)]
struct DirectoryInner {
    components: Vec<Component>,
    watches: Vec<Watch>,
    next_id: ComponentId,
    next_token: u64,
}

/// Directory of published components
#[derive(Clone, Default)]
pub struct ComponentDirectory {
    inner: Arc<Mutex<DirectoryInner>>,
    /// Held from a change until its callbacks have returned
    delivery: Arc<Mutex<()>>,
}

impl fmt::Debug for ComponentDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        write!(
            f,
            "ComponentDirectory(components: {}, watches: {})",
            inner.components.len(),
            inner.watches.len()
        )
    }
}

impl ComponentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish `component` and return the identity assigned to it
    pub fn publish(&self, mut component: Component) -> ComponentId {
        let _delivery = self.deliver();
        let callbacks = {
            let mut inner = self.lock();
            inner.next_id += 1;
            component.id = inner.next_id;
            inner.components.push(component.clone());
            matching_callbacks(&inner.watches, &component)
        };

        debug!("Published {:?} to {} watch(es)", component, callbacks.len());
        let id = component.id;
        for callback in callbacks {
            callback(PresenceEvent::Published(component.clone()));
        }
        id
    }

    /// Remove a component; returns `false` if it was not published
    pub fn terminate(&self, id: ComponentId) -> bool {
        let _delivery = self.deliver();
        let (component, callbacks) = {
            let mut inner = self.lock();
            let Some(index) = inner.components.iter().position(|c| c.id == id) else {
                return false;
            };
            let component = inner.components.remove(index);
            let callbacks = matching_callbacks(&inner.watches, &component);
            (component, callbacks)
        };

        debug!("Terminated {:?}", component);
        for callback in callbacks {
            callback(PresenceEvent::Terminated(id));
        }
        true
    }

    /// Published components, in publication order
    pub fn components(&self) -> Vec<Component> {
        self.lock().components.clone()
    }

    /// Number of active watches
    pub fn watch_count(&self) -> usize {
        self.lock().watches.len()
    }

    /// Watch components carrying `marker`
    ///
    /// Components already published with the marker are reported right away.
    pub fn watch(&self, marker: &str, callback: PresenceCallback) -> Result<PresenceWatch> {
        if marker.is_empty() {
            return Err(Error::ConsumerTracking(
                "interest marker must not be empty".to_string(),
            ));
        }

        let _delivery = self.deliver();
        let (token, existing) = {
            let mut inner = self.lock();
            inner.next_token += 1;
            let token = inner.next_token;
            inner.watches.push(Watch {
                token,
                marker: marker.to_string(),
                callback: Arc::clone(&callback),
            });
            let existing: Vec<Component> = inner
                .components
                .iter()
                .filter(|c| c.has_marker(marker))
                .cloned()
                .collect();
            (token, existing)
        };

        debug!(
            "Watching components marked {:?}, {} already present",
            marker,
            existing.len()
        );
        for component in existing {
            callback(PresenceEvent::Published(component));
        }

        Ok(PresenceWatch {
            directory: self.clone(),
            token,
        })
    }
}

fn matching_callbacks(watches: &[Watch], component: &Component) -> Vec<PresenceCallback> {
    watches
        .iter()
        .filter(|w| component.has_marker(&w.marker))
        .map(|w| Arc::clone(&w.callback))
        .collect()
}

/// Active watch on a [`ComponentDirectory`]; dropping it stops the reports
pub struct PresenceWatch {
    directory: ComponentDirectory,
    token: u64,
}

impl fmt::Debug for PresenceWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresenceWatch({})", self.token)
    }
}

impl PresenceWatch {
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for PresenceWatch {
    fn drop(&mut self) {
        let token = self.token;
        self.directory.lock().watches.retain(|w| w.token != token);
    }
}
