// SPDX-License-Identifier: GPL-3.0-only
//! Live set of key notice consumers

use super::{Component, ComponentId};

/// Ordered set of the consumers currently present
///
/// Owned by the event gate, so the set cannot change while a broadcast walks
/// it. Consumers are kept in the order they were published.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    live: Vec<Component>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly published consumer
    ///
    /// Returns `false` if it was already present.
    pub fn on_published(&mut self, component: Component) -> bool {
        if self.contains(component.id()) {
            debug!("Consumer {:?} already present", component);
            return false;
        }
        info!("Consumer {} ({}) appeared", component.name(), component.id());
        self.live.push(component);
        true
    }

    /// Drop a terminated consumer
    ///
    /// Returns `false` if it was not present.
    pub fn on_terminated(&mut self, id: ComponentId) -> bool {
        match self.live.iter().position(|c| c.id() == id) {
            Some(index) => {
                let component = self.live.remove(index);
                info!("Consumer {} ({}) went away", component.name(), id);
                true
            }
            None => {
                debug!("Termination of unknown consumer {}", id);
                false
            }
        }
    }

    /// Consumers in publication order
    pub fn current_consumers(&self) -> &[Component] {
        &self.live
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.live.iter().any(|c| c.id() == id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
