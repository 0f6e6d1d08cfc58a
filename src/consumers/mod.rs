// SPDX-License-Identifier: GPL-3.0-only
//! Components that want to see brightness keys before they are typed
//!
//! A component opts in by publishing itself in the [`ComponentDirectory`]
//! with a boolean interest marker property set to `true`. While it is
//! present, every translated key is offered to it, and it may claim the key
//! by setting [`KeyEvent::consumed`](crate::router::KeyEvent::consumed).

pub mod directory;
pub mod subscription;

pub use directory::{ComponentDirectory, PresenceCallback, PresenceEvent, PresenceWatch};
pub use subscription::SubscriptionManager;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::router::KeyEvent;

/// Default name of the interest marker property
pub const DEFAULT_INTEREST_MARKER: &str = "RM,deliverNotifications";

/// Stable identity of a published component
pub type ComponentId = u64;

/// Receives routed key notices
///
/// Called from the event gate, one consumer at a time. An implementation that
/// blocks stalls every other notification.
pub trait KeyNoticeReceiver: Send + Sync {
    /// Time of the key press about to be offered
    fn key_time(&self, _timestamp: Instant) {}

    /// The key itself; set `event.consumed` to take ownership of it
    fn key_event(&self, event: &mut KeyEvent);
}

/// Property value of a published component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Number(u64),
    String(String),
}

/// A component as published in the directory
#[derive(Clone)]
pub struct Component {
    id: ComponentId,
    name: String,
    properties: HashMap<String, PropertyValue>,
    receiver: Arc<dyn KeyNoticeReceiver>,
}

impl Component {
    pub fn new(name: impl Into<String>, receiver: Arc<dyn KeyNoticeReceiver>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            properties: HashMap::new(),
            receiver,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Shorthand for setting a boolean marker to `true`
    pub fn with_marker(self, marker: impl Into<String>) -> Self {
        self.with_property(marker, PropertyValue::Bool(true))
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Whether the component advertises `marker` as `true`
    pub fn has_marker(&self, marker: &str) -> bool {
        self.property(marker) == Some(&PropertyValue::Bool(true))
    }

    pub fn receiver(&self) -> &dyn KeyNoticeReceiver {
        self.receiver.as_ref()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component(id: {}, name: {})", self.id, self.name)
    }
}
