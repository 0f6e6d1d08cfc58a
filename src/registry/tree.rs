// SPDX-License-Identifier: GPL-3.0-only
//! In-memory device tree
//!
//! A snapshot of registry nodes plus the interests registered on them. The
//! udev backend fills one of these from sysfs; tests build them by hand.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{DeviceRegistry, HardwareMessage, NotificationCallback, NotifierHandle, RegistryEntry};
use crate::error::{Error, Result};

pub type NodeId = usize;

/// Description of a node to add to a tree
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    name: Option<String>,
    location: Option<String>,
    properties: HashMap<String, String>,
    /// Registry path, set for platform devices
    path: Option<String>,
    /// Extra identifiers a notification source may use for this node
    aliases: Vec<String>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Mark the node as a platform device reachable at `path`
    pub fn platform(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

#[derive(Debug)]
struct NodeData {
    spec: NodeSpec,
    children: Vec<NodeId>,
}

struct Interest {
    token: u64,
    node: NodeId,
    callback: NotificationCallback,
}

struct TreeInner {
    nodes: Vec<NodeData>,
    interests: Mutex<Vec<Interest>>,
    next_token: AtomicU64,
}

impl TreeInner {
    fn interests(&self) -> MutexGuard<'_, Vec<Interest>> {
        self.interests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Builds a [`DeviceTree`] node by node
#[derive(Debug, Default)]
pub struct DeviceTreeBuilder {
    nodes: Vec<NodeData>,
}

impl DeviceTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without a parent
    pub fn root(&mut self, spec: NodeSpec) -> NodeId {
        self.nodes.push(NodeData {
            spec,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Add a node as the last child of `parent`
    pub fn child(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = self.root(spec);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn build(self) -> DeviceTree {
        DeviceTree {
            inner: Arc::new(TreeInner {
                nodes: self.nodes,
                interests: Mutex::new(Vec::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }
}

/// Shared, immutable device tree with a mutable interest table
#[derive(Clone)]
pub struct DeviceTree {
    inner: Arc<TreeInner>,
}

impl fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceTree(nodes: {}, interests: {})",
            self.inner.nodes.len(),
            self.interest_count()
        )
    }
}

impl DeviceTree {
    /// Handle for node `id`
    ///
    /// Panics if `id` was not returned by the builder of this tree.
    pub fn node(&self, id: NodeId) -> DeviceNode {
        assert!(id < self.inner.nodes.len(), "node {id} out of range");
        DeviceNode {
            tree: Arc::clone(&self.inner),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    /// Number of interests currently registered
    pub fn interest_count(&self) -> usize {
        self.inner.interests().len()
    }

    /// Deliver `message` to every interest registered on `device`
    ///
    /// Returns how many callbacks ran.
    pub fn notify(&self, device: &DeviceNode, message: HardwareMessage) -> usize {
        self.deliver(|node| node == device.id, message)
    }

    /// Deliver `message` to interests on nodes named or aliased `source`
    pub fn notify_source(&self, source: &str, message: HardwareMessage) -> usize {
        let nodes = &self.inner.nodes;
        self.deliver(
            |node| {
                let spec = &nodes[node].spec;
                spec.name.as_deref() == Some(source)
                    || spec.path.as_deref() == Some(source)
                    || spec.aliases.iter().any(|a| a == source)
            },
            message,
        )
    }

    fn deliver(&self, matches: impl Fn(NodeId) -> bool, message: HardwareMessage) -> usize {
        // Callbacks run outside the lock so they may register or remove interests.
        let callbacks: Vec<NotificationCallback> = self
            .inner
            .interests()
            .iter()
            .filter(|interest| matches(interest.node))
            .map(|interest| Arc::clone(&interest.callback))
            .collect();

        for callback in &callbacks {
            callback(message.clone());
        }
        callbacks.len()
    }
}

impl DeviceRegistry for DeviceTree {
    type Entry = DeviceNode;
    type Notifier = TreeNotifier;

    fn from_path(&self, path: &str) -> Option<DeviceNode> {
        self.inner
            .nodes
            .iter()
            .position(|node| node.spec.path.as_deref() == Some(path))
            .map(|id| self.node(id))
    }

    fn register_interest(
        &self,
        device: &DeviceNode,
        callback: NotificationCallback,
    ) -> Result<TreeNotifier> {
        if !Arc::ptr_eq(&self.inner, &device.tree) {
            return Err(Error::Registration {
                device: device.to_string(),
                reason: "device belongs to another tree".to_string(),
            });
        }
        if !device.is_platform_device() {
            return Err(Error::Registration {
                device: device.to_string(),
                reason: "not a platform device".to_string(),
            });
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner.interests().push(Interest {
            token,
            node: device.id,
            callback,
        });
        debug!("Registered interest {} on {}", token, device);

        Ok(TreeNotifier {
            tree: Arc::clone(&self.inner),
            token,
        })
    }
}

/// Handle to a node of a [`DeviceTree`]
#[derive(Clone)]
pub struct DeviceNode {
    tree: Arc<TreeInner>,
    id: NodeId,
}

impl DeviceNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn spec(&self) -> &NodeSpec {
        &self.tree.nodes[self.id].spec
    }
}

impl PartialEq for DeviceNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for DeviceNode {}

impl fmt::Debug for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        write!(
            f,
            "DeviceNode(id: {}, name: {:?}, location: {:?})",
            self.id, spec.name, spec.location
        )
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.spec().name {
            Some(name) => f.write_str(name),
            None => write!(f, "<node {}>", self.id),
        }
    }
}

impl RegistryEntry for DeviceNode {
    fn name(&self) -> Option<String> {
        self.spec().name.clone()
    }

    fn location(&self) -> Option<String> {
        self.spec().location.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.tree.nodes[self.id]
            .children
            .iter()
            .map(|&id| DeviceNode {
                tree: Arc::clone(&self.tree),
                id,
            })
            .collect()
    }

    fn child_from_path(&self, path: &str) -> Option<Self> {
        self.children()
            .into_iter()
            .find(|child| child.spec().name.as_deref() == Some(path))
    }

    fn property(&self, key: &str) -> Option<String> {
        self.spec().properties.get(key).cloned()
    }

    fn is_platform_device(&self) -> bool {
        self.spec().path.is_some()
    }
}

/// Interest registered on a [`DeviceTree`] node
///
/// Dropping the notifier removes the interest.
pub struct TreeNotifier {
    tree: Arc<TreeInner>,
    token: u64,
}

impl fmt::Debug for TreeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeNotifier({})", self.token)
    }
}

impl NotifierHandle for TreeNotifier {
    fn remove(self) {
        drop(self);
    }
}

impl Drop for TreeNotifier {
    fn drop(&mut self) {
        let token = self.token;
        self.tree.interests().retain(|interest| interest.token != token);
        debug!("Removed interest {}", token);
    }
}
