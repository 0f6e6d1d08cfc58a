// SPDX-License-Identifier: GPL-3.0-only
//! Service lifecycle
//!
//! Wires the pieces together: one event gate owning the router, a presence
//! watch feeding consumers into it, and an interest registration on every
//! resolved panel feeding hardware notifications into it.

use std::sync::Arc;

use crate::config::Config;
use crate::consumers::{ComponentDirectory, PresenceWatch};
use crate::error::{Error, Result};
use crate::keyboard::KeyboardOutput;
use crate::panel::resolver::resolve;
use crate::panel::{PanelSlot, PlatformVideo};
use crate::registry::{DeviceRegistry, NotifierHandle, RegistryEntry};
use crate::router::KeyRouter;
use crate::router::gate::{EventGate, RouterHandle};
use crate::state::{PanelRecord, PublishedState};

/// Interest held on one panel
///
/// The notifier is removed before the device handle goes away, whether the
/// registration is released through [`BrightnessKeys::stop`] or dropped.
struct PanelRegistration<R: DeviceRegistry> {
    notifier: Option<R::Notifier>,
    device: R::Entry,
    slot: PanelSlot,
}

impl<R: DeviceRegistry> PanelRegistration<R> {
    fn record(&self) -> PanelRecord {
        PanelRecord {
            slot: self.slot.to_string(),
            name: self.device.name().unwrap_or_default(),
        }
    }

    fn release(mut self) {
        if let Some(notifier) = self.notifier.take() {
            notifier.remove();
            debug!("Removed interest on {} panel {:?}", self.slot, self.device.name());
        }
    }
}

impl<R: DeviceRegistry> Drop for PanelRegistration<R> {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            notifier.remove();
        }
    }
}

/// Running brightness key service
pub struct BrightnessKeys<R: DeviceRegistry, K> {
    registrations: Vec<PanelRegistration<R>>,
    watch: Option<PresenceWatch>,
    gate: EventGate<K>,
    state: Arc<PublishedState>,
}

impl<R: DeviceRegistry, K> std::fmt::Debug for BrightnessKeys<R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrightnessKeys")
            .field("panels", &self.state.panels())
            .field("gate", &self.gate)
            .finish()
    }
}

impl<R: DeviceRegistry, K: KeyboardOutput> BrightnessKeys<R, K> {
    /// Start routing brightness notifications
    ///
    /// Must be called from within a tokio runtime. Fails if the gate or the
    /// presence watch cannot be set up, or if not a single panel accepts an
    /// interest registration; in every failure case whatever was already
    /// acquired is released before returning.
    pub async fn start(
        registry: &R,
        video: &PlatformVideo<R::Entry>,
        directory: &ComponentDirectory,
        keyboard: K,
        config: &Config,
    ) -> Result<Self> {
        let state = Arc::new(PublishedState::new());
        let gate = EventGate::spawn(KeyRouter::new(keyboard, Arc::clone(&state)))?;
        let handle = gate.handle();

        let watch = match directory.watch(&config.interest_marker, handle.presence_callback()) {
            Ok(watch) => watch,
            Err(e) => {
                error!("Failed to watch for consumers: {}", e);
                let _ = gate.shutdown().await;
                return Err(e);
            }
        };

        let registrations = register_panels(registry, video, &handle);
        if registrations.is_empty() {
            error!("Unable to register any interests for video notifications");
            watch.remove();
            let _ = gate.shutdown().await;
            return Err(Error::NoEventSource);
        }

        state.set_panels(registrations.iter().map(PanelRegistration::record).collect());
        info!(
            "Brightness keys v{} started with {} panel(s)",
            state.version(),
            registrations.len()
        );

        Ok(Self {
            registrations,
            watch: Some(watch),
            gate,
            state,
        })
    }

    pub fn handle(&self) -> RouterHandle {
        self.gate.handle()
    }

    pub fn state(&self) -> &Arc<PublishedState> {
        &self.state
    }

    /// Release every registration, then the watch, then the gate
    ///
    /// Returns the keyboard once the gate has drained its mailbox.
    pub async fn stop(self) -> Result<K> {
        let Self {
            registrations,
            watch,
            gate,
            ..
        } = self;

        for registration in registrations {
            registration.release();
        }
        if let Some(watch) = watch {
            watch.remove();
        }

        let router = gate.shutdown().await?;
        info!("Brightness keys stopped");
        Ok(router.into_keyboard())
    }
}

/// Register interest on every resolved panel, skipping those that refuse
fn register_panels<R: DeviceRegistry>(
    registry: &R,
    video: &PlatformVideo<R::Entry>,
    handle: &RouterHandle,
) -> Vec<PanelRegistration<R>> {
    let mut registrations = Vec::new();

    for (slot, device) in resolve(registry, video).into_slots() {
        match registry.register_interest(&device, handle.notification_callback()) {
            Ok(notifier) => {
                info!("Listening on {} panel {:?}", slot, device.name());
                registrations.push(PanelRegistration {
                    notifier: Some(notifier),
                    device,
                    slot,
                });
            }
            Err(e) => warn!("Skipping {} panel: {}", slot, e),
        }
    }

    registrations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::Component;
    use crate::keyboard::BrightnessKey::{Down, Up};
    use crate::panel::DEFAULT_PANEL_PATH;
    use crate::registry::tree::{DeviceNode, DeviceTree, DeviceTreeBuilder, NodeId, NodeSpec, TreeNotifier};
    use crate::registry::{ACPI_PATH_PROPERTY, HardwareMessage, NotificationCallback};
    use crate::router::tests::{Log, Record, RecordingConsumer, RecordingKeyboard};
    use crate::router::{BRIGHTNESS_DOWN, BRIGHTNESS_UP};

    fn output(builder: &mut DeviceTreeBuilder, video: NodeId, name: &str, adr: &str) -> NodeId {
        let path = format!("\\_SB.PCI0.GFX0.{}", name);
        builder.child(
            video,
            NodeSpec::new(name)
                .location(adr)
                .property(ACPI_PATH_PROPERTY, path.clone()),
        );
        builder.root(NodeSpec::new(name).platform(path))
    }

    /// Integrated controller with an untyped DD1F and DD02, plus one discrete
    /// adapter with a typed panel
    fn hybrid() -> (DeviceTree, PlatformVideo<DeviceNode>) {
        let mut builder = DeviceTreeBuilder::new();
        let gfx = builder.root(NodeSpec::new("GFX0"));
        output(&mut builder, gfx, "DD1F", "1f");
        output(&mut builder, gfx, "DD02", "2");
        let peg = builder.root(NodeSpec::new("PEG0"));
        output(&mut builder, peg, "LCD0", "400");
        let tree = builder.build();
        let video = PlatformVideo {
            builtin: Some(tree.node(gfx)),
            external: vec![tree.node(peg)],
        };
        (tree, video)
    }

    /// Tree registry refusing interest on the named devices
    struct Refusing {
        tree: DeviceTree,
        refuse: Vec<&'static str>,
    }

    impl DeviceRegistry for Refusing {
        type Entry = DeviceNode;
        type Notifier = TreeNotifier;

        fn from_path(&self, path: &str) -> Option<DeviceNode> {
            self.tree.from_path(path)
        }

        fn register_interest(
            &self,
            device: &DeviceNode,
            callback: NotificationCallback,
        ) -> Result<TreeNotifier> {
            let name = device.name().unwrap_or_default();
            if self.refuse.contains(&name.as_str()) {
                return Err(Error::Registration {
                    device: name,
                    reason: "refused".to_string(),
                });
            }
            self.tree.register_interest(device, callback)
        }
    }

    fn keyboard(log: &Log) -> RecordingKeyboard {
        RecordingKeyboard {
            log: Arc::clone(log),
        }
    }

    fn emits(log: &Log) -> Vec<(crate::keyboard::BrightnessKey, bool)> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Record::Emit { key, going_down } => Some((*key, *going_down)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_start_registers_every_panel() {
        let (tree, video) = hybrid();
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();

        let service = BrightnessKeys::start(&tree, &video, &directory, keyboard(&log), &Config::default())
            .await
            .unwrap();

        assert_eq!(tree.interest_count(), 3);
        let panels: Vec<_> = service
            .state()
            .panels()
            .iter()
            .map(|p| (p.slot.clone(), p.name.clone()))
            .collect();
        assert_eq!(
            panels,
            vec![
                (PanelSlot::Primary.to_string(), "DD1F".to_string()),
                (PanelSlot::Fallback.to_string(), "DD02".to_string()),
                (PanelSlot::Discrete(0).to_string(), "LCD0".to_string()),
            ]
        );

        service.stop().await.unwrap();
        assert_eq!(tree.interest_count(), 0);
    }

    #[tokio::test]
    async fn test_notifications_reach_keyboard() {
        let (tree, video) = hybrid();
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();
        let service = BrightnessKeys::start(&tree, &video, &directory, keyboard(&log), &Config::default())
            .await
            .unwrap();

        assert_eq!(
            tree.notify_source(DEFAULT_PANEL_PATH, HardwareMessage::device_notification(DEFAULT_PANEL_PATH, BRIGHTNESS_UP)),
            1
        );
        tree.notify_source("LCD0", HardwareMessage::device_notification("LCD0", BRIGHTNESS_DOWN));

        let state = Arc::clone(service.state());
        service.stop().await.unwrap();

        assert_eq!(emits(&log), vec![(Up, true), (Up, false), (Down, true), (Down, false)]);
        let first = state.first_event().unwrap();
        assert_eq!(first.panel, DEFAULT_PANEL_PATH);
        assert!(!first.consumer_routed);
    }

    #[tokio::test]
    async fn test_consumer_published_after_start_claims_keys() {
        let (tree, video) = hybrid();
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();
        let config = Config::default();
        let service = BrightnessKeys::start(&tree, &video, &directory, keyboard(&log), &config)
            .await
            .unwrap();

        let receiver = RecordingConsumer {
            name: "osd".to_string(),
            claims: true,
            log: Arc::clone(&log),
        };
        directory.publish(Component::new("osd", Arc::new(receiver)).with_marker(&config.interest_marker));
        // Components without the marker are never routed to.
        let other = RecordingConsumer {
            name: "other".to_string(),
            claims: false,
            log: Arc::clone(&log),
        };
        directory.publish(Component::new("other", Arc::new(other)));

        let handle = service.handle();
        assert_eq!(handle.consumer_count().await.unwrap(), 1);
        tree.notify_source("DD02", HardwareMessage::device_notification("DD02", BRIGHTNESS_UP));
        assert_eq!(handle.consumer_count().await.unwrap(), 1);

        service.stop().await.unwrap();
        assert!(emits(&log).is_empty());
        assert!(log.lock().unwrap().iter().all(|r| match r {
            Record::KeyTime(name) => name == "osd",
            Record::Notice { consumer, .. } => consumer == "osd",
            Record::Emit { .. } => false,
        }));
    }

    #[tokio::test]
    async fn test_partial_registration_failure() {
        let (tree, video) = hybrid();
        let registry = Refusing {
            tree: tree.clone(),
            refuse: vec!["DD1F", "LCD0"],
        };
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();

        let service = BrightnessKeys::start(&registry, &video, &directory, keyboard(&log), &Config::default())
            .await
            .unwrap();
        assert_eq!(tree.interest_count(), 1);
        assert_eq!(service.state().panels().len(), 1);
        assert_eq!(service.state().panels()[0].name, "DD02");

        service.stop().await.unwrap();
        assert_eq!(tree.interest_count(), 0);
    }

    #[tokio::test]
    async fn test_no_event_source_releases_everything() {
        let (tree, video) = hybrid();
        let registry = Refusing {
            tree: tree.clone(),
            refuse: vec!["DD1F", "DD02", "LCD0"],
        };
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();

        let result =
            BrightnessKeys::start(&registry, &video, &directory, keyboard(&log), &Config::default()).await;
        assert!(matches!(result, Err(Error::NoEventSource)));
        assert_eq!(tree.interest_count(), 0);
        assert_eq!(directory.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_resolved_is_fatal() {
        let tree = DeviceTreeBuilder::new().build();
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();

        let result = BrightnessKeys::start(
            &tree,
            &PlatformVideo::default(),
            &directory,
            keyboard(&log),
            &Config::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::NoEventSource)));
    }

    #[tokio::test]
    async fn test_dropping_service_removes_interests() {
        let (tree, video) = hybrid();
        let log: Log = Arc::default();
        let directory = ComponentDirectory::new();
        let service = BrightnessKeys::start(&tree, &video, &directory, keyboard(&log), &Config::default())
            .await
            .unwrap();
        assert_eq!(directory.watch_count(), 1);

        drop(service);
        assert_eq!(tree.interest_count(), 0);
        assert_eq!(directory.watch_count(), 0);
    }
}
