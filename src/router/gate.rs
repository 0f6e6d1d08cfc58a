// SPDX-License-Identifier: GPL-3.0-only
//! Serialized execution context for the router
//!
//! The gate owns the [`KeyRouter`] on one tokio task and drains a single
//! mailbox. Hardware notifications and consumer presence changes arrive from
//! whatever thread the registry or the directory calls back on; all of them
//! are queued here and handled strictly one after the other.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{KeyRouter, RouterOutcome};
use crate::consumers::{PresenceCallback, PresenceEvent};
use crate::error::{Error, Result};
use crate::keyboard::KeyboardOutput;
use crate::registry::{HardwareMessage, NotificationCallback};

enum Command {
    Hardware {
        message: HardwareMessage,
        reply: Option<oneshot::Sender<Option<RouterOutcome>>>,
    },
    Presence {
        event: PresenceEvent,
        reply: Option<oneshot::Sender<bool>>,
    },
    ConsumerCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Typed handle into the gate
///
/// Cheap to clone; this is what registration APIs get instead of a pointer
/// to the service.
#[derive(Clone, Debug)]
pub struct RouterHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RouterHandle {
    /// Queue a hardware message without waiting for the outcome
    ///
    /// Returns `false` once the gate is gone.
    pub fn post(&self, message: HardwareMessage) -> bool {
        self.tx
            .send(Command::Hardware {
                message,
                reply: None,
            })
            .is_ok()
    }

    /// Route a hardware message and wait for the outcome
    pub async fn notify(&self, message: HardwareMessage) -> Result<Option<RouterOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Hardware {
                message,
                reply: Some(reply),
            })
            .map_err(|_| Error::GateClosed)?;
        rx.await.map_err(|_| Error::GateClosed)
    }

    /// Queue a presence change without waiting
    pub fn post_presence(&self, event: PresenceEvent) -> bool {
        self.tx
            .send(Command::Presence { event, reply: None })
            .is_ok()
    }

    /// Apply a presence change and wait; returns whether the live set changed
    pub async fn presence(&self, event: PresenceEvent) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Presence {
                event,
                reply: Some(reply),
            })
            .map_err(|_| Error::GateClosed)?;
        rx.await.map_err(|_| Error::GateClosed)
    }

    /// Number of consumers currently present
    pub async fn consumer_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ConsumerCount { reply })
            .map_err(|_| Error::GateClosed)?;
        rx.await.map_err(|_| Error::GateClosed)
    }

    /// Registry callback feeding this gate
    pub fn notification_callback(&self) -> NotificationCallback {
        let handle = self.clone();
        Arc::new(move |message: HardwareMessage| {
            if !handle.post(message) {
                debug!("Dropping notification, event gate is closed");
            }
        })
    }

    /// Directory callback feeding this gate
    pub fn presence_callback(&self) -> PresenceCallback {
        let handle = self.clone();
        Arc::new(move |event: PresenceEvent| {
            if !handle.post_presence(event) {
                debug!("Dropping presence change, event gate is closed");
            }
        })
    }
}

/// Running gate
pub struct EventGate<K> {
    handle: RouterHandle,
    task: JoinHandle<KeyRouter<K>>,
}

impl<K> std::fmt::Debug for EventGate<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventGate(finished: {})", self.task.is_finished())
    }
}

impl<K: KeyboardOutput> EventGate<K> {
    /// Start the gate on the current tokio runtime
    pub fn spawn(router: KeyRouter<K>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::ExecutionContext(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run(router, rx));
        debug!("Event gate started");
        Ok(Self {
            handle: RouterHandle { tx },
            task,
        })
    }

    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    /// Stop the gate after everything queued so far, returning the router
    pub async fn shutdown(self) -> Result<KeyRouter<K>> {
        // A send error means the task already ended; join it all the same.
        let _ = self.handle.tx.send(Command::Shutdown);
        self.task
            .await
            .map_err(|e| Error::ExecutionContext(format!("event gate task failed: {}", e)))
    }
}

async fn run<K: KeyboardOutput>(
    mut router: KeyRouter<K>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) -> KeyRouter<K> {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Hardware { message, reply } => {
                let outcome = router.handle_message(&message);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Command::Presence { event, reply } => {
                let changed = match event {
                    PresenceEvent::Published(component) => router.on_published(component),
                    PresenceEvent::Terminated(id) => router.on_terminated(id),
                };
                if let Some(reply) = reply {
                    let _ = reply.send(changed);
                }
            }
            Command::ConsumerCount { reply } => {
                let _ = reply.send(router.consumers().len());
            }
            Command::Shutdown => break,
        }
    }
    debug!("Event gate stopped");
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{Log, Record, RecordingKeyboard, consumers};
    use crate::router::{BRIGHTNESS_CYCLE, BRIGHTNESS_DOWN, BRIGHTNESS_UP};
    use crate::state::PublishedState;
    use std::sync::Arc;

    fn gate(log: &Log) -> EventGate<RecordingKeyboard> {
        let router = KeyRouter::new(
            RecordingKeyboard {
                log: Arc::clone(log),
            },
            Arc::new(PublishedState::new()),
        );
        EventGate::spawn(router).unwrap()
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let log: Log = Arc::default();
        let router = KeyRouter::new(
            RecordingKeyboard {
                log: Arc::clone(&log),
            },
            Arc::new(PublishedState::new()),
        );
        assert!(matches!(
            EventGate::spawn(router),
            Err(Error::ExecutionContext(_))
        ));
    }

    #[tokio::test]
    async fn test_notify_returns_outcome() {
        let log: Log = Arc::default();
        let gate = gate(&log);
        let handle = gate.handle();

        let up = HardwareMessage::device_notification("DD1F", BRIGHTNESS_UP);
        assert_eq!(handle.notify(up).await.unwrap(), Some(RouterOutcome::UpHandled));
        let cycle = HardwareMessage::device_notification("DD1F", BRIGHTNESS_CYCLE);
        assert_eq!(
            handle.notify(cycle).await.unwrap(),
            Some(RouterOutcome::Unimplemented(BRIGHTNESS_CYCLE))
        );

        gate.shutdown().await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commands_run_in_mailbox_order() {
        let log: Log = Arc::default();
        let gate = gate(&log);
        let handle = gate.handle();
        let components = consumers(&log, &[("claimer", true)]);

        // Posted back to back: the key before the publication is typed, the
        // one after it is claimed, the one after termination is typed again.
        assert!(handle.post(HardwareMessage::device_notification("DD1F", BRIGHTNESS_UP)));
        assert!(handle.post_presence(PresenceEvent::Published(components[0].clone())));
        assert!(handle.post(HardwareMessage::device_notification("DD1F", BRIGHTNESS_DOWN)));
        assert!(handle.post_presence(PresenceEvent::Terminated(components[0].id())));
        assert!(handle.post(HardwareMessage::device_notification("DD1F", BRIGHTNESS_DOWN)));

        let router = gate.shutdown().await.unwrap();
        assert!(router.consumers().is_empty());

        let emits: Vec<_> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Record::Emit { key, going_down } => Some((*key, *going_down)),
                _ => None,
            })
            .collect();
        use crate::keyboard::BrightnessKey::{Down, Up};
        assert_eq!(emits, vec![(Up, true), (Up, false), (Down, true), (Down, false)]);
    }

    #[tokio::test]
    async fn test_presence_through_callbacks() {
        let log: Log = Arc::default();
        let gate = gate(&log);
        let handle = gate.handle();
        let components = consumers(&log, &[("a", false), ("b", false)]);

        let callback = handle.presence_callback();
        callback(PresenceEvent::Published(components[0].clone()));
        callback(PresenceEvent::Published(components[1].clone()));
        callback(PresenceEvent::Published(components[0].clone()));
        assert_eq!(handle.consumer_count().await.unwrap(), 2);

        assert!(handle.presence(PresenceEvent::Terminated(components[0].id())).await.unwrap());
        assert!(!handle.presence(PresenceEvent::Terminated(components[0].id())).await.unwrap());
        assert_eq!(handle.consumer_count().await.unwrap(), 1);

        gate.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let log: Log = Arc::default();
        let gate = gate(&log);
        let handle = gate.handle();
        gate.shutdown().await.unwrap();

        assert!(!handle.post(HardwareMessage::device_notification("DD1F", BRIGHTNESS_UP)));
        assert!(matches!(
            handle
                .notify(HardwareMessage::device_notification("DD1F", BRIGHTNESS_UP))
                .await,
            Err(Error::GateClosed)
        ));
        assert!(log.lock().unwrap().is_empty());
    }
}
