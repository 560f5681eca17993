//! Named-topic event bus between producers (collector, sidecars, tray) and
//! the presentation layer.
//!
//! The bus also owns the latest-value store: one slot per module id holding
//! the last published payload plus its rolling numeric history. A new
//! `data-update` replaces the slot's payload wholesale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::config::{ConfigDelta, WindowMode};
use super::history::{RollingWindow, DEFAULT_HISTORY_SIZE};
use super::protocol::{DataPayload, UpdateEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    DataUpdate,
    ConfigUpdate,
    ModeChange,
    OpenSettings,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::DataUpdate,
        Topic::ConfigUpdate,
        Topic::ModeChange,
        Topic::OpenSettings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Topic::DataUpdate => "data-update",
            Topic::ConfigUpdate => "config-update",
            Topic::ModeChange => "mode-change",
            Topic::OpenSettings => "open-settings",
        }
    }

    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Payload of `mode-change`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_mode: Option<WindowMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_mode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "kebab-case")]
pub enum HudEvent {
    DataUpdate(UpdateEvent),
    ConfigUpdate(ConfigDelta),
    ModeChange(ModeChange),
    OpenSettings,
}

impl HudEvent {
    pub fn topic(&self) -> Topic {
        match self {
            HudEvent::DataUpdate(_) => Topic::DataUpdate,
            HudEvent::ConfigUpdate(_) => Topic::ConfigUpdate,
            HudEvent::ModeChange(_) => Topic::ModeChange,
            HudEvent::OpenSettings => Topic::OpenSettings,
        }
    }
}

struct Slot {
    payload: DataPayload,
    history: RollingWindow,
}

type Subscribers = HashMap<Topic, Vec<(u64, mpsc::UnboundedSender<HudEvent>)>>;

struct Inner {
    subscribers: Mutex<Subscribers>,
    next_subscriber: AtomicU64,
    latest: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl Inner {
    fn remove_subscriber(&self, topic: Topic, id: u64) {
        if let Some(list) = self.subscribers.lock().get_mut(&topic) {
            list.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    fn deliver(&self, event: HudEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(&event.topic()) else {
            return 0;
        };
        // Closed receivers are pruned on the way.
        list.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        list.len()
    }
}

/// Cheap to clone; all clones share subscribers and the latest-value store.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                latest: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .entry(topic)
            .or_default()
            .push((id, tx));

        Subscription {
            rx,
            handle: SubscriptionHandle {
                id,
                topic,
                bus: Arc::downgrade(&self.inner),
            },
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Fire-and-forget. Returns how many subscribers received the event.
    pub fn publish(&self, event: HudEvent) -> usize {
        match event {
            HudEvent::DataUpdate(update) => self.publish_data(update),
            other => self.inner.deliver(other),
        }
    }

    pub fn publish_data(&self, update: UpdateEvent) -> usize {
        self.publish_data_with_history(update, DEFAULT_HISTORY_SIZE)
    }

    /// Replace the slot for `update.id` and fan the event out.
    ///
    /// Delivery happens under the slot lock so two publishes for the same id
    /// reach subscribers in the same order they hit the store.
    pub fn publish_data_with_history(&self, update: UpdateEvent, history_capacity: usize) -> usize {
        let slot = self.slot(&update.id, history_capacity);
        let mut slot = slot.lock();

        if slot.history.capacity() != history_capacity.max(1) {
            slot.history.set_capacity(history_capacity);
        }
        if !update.data.is_offline() {
            if let Some(value) = update.data.numeric_value() {
                slot.history.push(value);
            }
        }
        slot.payload = update.data.clone();

        self.inner.deliver(HudEvent::DataUpdate(update))
    }

    fn slot(&self, id: &str, history_capacity: usize) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.inner.latest.read().get(id) {
            return slot.clone();
        }
        self.inner
            .latest
            .write()
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    payload: DataPayload::default(),
                    history: RollingWindow::with_capacity(history_capacity),
                }))
            })
            .clone()
    }

    /// Last published payload for every id (initial paint, late subscribers).
    pub fn snapshot(&self) -> HashMap<String, DataPayload> {
        let slots: Vec<(String, Arc<Mutex<Slot>>)> = self
            .inner
            .latest
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        slots
            .into_iter()
            .map(|(id, slot)| {
                let payload = slot.lock().payload.clone();
                (id, payload)
            })
            .collect()
    }

    pub fn latest(&self, id: &str) -> Option<DataPayload> {
        let slot = self.inner.latest.read().get(id).cloned()?;
        let payload = slot.lock().payload.clone();
        Some(payload)
    }

    pub fn history(&self, id: &str) -> Vec<f64> {
        match self.inner.latest.read().get(id).cloned() {
            Some(slot) => slot.lock().history.to_vec(),
            None => Vec::new(),
        }
    }

    /// Drop the stored value for `id`. Returns whether one existed.
    pub fn forget(&self, id: &str) -> bool {
        self.inner.latest.write().remove(id).is_some()
    }

    pub fn clear(&self) {
        self.inner.latest.write().clear();
    }
}

/// Cancellation handle. Cancelling is idempotent and safe after the bus is gone.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    topic: Topic,
    bus: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn cancel(&self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.remove_subscriber(self.topic, self.id);
        }
    }
}

/// Receiving end of one topic. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<HudEvent>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub async fn recv(&mut self) -> Option<HudEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HudEvent> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(&self) {
        self.handle.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
