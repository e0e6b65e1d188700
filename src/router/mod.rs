//! Input routing: per-layer subscriber queues for keyboard and pointer events
//!
//! The router fans raw events from the host's input source out to whichever
//! streams are subscribed to the event's target layer. Each subscription is an
//! independent cancellable channel with a bounded drop-oldest buffer, so a
//! slow or absent subscriber never stalls delivery to other subscribers or to
//! future dispatch calls. Live input is best-effort/most-recent by nature.

use crate::error::{ScrimError, ScrimResult};
use crate::placement::KeyboardInteractivity;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Event class a subscription is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Keyboard,
    Pointer,
}

/// Modifier key state attached to keyboard events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default, rename = "super")]
    pub super_key: bool,
}

/// Keyboard key press/release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_code: u32,
    pub modifiers: Modifiers,
    pub pressed: bool,
}

/// Pointer button press/release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub button_code: u32,
    pub pressed: bool,
}

/// An input event after class resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Keyboard(KeyEvent),
    Pointer(PointerEvent),
}

impl InputEvent {
    pub fn class(&self) -> EventClass {
        match self {
            InputEvent::Keyboard(_) => EventClass::Keyboard,
            InputEvent::Pointer(_) => EventClass::Pointer,
        }
    }
}

/// A raw event from the host's input source, tagged with the layer the host
/// attributes it to (keyboard focus or pointer hit-test result)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub target: u64,
    pub event: InputEvent,
}

/// Shared state between a subscription's producer and consumer halves
struct SubscriptionInner {
    queue: Mutex<VecDeque<InputEvent>>,
    notify: Notify,
    /// Set when the owning layer closes; the stream drains and then ends
    closed: AtomicBool,
    /// Set when the consumer dropped its stream; the entry is pruned lazily
    detached: AtomicBool,
    capacity: usize,
}

impl SubscriptionInner {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue an event, dropping the oldest entry on overflow
    fn push(&self, event: InputEvent) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                trace!("📥 Input queue full, dropped oldest event");
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Consumer half of an input subscription
///
/// A lazy, unbounded-duration sequence of events of one class, restricted to
/// the subscribed layer. `recv` returns `None` (end-of-stream, not an error)
/// when the layer closes; dropping the stream cancels the subscription.
pub struct InputStream {
    inner: Arc<SubscriptionInner>,
}

impl InputStream {
    /// Receive the next event, waiting until one arrives or the stream ends
    pub async fn recv(&mut self) -> Option<InputEvent> {
        loop {
            {
                let mut queue = self.inner.queue.lock();
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                // Only end the stream once the queue has drained
                if self.inner.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Receive without waiting; `None` means "nothing queued right now"
    pub fn try_recv(&mut self) -> Option<InputEvent> {
        self.inner.queue.lock().pop_front()
    }

    /// Whether the owning layer has closed this stream
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        // Outstanding dispatch to a cancelled subscription is discarded
        self.inner.detached.store(true, Ordering::Release);
    }
}

/// Producer-side record of one subscription
struct Subscription {
    id: u64,
    class: EventClass,
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    fn is_live(&self) -> bool {
        !self.inner.detached.load(Ordering::Acquire)
    }
}

/// Fans host input events out to per-layer subscriber streams
pub struct InputRouter {
    /// Bounded per-subscription buffer size
    queue_capacity: usize,

    /// Keyboard policy of every live layer, maintained by the registry
    layers: RwLock<HashMap<u64, KeyboardInteractivity>>,

    /// Live subscriptions keyed by layer id
    subscriptions: RwLock<HashMap<u64, Vec<Subscription>>>,

    /// Next subscription id, for logging only
    next_subscription_id: AtomicU64,
}

impl InputRouter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            layers: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Register a freshly created layer with its keyboard policy
    pub fn register_layer(&self, layer_id: u64, keyboard: KeyboardInteractivity) {
        self.layers.write().insert(layer_id, keyboard);
        debug!(
            "🛰️ Router tracking layer {} (keyboard: {})",
            layer_id,
            keyboard.as_str()
        );
    }

    /// Update a live layer's keyboard policy after a reconfigure
    pub fn set_keyboard_interactivity(&self, layer_id: u64, keyboard: KeyboardInteractivity) {
        if let Some(entry) = self.layers.write().get_mut(&layer_id) {
            *entry = keyboard;
        }
    }

    /// Open an event stream for one (layer, class) pair
    ///
    /// Multiple subscriptions for the same pair are tolerated; each receives
    /// its own copy of every matching event.
    pub fn subscribe(&self, layer_id: u64, class: EventClass) -> ScrimResult<InputStream> {
        let keyboard = {
            let layers = self.layers.read();
            *layers.get(&layer_id).ok_or(ScrimError::NotFound(layer_id))?
        };

        if class == EventClass::Keyboard && keyboard == KeyboardInteractivity::None {
            return Err(ScrimError::FailedPrecondition(format!(
                "layer {} does not accept keyboard focus",
                layer_id
            )));
        }

        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(SubscriptionInner::new(self.queue_capacity));

        self.subscriptions
            .write()
            .entry(layer_id)
            .or_default()
            .push(Subscription {
                id,
                class,
                inner: Arc::clone(&inner),
            });

        debug!(
            "🎧 Subscription {} opened for layer {} ({:?})",
            id, layer_id, class
        );
        Ok(InputStream { inner })
    }

    /// Fan a raw host event out to every live matching subscription
    ///
    /// An event with no matching subscription is dropped without error, and
    /// dispatch never blocks on a slow consumer.
    pub fn dispatch(&self, raw: RawInputEvent) {
        let class = raw.event.class();
        let mut subscriptions = self.subscriptions.write();

        let Some(entries) = subscriptions.get_mut(&raw.target) else {
            trace!("📭 No subscriptions for layer {}, event dropped", raw.target);
            return;
        };

        // Prune subscriptions whose consumer went away
        entries.retain(|sub| {
            if sub.is_live() {
                true
            } else {
                debug!("🗑️ Pruned cancelled subscription {}", sub.id);
                false
            }
        });

        let mut delivered = 0usize;
        for sub in entries.iter().filter(|s| s.class == class) {
            sub.inner.push(raw.event);
            delivered += 1;
        }

        if delivered == 0 {
            trace!(
                "📭 No {:?} subscription on layer {}, event dropped",
                class,
                raw.target
            );
        }
    }

    /// Forcibly end all of a layer's subscriptions with graceful end-of-stream
    pub fn close_layer(&self, layer_id: u64) {
        self.layers.write().remove(&layer_id);

        if let Some(entries) = self.subscriptions.write().remove(&layer_id) {
            for sub in &entries {
                sub.inner.close();
            }
            if !entries.is_empty() {
                debug!(
                    "🔚 Ended {} subscription(s) for closed layer {}",
                    entries.len(),
                    layer_id
                );
            }
        }
    }

    /// Number of live subscriptions for a layer, across both classes
    pub fn subscription_count(&self, layer_id: u64) -> usize {
        self.subscriptions
            .read()
            .get(&layer_id)
            .map(|entries| entries.iter().filter(|s| s.is_live()).count())
            .unwrap_or(0)
    }

    pub fn shutdown(&self) {
        let layer_ids: Vec<u64> = self.layers.read().keys().copied().collect();
        for id in layer_ids {
            self.close_layer(id);
        }
        warn!("🔌 Input router shut down, all streams ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u32, pressed: bool) -> InputEvent {
        InputEvent::Keyboard(KeyEvent {
            key_code: code,
            modifiers: Modifiers::default(),
            pressed,
        })
    }

    fn button(code: u32, pressed: bool) -> InputEvent {
        InputEvent::Pointer(PointerEvent {
            button_code: code,
            pressed,
        })
    }

    #[test]
    fn test_subscribe_unknown_layer_fails() {
        let router = InputRouter::new(8);
        let err = router.subscribe(99, EventClass::Pointer).err().unwrap();
        assert_eq!(err, ScrimError::NotFound(99));
    }

    #[test]
    fn test_keyboard_policy_gates_keyboard_streams() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::None);

        let err = router.subscribe(1, EventClass::Keyboard).err().unwrap();
        assert!(matches!(err, ScrimError::FailedPrecondition(_)));

        // Pointer streams are always satisfiable
        assert!(router.subscribe(1, EventClass::Pointer).is_ok());
    }

    #[test]
    fn test_dispatch_without_subscribers_is_silent() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        // Must not panic or accumulate state
        router.dispatch(RawInputEvent {
            target: 1,
            event: key(30, true),
        });
        router.dispatch(RawInputEvent {
            target: 42,
            event: button(272, true),
        });
        assert_eq!(router.subscription_count(1), 0);
    }

    #[tokio::test]
    async fn test_events_reach_matching_subscription() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        let mut keyboard = router.subscribe(1, EventClass::Keyboard).unwrap();
        let mut pointer = router.subscribe(1, EventClass::Pointer).unwrap();

        router.dispatch(RawInputEvent {
            target: 1,
            event: key(30, true),
        });
        router.dispatch(RawInputEvent {
            target: 1,
            event: button(272, true),
        });

        assert_eq!(keyboard.recv().await, Some(key(30, true)));
        assert_eq!(pointer.recv().await, Some(button(272, true)));
        // Class filtering: the keyboard stream never sees the button event
        assert_eq!(keyboard.try_recv(), None);
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_each_get_a_copy() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        let mut first = router.subscribe(1, EventClass::Keyboard).unwrap();
        let mut second = router.subscribe(1, EventClass::Keyboard).unwrap();

        router.dispatch(RawInputEvent {
            target: 1,
            event: key(16, true),
        });

        assert_eq!(first.recv().await, Some(key(16, true)));
        assert_eq!(second.recv().await, Some(key(16, true)));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let router = InputRouter::new(2);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        let mut stream = router.subscribe(1, EventClass::Keyboard).unwrap();

        for code in [1, 2, 3] {
            router.dispatch(RawInputEvent {
                target: 1,
                event: key(code, true),
            });
        }

        // Oldest event (code 1) was dropped on overflow
        assert_eq!(stream.try_recv(), Some(key(2, true)));
        assert_eq!(stream.try_recv(), Some(key(3, true)));
        assert_eq!(stream.try_recv(), None);
    }

    #[tokio::test]
    async fn test_close_layer_drains_then_ends_stream() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        let mut stream = router.subscribe(1, EventClass::Keyboard).unwrap();
        router.dispatch(RawInputEvent {
            target: 1,
            event: key(57, true),
        });

        router.close_layer(1);

        // Queued event still delivered, then graceful end-of-stream
        assert_eq!(stream.recv().await, Some(key(57, true)));
        assert_eq!(stream.recv().await, None);
        assert!(stream.is_closed());
    }

    #[test]
    fn test_dropped_stream_is_pruned_on_dispatch() {
        let router = InputRouter::new(8);
        router.register_layer(1, KeyboardInteractivity::OnDemand);

        let stream = router.subscribe(1, EventClass::Keyboard).unwrap();
        assert_eq!(router.subscription_count(1), 1);
        drop(stream);

        router.dispatch(RawInputEvent {
            target: 1,
            event: key(30, true),
        });
        assert_eq!(router.subscription_count(1), 0);
    }
}
