//! Notification bus: "queue changed" and "stats changed" listeners.
//!
//! Delivery is synchronous on the thread that published. Only one dispatch
//! runs at a time; a publish that arrives during a dispatch (from another
//! thread, or from a listener calling back into the queue) marks the bus
//! dirty and the running dispatcher delivers a fresh snapshot when it is
//! done. Listeners never see a snapshot older than one already delivered,
//! and the state after the last mutation is always delivered.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::stats::StatsSnapshot;
use crate::store::QueueSnapshot;

type QueueListener = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;
type StatsListener = Arc<dyn Fn(&StatsSnapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    queue: BTreeMap<u64, QueueListener>,
    stats: BTreeMap<u64, StatsListener>,
}

#[derive(Default)]
struct BusInner {
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
    dispatch: Mutex<()>,
    dirty: AtomicBool,
}

/// Listener registry shared by the queue manager.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Clone, Copy)]
enum Kind {
    Queue,
    Stats,
}

/// Handle returned by `subscribe_*`; call [`Subscription::unsubscribe`] to stop delivery.
/// Dropping the handle keeps the listener registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
    kind: Kind,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut listeners = bus.listeners.write().unwrap_or_else(|e| e.into_inner());
        match self.kind {
            Kind::Queue => {
                listeners.queue.remove(&self.id);
            }
            Kind::Stats => {
                listeners.stats.remove(&self.id);
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_queue(
        &self,
        listener: impl Fn(&QueueSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .queue
            .insert(id, Arc::new(listener));
        self.subscription(id, Kind::Queue)
    }

    pub fn subscribe_stats(
        &self,
        listener: impl Fn(&StatsSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .stats
            .insert(id, Arc::new(listener));
        self.subscription(id, Kind::Stats)
    }

    fn subscription(&self, id: u64, kind: Kind) -> Subscription {
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            kind,
        }
    }

    pub fn listener_count(&self) -> usize {
        let listeners = self.inner.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.queue.len() + listeners.stats.len()
    }

    /// Signals a change. `snapshot` is called to capture the state to deliver;
    /// it may be called more than once if further changes land mid-dispatch.
    pub fn publish(&self, snapshot: impl Fn() -> QueueSnapshot) {
        let inner = &self.inner;
        inner.dirty.store(true, Ordering::SeqCst);
        loop {
            // Busy dispatcher (or re-entrant publish): it will see `dirty` and redeliver.
            let guard = match inner.dispatch.try_lock() {
                Ok(g) => g,
                Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
                Err(std::sync::TryLockError::WouldBlock) => return,
            };
            if !inner.dirty.swap(false, Ordering::SeqCst) {
                return;
            }
            self.deliver(&snapshot());
            drop(guard);
            if !inner.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn deliver(&self, queue: &QueueSnapshot) {
        let (queue_listeners, stats_listeners): (Vec<QueueListener>, Vec<StatsListener>) = {
            let listeners = self.inner.listeners.read().unwrap_or_else(|e| e.into_inner());
            (
                listeners.queue.values().cloned().collect(),
                listeners.stats.values().cloned().collect(),
            )
        };

        for listener in &queue_listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(queue))).is_err() {
                tracing::warn!("queue listener panicked; continuing with remaining listeners");
            }
        }

        if stats_listeners.is_empty() {
            return;
        }
        let stats = StatsSnapshot::from_jobs(queue);
        for listener in &stats_listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&stats))).is_err() {
                tracing::warn!("stats listener panicked; continuing with remaining listeners");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn empty() -> QueueSnapshot {
        QueueSnapshot::default()
    }

    #[test]
    fn delivers_queue_then_stats() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let _q = bus.subscribe_queue(move |_| o1.lock().unwrap().push("queue"));
        let o2 = Arc::clone(&order);
        let _s = bus.subscribe_stats(move |s| {
            assert_eq!(s.total_downloads, 0);
            o2.lock().unwrap().push("stats");
        });
        bus.publish(empty);
        assert_eq!(*order.lock().unwrap(), vec!["queue", "stats"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bus.subscribe_queue(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(empty);
        sub.unsubscribe();
        bus.publish(empty);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = bus.subscribe_queue(|_| panic!("listener bug"));
        let h = Arc::clone(&hits);
        let _good = bus.subscribe_queue(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let _bad_stats = bus.subscribe_stats(|_| panic!("stats listener bug"));
        bus.publish(empty);
        bus.publish(empty);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reentrant_publish_is_redelivered_not_deadlocked() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let inner_bus = bus.clone();
        let _sub = bus.subscribe_queue(move |_| {
            // First delivery triggers one nested publish.
            if h.fetch_add(1, Ordering::SeqCst) == 0 {
                inner_bus.publish(QueueSnapshot::default);
            }
        });
        bus.publish(empty);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
