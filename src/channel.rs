// Channel - thread-safe multicast emitter
//
// Each channel owns two locks:
// - state: the ordered observer table (insertion order = subscription order)
//   and one pending-value queue per thread currently inside emit()
// - turn: held for the whole of one emit() call, so deliveries coming from
//   different threads take turns and an observer never runs on two threads at
//   once for the same channel
//
// DELIVERY MODEL:
// - emit() copies the live observer list under `state`, releases it and only
//   then runs user code while holding `turn`. Observers may therefore
//   subscribe, detach or emit on this channel without deadlocking.
// - A re-entrant emit (same channel, same thread, called from inside one of
//   its observers) never touches `turn`. It is appended to that thread's queue
//   and delivered after the in-flight value has reached every observer of its
//   snapshot.
// - Chained emits into other channels acquire their `turn` while this one is
//   held. Two threads driving a cycle of channels from opposite ends can
//   deadlock; propagation graphs that feed back into an upstream channel must
//   be driven from one thread.
// - Observers that report Detached are pruned after the value is delivered.
//   attach() also sweeps dead slots once the table doubles, so sources that
//   are rarely emitted do not accumulate dropped derived channels.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use foldhash::fast::FixedState;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::builder::ChannelBuilder;
use crate::observer::{Callback, Delivery, ObserverId, ObserverSlot, Subscription};

/// Thread-safe multicast emitter.
///
/// A `Channel` does not retain the values pushed through it; it only forwards
/// them to the observers attached at the time of the push. Use
/// [`Cache`](crate::Cache) when the most recent value must be readable later.
///
/// Cloning a `Channel` yields another handle to the same channel. The channel
/// lives as long as any handle does; observers installed by combinators hold
/// their derived channels weakly, so a derived channel whose handles are all
/// dropped silently stops receiving values.
///
/// # Example
/// ```ignore
/// let channel = Channel::new();
/// channel.subscribe(|name: &String| println!("hello {name}"));
/// channel.emit("world".to_string());
/// ```
pub struct Channel<T> {
    shared: Arc<Shared<T>>,
}

/// Table size below which attach() never sweeps dead slots.
const MIN_SWEEP_LEN: usize = 32;

pub(crate) struct Shared<T> {
    label: Option<Arc<str>>,
    state: Mutex<ChannelState<T>>,
    turn: Mutex<()>,
}

struct ChannelState<T> {
    observers: IndexMap<ObserverId, Arc<ObserverSlot<T>>, FixedState>,
    delivering: HashMap<ThreadId, VecDeque<T>, FixedState>,
    sweep_at: usize,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Create a channel with no observers.
    pub fn new() -> Self {
        Self::from_shared(Shared::new(None))
    }

    /// Start configuring a channel (label, initial observers, initial value).
    pub fn builder() -> ChannelBuilder<T> {
        ChannelBuilder::new()
    }

    pub(crate) fn from_shared(shared: Shared<T>) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    /// Append `observer` to the end of the observer list.
    ///
    /// The observer receives every value emitted after this call returns and
    /// none emitted before it. There is no deduplication: subscribing the same
    /// logic twice runs it twice per value.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.shared.attach(Box::new(move |value| {
            observer(value);
            Delivery::Delivered
        }));
    }

    /// Like [`subscribe`](Self::subscribe), but returns a guard that detaches
    /// the observer when dropped.
    pub fn subscribe_scoped<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.shared.attach(Box::new(move |value| {
            observer(value);
            Delivery::Delivered
        }));
        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.detach(id);
            }
        })
    }

    /// Deliver `value` to every observer, in subscription order, on the
    /// calling thread.
    ///
    /// Every channel reachable through combinators has finished propagating
    /// by the time this returns. Called from inside one of this channel's own
    /// observers, the value is queued and delivered once the current value has
    /// reached all observers.
    ///
    /// Emits from different threads are serialized: a second thread blocks
    /// until the delivery in progress, including its queued re-entrant values,
    /// has finished.
    pub fn emit(&self, value: T) {
        self.shared.emit(value);
    }

    /// Remove every observer.
    ///
    /// Emissions already iterating a snapshot on other threads finish
    /// delivering to that snapshot.
    pub fn remove_all_observers(&self) {
        let removed = std::mem::take(&mut self.shared.state.lock().observers);
        debug!(channel = self.label(), removed = removed.len(), "observers cleared");
        drop(removed);
    }

    /// Number of attached observers whose target is still alive.
    ///
    /// Observers feeding a dropped derived channel (or a dropped
    /// [`subscribe_with`](Self::subscribe_with) owner) are not counted, even
    /// before they are pruned from the table.
    pub fn observer_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .observers
            .values()
            .filter(|slot| slot.is_live())
            .count()
    }

    /// Diagnostic label set through [`ChannelBuilder::label`].
    pub fn label(&self) -> Option<&str> {
        self.shared.label()
    }
}

impl<T: Send + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("label", &self.label())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl<T: Send + 'static> Shared<T> {
    pub(crate) fn new(label: Option<Arc<str>>) -> Self {
        Self {
            label,
            state: Mutex::new(ChannelState {
                observers: IndexMap::default(),
                delivering: HashMap::default(),
                sweep_at: MIN_SWEEP_LEN,
            }),
            turn: Mutex::new(()),
        }
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn attach(&self, callback: Box<Callback<T>>) -> ObserverId {
        self.attach_slot(ObserverSlot::new(callback))
    }

    pub(crate) fn attach_slot(&self, slot: Arc<ObserverSlot<T>>) -> ObserverId {
        let id = slot.id();
        let mut state = self.state.lock();
        if state.observers.len() >= state.sweep_at {
            let before = state.observers.len();
            state.observers.retain(|_, existing| existing.is_live());
            let swept = before - state.observers.len();
            if swept > 0 {
                cov_mark::hit!(dead_observer_swept);
                debug!(channel = self.label(), swept, "dead observers swept on attach");
            }
            state.sweep_at = (state.observers.len() * 2).max(MIN_SWEEP_LEN);
        }
        state.observers.insert(id, slot);
        trace!(channel = self.label(), observers = state.observers.len(), "observer attached");
        id
    }

    pub(crate) fn detach(&self, id: ObserverId) {
        let removed = self.state.lock().observers.shift_remove(&id);
        if let Some(slot) = removed {
            slot.detach();
            trace!(channel = self.label(), "observer detached");
        }
    }

    pub(crate) fn emit(&self, value: T) {
        let thread = thread::current().id();
        {
            let mut state = self.state.lock();
            if let Some(queue) = state.delivering.get_mut(&thread) {
                cov_mark::hit!(reentrant_emit_queued);
                queue.push_back(value);
                debug!(channel = self.label(), queued = queue.len(), "re-entrant emit queued");
                return;
            }
            state.delivering.insert(thread, VecDeque::new());
        }

        // Removes this thread's queue on exit, including when an observer panics.
        let _guard = DeliveryGuard {
            shared: self,
            thread,
        };
        // Released before the guard drops. This thread never re-acquires it:
        // its own nested emits were routed to the queue above.
        let _turn = self.turn.lock();

        let mut next = Some(value);
        while let Some(value) = next {
            self.deliver(&value);
            next = self
                .state
                .lock()
                .delivering
                .get_mut(&thread)
                .and_then(VecDeque::pop_front);
        }
    }

    fn deliver(&self, value: &T) {
        let snapshot: Vec<Arc<ObserverSlot<T>>> =
            self.state.lock().observers.values().cloned().collect();
        trace!(channel = self.label(), observers = snapshot.len(), "delivering value");

        let mut detached = Vec::new();
        for slot in &snapshot {
            if slot.deliver(value) == Delivery::Detached {
                detached.push(slot.id());
            }
        }

        if !detached.is_empty() {
            self.prune(&detached);
        }
    }

    fn prune(&self, ids: &[ObserverId]) {
        let removed: Vec<_> = {
            let mut state = self.state.lock();
            ids.iter()
                .filter_map(|id| state.observers.shift_remove(id))
                .collect()
        };
        if !removed.is_empty() {
            cov_mark::hit!(dead_observer_pruned);
            debug!(channel = self.label(), pruned = removed.len(), "dead observers pruned");
        }
    }
}

/// Clears the emitting thread's pending queue when delivery ends.
struct DeliveryGuard<'a, T: Send + 'static> {
    shared: &'a Shared<T>,
    thread: ThreadId,
}

impl<T: Send + 'static> Drop for DeliveryGuard<'_, T> {
    fn drop(&mut self) {
        let dropped = self
            .shared
            .state
            .lock()
            .delivering
            .remove(&self.thread)
            .map_or(0, |queue| queue.len());
        if dropped > 0 {
            debug!(
                channel = self.shared.label(),
                dropped, "delivery aborted, queued values discarded"
            );
        }
    }
}
