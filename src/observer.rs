// Observer slots - what a channel stores for every subscriber
//
// A slot pairs a callback with a detached flag. Callbacks report back whether
// their target is still alive; a callback that answers `Detached` is flagged
// and the emitting thread prunes it from the channel's observer table once the
// current delivery completes. The flag is checked before every invocation so a
// slot that was detached after a snapshot was taken is never called again.
//
// Slots that work on behalf of a weakly held owner also carry an owner check,
// which lets the channel find dead slots without invoking them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(0);

/// Key of an observer inside a channel's observer table.
///
/// Ids are allocated from a process-wide counter and never reused, so a stale
/// id held by a [`Subscription`] cannot detach an unrelated observer.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outcome of handing one value to one observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The observer ran (or chose to ignore the value) and stays attached.
    Delivered,
    /// The observer's target is gone; it must never be invoked again.
    Detached,
}

pub(crate) type Callback<T> = dyn Fn(&T) -> Delivery + Send + Sync;

pub(crate) type OwnerCheck = dyn Fn() -> bool + Send + Sync;

pub(crate) struct ObserverSlot<T> {
    id: ObserverId,
    callback: Box<Callback<T>>,
    owner_alive: Option<Box<OwnerCheck>>,
    detached: AtomicBool,
}

impl<T> ObserverSlot<T> {
    pub(crate) fn new(callback: Box<Callback<T>>) -> Arc<Self> {
        Self::build(callback, None)
    }

    /// A slot that is dead as soon as `owner_alive` returns false.
    pub(crate) fn watching(callback: Box<Callback<T>>, owner_alive: Box<OwnerCheck>) -> Arc<Self> {
        Self::build(callback, Some(owner_alive))
    }

    fn build(callback: Box<Callback<T>>, owner_alive: Option<Box<OwnerCheck>>) -> Arc<Self> {
        Arc::new(Self {
            id: ObserverId::next(),
            callback,
            owner_alive,
            detached: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Not detached, and the owner (if any) still exists.
    pub(crate) fn is_live(&self) -> bool {
        !self.is_detached() && self.owner_alive.as_ref().is_none_or(|alive| alive())
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// Hand `value` to the callback unless the slot is already detached.
    pub(crate) fn deliver(&self, value: &T) -> Delivery {
        if self.is_detached() {
            return Delivery::Detached;
        }
        let outcome = (self.callback)(value);
        if outcome == Delivery::Detached {
            self.detach();
        }
        outcome
    }
}

/// RAII guard returned by [`Channel::subscribe_scoped`](crate::Channel::subscribe_scoped).
///
/// Dropping the guard removes the observer from its channel. An emission that
/// is already iterating a snapshot of the observer list skips the observer if
/// it has not reached it yet; an invocation already running is not interrupted.
///
/// The guard does not keep the channel alive. If the channel is gone by the
/// time the guard drops, dropping it does nothing.
#[must_use = "dropping a Subscription immediately detaches its observer"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach the observer now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Leave the observer attached for as long as the channel lives.
    pub fn forget(mut self) {
        self.detach = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("armed", &self.detach.is_some())
            .finish()
    }
}
