use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::Channel;

/// A value that tracks the most recent emission of its own [`Channel`].
///
/// A `Cache` is created with an initial value and then only changes through
/// its channel: whoever pushes a value into [`channel()`](Self::channel)
/// updates the cache. The cache installs its own observer on the channel
/// before anything else can subscribe, so every observer added later sees the
/// cache already holding the value it is being notified about.
///
/// Hand consumers the channel, not the cache, to keep a single owner writing.
///
/// # Example
/// ```ignore
/// let text = Cache::new(String::new());
/// let input = text.channel();
///
/// input.subscribe(|t: &String| println!("typed {t}"));
/// input.emit("hello".to_string());
///
/// assert_eq!(text.snapshot(), "hello");
/// ```
pub struct Cache<T> {
    pub(crate) inner: Arc<CacheInner<T>>,
}

pub(crate) struct CacheInner<T> {
    last_value: Arc<RwLock<T>>,
    channel: Channel<T>,
}

impl<T: Clone + Send + Sync + 'static> CacheInner<T> {
    pub(crate) fn broadcast(&self) {
        let current = self.last_value.read().clone();
        self.channel.emit(current);
    }
}

impl<T: Clone + Send + Sync + 'static> Cache<T> {
    /// Create a cache holding `initial_value` and a fresh channel.
    pub fn new(initial_value: T) -> Self {
        Self::with_channel(initial_value, Channel::new())
    }

    /// Create a cache whose channel carries `label` in its log events.
    pub fn labelled(label: impl Into<Arc<str>>, initial_value: T) -> Self {
        Self::with_channel(initial_value, Channel::builder().label(label).build())
    }

    fn with_channel(initial_value: T, channel: Channel<T>) -> Self {
        let last_value = Arc::new(RwLock::new(initial_value));
        channel.subscribe_with(&last_value, |slot, next: &T| {
            *slot.write() = next.clone();
        });
        Self {
            inner: Arc::new(CacheInner {
                last_value,
                channel,
            }),
        }
    }

    /// The most recent value emitted on the channel, or the initial value if
    /// nothing has been emitted yet.
    ///
    /// This is a momentary view. Anything that must stay current, such as a
    /// displayed value, should subscribe to the channel instead. Use the
    /// snapshot for one-shot reads, e.g. once the user has confirmed input.
    pub fn snapshot(&self) -> T {
        self.inner.last_value.read().clone()
    }

    /// Borrow the cached value without cloning it.
    ///
    /// The cache is read-locked while `f` runs; `f` must not emit on this
    /// cache's channel.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.last_value.read())
    }

    /// Re-emit the current snapshot through the channel.
    ///
    /// Used to bring freshly attached observers up to date. Not deduplicated:
    /// broadcasting twice notifies every observer twice.
    pub fn broadcast(&self) {
        self.inner.broadcast();
    }

    /// The channel this cache tracks.
    pub fn channel(&self) -> Channel<T> {
        self.inner.channel.clone()
    }
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("snapshot", &*self.inner.last_value.read())
            .field("channel", &self.inner.channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn snapshot_starts_at_initial_value() {
        let cache = Cache::new(10);
        assert_eq!(cache.snapshot(), 10);
    }

    #[test]
    fn snapshot_follows_emissions() {
        let cache = Cache::new(0);
        let channel = cache.channel();
        for value in [3, 1, 4] {
            channel.emit(value);
            assert_eq!(cache.snapshot(), value);
        }
    }

    #[test]
    fn observers_see_updated_snapshot() {
        let cache = Cache::new(String::from("old"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = cache.clone();
        let sink = seen.clone();
        cache.channel().subscribe(move |value: &String| {
            sink.lock().push((value.clone(), reader.snapshot()));
        });

        cache.channel().emit("new".to_string());
        assert_eq!(*seen.lock(), vec![("new".to_string(), "new".to_string())]);
    }

    #[test]
    fn broadcast_is_not_deduplicated() {
        let cache = Cache::new(7);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        cache.channel().subscribe(move |value: &i32| sink.lock().push(*value));

        cache.broadcast();
        cache.broadcast();
        assert_eq!(*seen.lock(), vec![7, 7]);
        assert_eq!(cache.snapshot(), 7);
    }

    #[test]
    fn with_snapshot_borrows_value() {
        let cache = Cache::new(vec![1, 2, 3]);
        assert_eq!(cache.with_snapshot(Vec::len), 3);
    }

    #[test]
    fn channel_outliving_cache_drops_cache_observer() {
        let cache = Cache::new(1);
        let channel = cache.channel();
        assert_eq!(channel.observer_count(), 1);

        drop(cache);
        channel.emit(2);
        assert_eq!(channel.observer_count(), 0);
    }

    #[test]
    fn labelled_cache_labels_its_channel() {
        let cache = Cache::labelled("username", String::new());
        assert_eq!(cache.channel().label(), Some("username"));
        assert!(format!("{cache:?}").contains("username"));
    }
}
