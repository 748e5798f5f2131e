// Combinators - derived channels
//
// Every combinator creates a fresh channel and attaches an observer to the
// source that holds the derived channel WEAKLY. The caller owns the derived
// channel; once the caller drops every handle, the observer finds nothing to
// upgrade, reports itself detached and the source prunes it. Holding derived
// channels strongly would keep every channel ever derived alive for as long
// as its source lives.

use std::sync::Arc;

use crate::channel::{Channel, Shared};
use crate::observer::{Delivery, ObserverSlot};

impl<T: Send + 'static> Channel<T> {
    /// Subscribe an observer that works on behalf of `owner`.
    ///
    /// The channel keeps only a weak reference to `owner`. While the owner is
    /// alive the observer is called with it; once the owner is dropped the
    /// observer is detached, never called again and no longer counted by
    /// [`observer_count`](Self::observer_count).
    ///
    /// # Example
    /// ```ignore
    /// let label = Arc::new(Label::default());
    /// name.subscribe_with(&label, |label, text| label.set_text(text));
    /// drop(label); // the observer detaches on the next emission
    /// ```
    pub fn subscribe_with<O, F>(&self, owner: &Arc<O>, observer: F)
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &T) + Send + Sync + 'static,
    {
        let owner = Arc::downgrade(owner);
        let watched = owner.clone();
        let slot = ObserverSlot::watching(
            Box::new(move |value| match owner.upgrade() {
                Some(owner) => {
                    observer(&owner, value);
                    Delivery::Delivered
                }
                None => Delivery::Detached,
            }),
            Box::new(move || watched.strong_count() > 0),
        );
        self.shared().attach_slot(slot);
    }

    /// Derived channel emitting `transform(value)` for every value of `self`.
    ///
    /// Values are not compared, so observers of the result can receive the
    /// same transformed value repeatedly.
    pub fn map<U, F>(&self, transform: F) -> Channel<U>
    where
        U: Send + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.derive("map", transform)
    }

    /// Derived channel emitting each sequence of `self` with `transform`
    /// applied to every element.
    pub fn flat_map<E, V, F>(&self, transform: F) -> Channel<Vec<V>>
    where
        for<'a> &'a T: IntoIterator<Item = &'a E>,
        E: 'static,
        V: Send + 'static,
        F: Fn(&E) -> V + Send + Sync + 'static,
    {
        self.derive("flat_map", move |sequence| {
            sequence.into_iter().map(&transform).collect()
        })
    }

    /// Derived channel emitting the first element of each sequence of `self`
    /// that satisfies `predicate`, or `None`.
    pub fn first_where<E, P>(&self, predicate: P) -> Channel<Option<E>>
    where
        for<'a> &'a T: IntoIterator<Item = &'a E>,
        E: Clone + Send + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.derive("first_where", move |sequence| {
            sequence
                .into_iter()
                .find(|element| predicate(*element))
                .cloned()
        })
    }

    fn derive<U, F>(&self, operation: &str, transform: F) -> Channel<U>
    where
        U: Send + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let label = self
            .label()
            .map(|label| Arc::<str>::from(format!("{label}.{operation}")));
        let derived = Channel::from_shared(Shared::new(label));
        self.subscribe_with(derived.shared(), move |target, value| {
            target.emit(transform(value));
        });
        derived
    }
}

impl<U: Clone + Send + Sync + 'static> Channel<Option<U>> {
    /// Derived channel emitting the contained value, or `default_value` in
    /// place of `None`.
    pub fn unwrap_default(&self, default_value: U) -> Channel<U> {
        self.derive("unwrap_default", move |value| {
            value.as_ref().unwrap_or(&default_value).clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn record<T: Clone + Send + Sync + 'static>(channel: &Channel<T>) -> Arc<Mutex<Vec<T>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.subscribe(move |value: &T| sink.lock().push(value.clone()));
        seen
    }

    #[test]
    fn map_transforms_each_value() {
        let source = Channel::new();
        let lengths = source.map(|text: &String| text.len());
        let seen = record(&lengths);

        source.emit("abc".to_string());
        source.emit(String::new());
        assert_eq!(*seen.lock(), vec![3, 0]);
    }

    #[test]
    fn map_does_not_deduplicate() {
        let source = Channel::new();
        let parity = source.map(|n: &i32| n % 2 == 0);
        let seen = record(&parity);

        source.emit(2);
        source.emit(4);
        assert_eq!(*seen.lock(), vec![true, true]);
    }

    #[test]
    fn flat_map_maps_every_element() {
        let source: Channel<Vec<i32>> = Channel::new();
        let labels = source.flat_map(|n: &i32| format!("#{n}"));
        let seen = record(&labels);

        source.emit(vec![1, 2]);
        source.emit(Vec::new());
        assert_eq!(
            *seen.lock(),
            vec![vec!["#1".to_string(), "#2".to_string()], Vec::new()]
        );
    }

    #[test]
    fn first_where_finds_first_match_or_none() {
        let source: Channel<Vec<i32>> = Channel::new();
        let first_even = source.first_where(|n: &i32| n % 2 == 0);
        let seen = record(&first_even);

        source.emit(vec![1, 4, 6]);
        source.emit(vec![1, 3]);
        assert_eq!(*seen.lock(), vec![Some(4), None]);
    }

    #[test]
    fn unwrap_default_fills_missing_values() {
        let source: Channel<Option<String>> = Channel::new();
        let names = source.unwrap_default("anonymous".to_string());
        let seen = record(&names);

        source.emit(Some("ada".to_string()));
        source.emit(None);
        assert_eq!(*seen.lock(), vec!["ada".to_string(), "anonymous".to_string()]);
    }

    #[test]
    fn dropped_derived_channel_is_pruned() {
        cov_mark::check!(dead_observer_pruned);

        let source = Channel::new();
        let doubled = source.map(|n: &i32| n * 2);
        let seen = record(&doubled);
        assert_eq!(source.observer_count(), 1);

        source.emit(1);
        drop(doubled);
        source.emit(2);

        assert_eq!(*seen.lock(), vec![2]);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn subscribe_with_passes_live_owner() {
        struct Counter(Mutex<i32>);

        let source = Channel::new();
        let counter = Arc::new(Counter(Mutex::new(0)));
        source.subscribe_with(&counter, |counter, n: &i32| *counter.0.lock() += n);

        source.emit(2);
        source.emit(3);
        assert_eq!(*counter.0.lock(), 5);

        drop(counter);
        source.emit(4);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn derived_channels_inherit_label() {
        let source: Channel<Option<u8>> = Channel::builder().label("volume").build();
        let level = source.unwrap_default(0);
        let doubled = level.map(|v| u16::from(*v) * 2);
        assert_eq!(level.label(), Some("volume.unwrap_default"));
        assert_eq!(doubled.label(), Some("volume.unwrap_default.map"));
        assert_eq!(Channel::<u8>::new().map(|v| *v).label(), None);
    }
}
