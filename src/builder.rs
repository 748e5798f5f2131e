//! Builder for configuring a [`Channel`] before first use.

use std::sync::Arc;

use tracing::debug;

use crate::channel::{Channel, Shared};
use crate::observer::{Callback, Delivery};

/// Builder for configuring and creating a [`Channel`].
///
/// # Example
///
/// ```ignore
/// // Label the channel for diagnostics and hand an initial value to the
/// // observers installed here.
/// let channel = Channel::builder()
///     .label("search-text")
///     .observer(|text: &String| println!("search: {text}"))
///     .initial(String::new())
///     .build();
/// ```
pub struct ChannelBuilder<T> {
    label: Option<Arc<str>>,
    observers: Vec<Box<Callback<T>>>,
    initial: Option<T>,
}

impl<T: Send + 'static> Default for ChannelBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> ChannelBuilder<T> {
    /// Create a builder with no label, no observers and no initial value.
    pub fn new() -> Self {
        Self {
            label: None,
            observers: Vec::new(),
            initial: None,
        }
    }

    /// Set the name recorded in this channel's log events.
    ///
    /// Channels derived from a labelled channel inherit the label with the
    /// combinator name appended, e.g. `"search-text.map"`.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Install an observer before the channel is handed out.
    ///
    /// Observers added here keep the order in which they were added.
    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(move |value| {
            observer(value);
            Delivery::Delivered
        }));
        self
    }

    /// Value delivered to the observers given to this builder as soon as the
    /// channel is built.
    ///
    /// The value is not retained. Without observers it is discarded and
    /// nothing is emitted.
    pub fn initial(mut self, value: T) -> Self {
        self.initial = Some(value);
        self
    }

    /// Create the channel.
    pub fn build(self) -> Channel<T> {
        let has_observers = !self.observers.is_empty();
        let shared = Shared::new(self.label);
        for observer in self.observers {
            shared.attach(observer);
        }
        let channel = Channel::from_shared(shared);

        match self.initial {
            Some(value) if has_observers => channel.emit(value),
            Some(_) => debug!(channel = channel.label(), "initial value discarded, no observers"),
            None => {}
        }
        channel
    }
}

impl<T> std::fmt::Debug for ChannelBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("label", &self.label)
            .field("observers", &self.observers.len())
            .field("has_initial", &self.initial.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn initial_value_reaches_builder_observers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();

        let channel = Channel::builder()
            .observer(move |value: &i32| first.lock().push(("first", *value)))
            .observer(move |value: &i32| second.lock().push(("second", *value)))
            .initial(3)
            .build();

        assert_eq!(*seen.lock(), vec![("first", 3), ("second", 3)]);
        assert_eq!(channel.observer_count(), 2);
    }

    #[test]
    fn initial_value_without_observers_is_discarded() {
        let channel = Channel::builder().initial(3).build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        channel.subscribe(move |value: &i32| seen_clone.lock().push(*value));

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn label_is_kept() {
        let channel: Channel<()> = Channel::builder().label("confirm").build();
        assert_eq!(channel.label(), Some("confirm"));
        assert_eq!(Channel::<()>::new().label(), None);
    }
}
