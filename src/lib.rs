#![deny(missing_docs)]

//! Thread-safe multicast value channels with derived channels, cached state
//! and aggregation.
//!
//! This crate is the propagation core of a declarative UI layer: widgets push
//! user input into channels, and labels, buttons and validators subscribe to
//! them. Everything is synchronous and in-process. Pushing a value runs every
//! observer, including the ones that feed derived channels, on the calling
//! thread before `emit` returns.
//!
//! # Quick Start
//!
//! ```ignore
//! use statebind::{Cache, Channel};
//!
//! let username = Cache::new(String::new());
//! let input = username.channel();
//!
//! // Derived channels are owned by whoever asked for them.
//! let is_valid = input.map(|name: &String| name.len() >= 3);
//! is_valid.subscribe(|ok| submit_button.set_enabled(*ok));
//!
//! input.emit("ada".to_string());
//! assert_eq!(username.snapshot(), "ada");
//! ```
//!
//! # Core Types
//!
//! - [`Channel<T>`] - Multicast emitter. [`subscribe`](Channel::subscribe)
//!   observers, [`emit`](Channel::emit) values.
//! - [`Cache<T>`] - Owns a channel and remembers its latest value as a
//!   [`snapshot`](Cache::snapshot).
//! - [`Cache::combined`] - One cache re-emitting a group of caches whenever
//!   any member changes.
//! - [`Subscription`] - RAII guard from [`Channel::subscribe_scoped`].
//! - [`ChannelBuilder`] - Label, initial observers and initial value.
//!
//! # Derived Channels
//!
//! ```ignore
//! let scores: Channel<Vec<u32>> = Channel::new();
//! let labels = scores.flat_map(|s: &u32| format!("{s} pts"));
//! let first_high = scores.first_where(|s: &u32| *s > 100);
//! let shown = first_high.unwrap_default(0);
//! ```
//!
//! A source holds its derived channels weakly. Drop every handle to a derived
//! channel and the source forgets it on its next emission; there is no
//! explicit unsubscribe for derived channels. Plain observers can be detached
//! by subscribing through [`Channel::subscribe_scoped`] or
//! [`Channel::subscribe_with`].
//!
//! # Re-entrancy
//!
//! An observer may subscribe to or emit on the channel that is calling it. A
//! nested emit on the same channel is queued and delivered right after the
//! current value has reached every observer, so observers always see values
//! in the order they were emitted.
//!
//! # Threads
//!
//! Any thread may subscribe or emit. Deliveries on one channel take turns:
//! an emit from a second thread waits until the delivery in progress has
//! finished, so an observer never runs concurrently with itself for the same
//! channel and a [`Cache`] snapshot read inside an observer matches the value
//! being delivered. Chained channels are locked in propagation order; driving
//! a cycle of channels from two threads at once can deadlock.
//!
//! # Logging
//!
//! Deliveries are logged with [`tracing`] at `trace` level and structural
//! changes (pruned observers, queued re-entrant emits) at `debug` level. The
//! crate never installs a subscriber.

mod builder;
mod cache;
mod channel;
mod combinators;
mod combined;
mod observer;

pub use builder::ChannelBuilder;
pub use cache::Cache;
pub use channel::Channel;
pub use observer::Subscription;
