//! Storage backends for admission counters.

use std::time::Duration;

use jiff::Timestamp;

use crate::scope::CounterKey;

pub mod memory;

pub use memory::{InMemoryCounterStore, spawn_sweeper};

/// A fixed-window counter keyed by [`CounterKey`].
///
/// Implementations must make the expire-reset-add sequence of [`CounterStore::increment`] atomic per key,
/// and must not serialize callers working on different keys.
pub trait CounterStore: Send + Sync {
    /// Adds `weight` to the counter of `key` and returns the total for the current window.
    ///
    /// If the key was never charged, or `window` has elapsed since its window started, a new window
    /// starts now and the total is `weight`.
    fn increment(&self, key: &CounterKey, window: Duration, weight: u64) -> Result<u64, StorageError>;

    /// The instant the current window of `key` ends, or `None` if the key was never charged.
    fn window_reset(&self, key: &CounterKey) -> Option<Timestamp>;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No room for another counter.
    #[error("Counter store is full ({max_entries} entries)")]
    CapacityExceeded {
        /// Configured capacity.
        max_entries: usize,
    },

    /// The accumulated weight or the window end does not fit its type.
    #[error("Counter overflow for key {key}")]
    Overflow {
        /// The counter that overflowed.
        key: String,
    },

    /// Internal storage error.
    #[error("Storage error: {0}")]
    Internal(String),
}
