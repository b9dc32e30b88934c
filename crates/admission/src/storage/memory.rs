//! In-memory fixed-window counter storage.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{CounterStore, StorageError};
use crate::clock::{Clock, SystemClock};
use crate::scope::CounterKey;

/// The state of one counter. Lives behind its own mutex, so only callers charging the same key wait on it.
#[derive(Debug, Default)]
struct Slot {
    window: Option<Window>,
    /// Set when the sweeper unlinked this slot from the map. Holders of a stale handle must look the key up again.
    retired: bool,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Timestamp,
    length: SignedDuration,
    accumulated: u64,
}

impl Window {
    fn end(&self) -> Option<Timestamp> {
        self.start.checked_add(self.length).ok()
    }
}

type Cell = Arc<Mutex<Slot>>;

/// In-memory counter store.
///
/// Counters live in a sharded map. Looking a key up takes a shared lock on its shard only; the
/// read-check-write cycle of [`CounterStore::increment`] then runs under the key's own mutex.
pub struct InMemoryCounterStore {
    entries: DashMap<CounterKey, Cell>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
}

impl InMemoryCounterStore {
    /// Create an unbounded store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an unbounded store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: None,
        }
    }

    /// Limit the number of tracked keys. New keys fail with [`StorageError::CapacityExceeded`] once the
    /// store is full and nothing is stale.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes counters whose window ended more than `retention` ago. Returns how many were removed.
    ///
    /// A removed counter is indistinguishable from one that was never charged, so this never changes
    /// the outcome of a later [`CounterStore::increment`].
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = self.clock.now();
        let retention = SignedDuration::try_from(retention).unwrap_or(SignedDuration::MAX);
        let mut removed = 0;

        self.entries.retain(|_, cell| {
            let mut slot = lock(cell);

            let stale = match slot.window {
                None => true,
                Some(window) => window
                    .end()
                    .and_then(|end| end.checked_add(retention).ok())
                    .is_some_and(|horizon| now >= horizon),
            };

            if stale {
                slot.retired = true;
                removed += 1;
            }

            !stale
        });

        removed
    }

    fn cell(&self, key: &CounterKey) -> Result<Cell, StorageError> {
        if let Some(cell) = self.entries.get(key) {
            return Ok(cell.value().clone());
        }

        if let Some(max_entries) = self.max_entries
            && self.entries.len() >= max_entries
        {
            let removed = self.sweep(Duration::ZERO);
            log::debug!("Counter store at capacity ({max_entries}), reclaimed {removed} expired counters");

            if self.entries.len() >= max_entries {
                return Err(StorageError::CapacityExceeded { max_entries });
            }
        }

        Ok(self.entries.entry(key.clone()).or_default().value().clone())
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &CounterKey, window: Duration, weight: u64) -> Result<u64, StorageError> {
        let length = SignedDuration::try_from(window).map_err(|_| StorageError::Overflow { key: key.to_string() })?;

        loop {
            let cell = self.cell(key)?;
            let mut slot = lock(&cell);

            if slot.retired {
                // Swept between our lookup and our lock. The key is gone from the map, look it up again.
                continue;
            }

            let now = self.clock.now();

            let current = match slot.window {
                Some(current) => {
                    let end = current
                        .start
                        .checked_add(length)
                        .map_err(|_| StorageError::Overflow { key: key.to_string() })?;

                    (now < end).then_some(current)
                }
                None => None,
            };

            let next = match current {
                Some(current) => Window {
                    start: current.start,
                    length,
                    accumulated: current
                        .accumulated
                        .checked_add(weight)
                        .ok_or_else(|| StorageError::Overflow { key: key.to_string() })?,
                },
                None => {
                    log::trace!("Starting a new {window:?} window for counter '{key}'");

                    Window {
                        start: now,
                        length,
                        accumulated: weight,
                    }
                }
            };

            slot.window = Some(next);

            return Ok(next.accumulated);
        }
    }

    fn window_reset(&self, key: &CounterKey) -> Option<Timestamp> {
        let cell = self.entries.get(key)?.value().clone();
        let slot = lock(&cell);

        slot.window.and_then(|window| window.end())
    }
}

fn lock(cell: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    // A panic while holding the lock cannot leave a slot half-written: every update is a single assignment.
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs [`InMemoryCounterStore::sweep`] every `interval` until `shutdown` is cancelled.
pub fn spawn_sweeper(
    store: Arc<InMemoryCounterStore>,
    interval: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::debug!("Counter sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = store.sweep(retention);

                    if removed > 0 {
                        log::debug!("Reclaimed {removed} stale counters, {} remaining", store.len());
                    }
                }
            }
        }
    })
}
