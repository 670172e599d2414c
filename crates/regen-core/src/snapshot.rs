//! Captured pre-removal cell state.
//!
//! Every accepted removal stores the cell's full [`CellState`] here before
//! the placeholder goes in. The firing job consumes its entry with
//! [`SnapshotStore::take_if_present`]; the reaper evicts entries whose job
//! never fired. Both paths remove through the same sharded map, so an entry
//! is consumed at most once.

use std::time::Duration;

use dashmap::DashMap;
use regen_types::{CellState, LocationKey};
use tokio::time::Instant;

/// One captured cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Where the cell was.
    pub key: LocationKey,
    /// Full state at removal time.
    pub state: CellState,
    /// Monotonic capture time.
    pub captured_at: Instant,
}

impl Snapshot {
    /// How long ago the snapshot was taken, relative to `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }
}

/// Location-keyed table of snapshots.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: DashMap<LocationKey, Snapshot>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store `state` for `key`, replacing any earlier snapshot.
    ///
    /// Returns the replaced state, if there was one.
    pub fn put(&self, key: LocationKey, state: CellState) -> Option<CellState> {
        self.entries
            .insert(
                key,
                Snapshot {
                    key,
                    state,
                    captured_at: Instant::now(),
                },
            )
            .map(|previous| previous.state)
    }

    /// Remove and return the snapshot for `key`.
    pub fn take_if_present(&self, key: &LocationKey) -> Option<CellState> {
        self.entries.remove(key).map(|(_, snapshot)| snapshot.state)
    }

    /// Copy of the snapshot for `key` without removing it.
    pub fn get(&self, key: &LocationKey) -> Option<Snapshot> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Remove every snapshot older than `max_age`; returns how many went.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut evicted: usize = 0;
        self.entries.retain(|_, snapshot| {
            let keep = snapshot.age(now) <= max_age;
            if !keep {
                evicted = evicted.saturating_add(1);
            }
            keep
        });
        evicted
    }

    /// Remove every snapshot; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut cleared: usize = 0;
        self.entries.retain(|_, _| {
            cleared = cleared.saturating_add(1);
            false
        });
        cleared
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
