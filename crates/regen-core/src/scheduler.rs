//! Removal handling and delayed restoration.
//!
//! [`Scheduler::handle_removal`] is called once per destroyed cell, from
//! any thread. For a cell whose material has a rule it captures the removed
//! state, queues the placeholder write, supersedes any job already pending
//! at that location and arms a tokio timer that later restores the cell.
//!
//! # Concurrency
//!
//! The job table is a sharded [`DashMap`]. Everything a removal does after
//! the rule lookup happens while holding that location's entry, so two
//! removals at the same cell are strictly ordered and the later one always
//! cancels and replaces the earlier one. Each job carries a [`JobId`]; a
//! timer that wakes after being superseded finds a different id in the slot
//! and does nothing, which rules out double restoration even when the abort
//! arrives too late to stop the task.
//!
//! Lock order is always job table, then snapshot table.
//!
//! # Admission
//!
//! Live jobs are counted in an atomic that is incremented when a removal is
//! admitted and decremented whenever a job leaves the table. A removal is
//! refused, before anything is mutated, once the count reaches the ceiling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regen_types::{CellState, JobId, LocationKey};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::executor::{WriteKind, WriteQueue, WriteRequest};
use crate::rules::{RegenerationRule, RuleStore};
use crate::snapshot::SnapshotStore;

/// Bookkeeping for one armed restoration.
#[derive(Debug)]
pub struct PendingJob {
    /// Identity of this arming.
    pub id: JobId,
    /// When the removal was accepted.
    pub armed_at: Instant,
    /// When the timer is due.
    pub fires_at: Instant,
    timer: AbortHandle,
}

impl PendingJob {
    /// Whether the timer task is still running.
    pub fn is_pending(&self) -> bool {
        !self.timer.is_finished()
    }

    /// Stop the timer. A no-op if it already finished.
    fn cancel(&self) {
        self.timer.abort();
    }
}

/// State shared between the scheduler and its timer tasks.
#[derive(Debug)]
struct Shared {
    snapshots: Arc<SnapshotStore>,
    jobs: DashMap<LocationKey, PendingJob>,
    active: AtomicUsize,
    shut_down: AtomicBool,
    notify_neighbors: AtomicBool,
    writes: WriteQueue,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                Some(live.saturating_sub(count))
            });
    }

    /// Timer body: restore the cell if this job still owns its slot.
    fn fire(&self, location: LocationKey, id: JobId, rule: &RegenerationRule) {
        let Entry::Occupied(slot) = self.jobs.entry(location) else {
            debug!(location = %location, job = %id, "Regeneration job no longer tracked");
            return;
        };
        if slot.get().id != id {
            debug!(location = %location, job = %id, "Regeneration job was superseded");
            return;
        }
        if self.is_shut_down() {
            return;
        }

        let (state, kind) = match self.snapshots.take_if_present(&location) {
            Some(state) => (state, WriteKind::Restore),
            None => {
                debug!(
                    location = %location,
                    fallback = %rule.fallback,
                    "Snapshot gone, restoring rule fallback"
                );
                (rule.fallback.clone(), WriteKind::Fallback)
            }
        };

        let request = WriteRequest {
            location,
            state,
            notify_neighbors: self.notify_neighbors.load(Ordering::Acquire),
            kind,
        };
        if let Err(e) = self.writes.submit(request) {
            debug!(error = %e, "Restoration aborted");
        }

        slot.remove();
        self.release(1);
    }
}

/// Orchestrates removals, placeholders and restoration timers.
#[derive(Debug)]
pub struct Scheduler {
    rules: Arc<RuleStore>,
    shared: Arc<Shared>,
    ceiling: AtomicUsize,
    runtime: Handle,
}

impl Scheduler {
    /// Create a scheduler.
    ///
    /// Timers are spawned on `runtime`, so removals may be reported from
    /// threads that are not part of it.
    pub fn new(
        rules: Arc<RuleStore>,
        snapshots: Arc<SnapshotStore>,
        writes: WriteQueue,
        settings: &SchedulerConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            rules,
            shared: Arc::new(Shared {
                snapshots,
                jobs: DashMap::new(),
                active: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
                notify_neighbors: AtomicBool::new(settings.notify_neighbors),
                writes,
            }),
            ceiling: AtomicUsize::new(settings.max_pending_jobs),
            runtime,
        }
    }

    /// Handle one destroyed cell.
    ///
    /// `removed` is the cell's full state at removal; its material selects
    /// the rule. Returns `true` if a restoration was armed. A `false` return
    /// means nothing was mutated: shutdown has begun, the material does not
    /// regenerate, the ceiling is reached, or the mutation context is gone.
    pub fn handle_removal(&self, location: LocationKey, removed: CellState) -> bool {
        if self.shared.is_shut_down() {
            return false;
        }
        let Some(rule) = self.rules.get(&removed.material) else {
            return false;
        };

        let slot = self.shared.jobs.entry(location);
        // Shutdown may have started while waiting for the slot.
        if self.shared.is_shut_down() {
            return false;
        }
        if !self.try_admit() {
            debug!(
                location = %location,
                material = %removed.material,
                ceiling = self.ceiling(),
                "Regeneration ceiling reached, cell will not regenerate"
            );
            return false;
        }

        self.shared.snapshots.put(location, removed);

        if let Entry::Occupied(existing) = &slot {
            existing.get().cancel();
        }

        let placeholder = WriteRequest {
            location,
            state: rule.placeholder.clone(),
            notify_neighbors: self.shared.notify_neighbors.load(Ordering::Acquire),
            kind: WriteKind::Placeholder,
        };
        if let Err(e) = self.shared.writes.submit(placeholder) {
            warn!(error = %e, "Placeholder write dropped, abandoning regeneration");
            self.shared.snapshots.take_if_present(&location);
            self.shared.release(1);
            if let Entry::Occupied(existing) = slot {
                existing.remove();
                self.shared.release(1);
            }
            return false;
        }

        let job = self.arm(location, &rule);
        debug!(
            location = %location,
            material = %rule.material,
            job = %job.id,
            delay_secs = rule.restore_delay.as_secs(),
            "Regeneration armed"
        );
        match slot {
            Entry::Occupied(mut existing) => {
                let superseded = existing.insert(job);
                self.shared.release(1);
                debug!(location = %location, superseded = %superseded.id, "Superseded pending regeneration");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(job);
            }
        }
        true
    }

    /// Spawn the restoration timer for `location`.
    fn arm(&self, location: LocationKey, rule: &Arc<RegenerationRule>) -> PendingJob {
        let id = JobId::new();
        let armed_at = Instant::now();
        let delay = rule.restore_delay;
        let shared = Arc::clone(&self.shared);
        let rule = Arc::clone(rule);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(location, id, &rule);
        });

        PendingJob {
            id,
            armed_at,
            fires_at: armed_at.checked_add(delay).unwrap_or(armed_at),
            timer: task.abort_handle(),
        }
    }

    /// Reserve one admission slot if the ceiling allows it.
    fn try_admit(&self) -> bool {
        let ceiling = self.ceiling();
        self.shared
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < ceiling).then(|| live.saturating_add(1))
            })
            .is_ok()
    }

    // -----------------------------------------------------------------------
    // Maintenance (reaper and shutdown)
    // -----------------------------------------------------------------------

    /// Drop job entries whose timer already finished without cleaning up.
    ///
    /// Returns the number of entries removed.
    pub fn prune_finished(&self) -> usize {
        let mut pruned: usize = 0;
        self.shared.jobs.retain(|_, job| {
            let keep = job.is_pending();
            if !keep {
                pruned = pruned.saturating_add(1);
            }
            keep
        });
        self.shared.release(pruned);
        pruned
    }

    /// Mark the scheduler as shut down.
    ///
    /// Returns `true` for the call that flipped the flag, `false` if it was
    /// already set. After this every removal is refused.
    pub fn mark_shut_down(&self) -> bool {
        !self.shared.shut_down.swap(true, Ordering::SeqCst)
    }

    /// Abort every pending timer and empty the job table.
    ///
    /// Returns the number of jobs cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled: usize = 0;
        self.shared.jobs.retain(|_, job| {
            job.cancel();
            cancelled = cancelled.saturating_add(1);
            false
        });
        self.shared.release(cancelled);
        cancelled
    }

    // -----------------------------------------------------------------------
    // Settings and monitoring
    // -----------------------------------------------------------------------

    /// Whether shutdown has begun.
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Current admission ceiling.
    pub fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::Acquire)
    }

    /// Change the admission ceiling. Jobs already armed are unaffected.
    pub fn set_ceiling(&self, ceiling: usize) {
        self.ceiling.store(ceiling, Ordering::Release);
    }

    /// Change whether later writes notify neighbouring cells.
    pub fn set_notify_neighbors(&self, notify: bool) {
        self.shared.notify_neighbors.store(notify, Ordering::Release);
    }

    /// Number of live jobs counted against the ceiling.
    pub fn active_jobs(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Number of entries in the job table.
    pub fn tracked_jobs(&self) -> usize {
        self.shared.jobs.len()
    }

    /// Number of stored snapshots.
    pub fn stored_snapshots(&self) -> usize {
        self.shared.snapshots.len()
    }

    /// Whether a restoration is armed for `location`.
    pub fn is_pending(&self, location: &LocationKey) -> bool {
        self.shared
            .jobs
            .get(location)
            .is_some_and(|job| job.is_pending())
    }

    /// Identity of the job armed for `location`, if any.
    pub fn pending_job(&self, location: &LocationKey) -> Option<JobId> {
        self.shared.jobs.get(location).map(|job| job.id)
    }
}
