//! Periodic cleanup of regeneration bookkeeping.
//!
//! The reaper never restores anything. On every sweep it drops job entries
//! whose timer already finished without removing itself and evicts snapshots
//! older than the configured maximum age, which bounds memory if a job never
//! fires. A job whose snapshot was evicted restores the rule's fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::ReaperConfig;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotStore;

/// Result of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Finished job entries removed.
    pub stale_jobs_removed: usize,
    /// Snapshots evicted for age.
    pub snapshots_evicted: usize,
    /// Live jobs after the sweep.
    pub active_jobs: usize,
    /// Snapshots left after the sweep.
    pub stored_snapshots: usize,
    /// Wall-clock time of the sweep.
    pub swept_at: DateTime<Utc>,
}

/// Periodic sweeper over the scheduler's tables.
#[derive(Debug, Clone)]
pub struct Reaper {
    scheduler: Arc<Scheduler>,
    snapshots: Arc<SnapshotStore>,
    interval: Duration,
    max_snapshot_age: Duration,
}

impl Reaper {
    /// Create a reaper with the given settings.
    pub fn new(
        scheduler: Arc<Scheduler>,
        snapshots: Arc<SnapshotStore>,
        settings: &ReaperConfig,
    ) -> Self {
        Self {
            scheduler,
            snapshots,
            interval: settings.interval(),
            max_snapshot_age: settings.max_snapshot_age(),
        }
    }

    /// Run one sweep now.
    pub fn sweep(&self) -> SweepReport {
        let stale_jobs_removed = self.scheduler.prune_finished();
        let snapshots_evicted = self.snapshots.evict_older_than(self.max_snapshot_age);
        let report = SweepReport {
            stale_jobs_removed,
            snapshots_evicted,
            active_jobs: self.scheduler.active_jobs(),
            stored_snapshots: self.snapshots.len(),
            swept_at: Utc::now(),
        };

        if stale_jobs_removed > 0 || snapshots_evicted > 0 {
            info!(
                stale_jobs_removed,
                snapshots_evicted,
                active_jobs = report.active_jobs,
                stored_snapshots = report.stored_snapshots,
                "Reaper sweep"
            );
        } else {
            debug!(
                active_jobs = report.active_jobs,
                stored_snapshots = report.stored_snapshots,
                "Reaper sweep, nothing to remove"
            );
        }
        report
    }

    /// Live jobs counted against the ceiling.
    pub fn active_jobs(&self) -> usize {
        self.scheduler.active_jobs()
    }

    /// Snapshots currently stored.
    pub fn stored_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Sweep every interval until the scheduler shuts down.
    ///
    /// The first sweep happens one full interval after the start.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            max_snapshot_age_secs = self.max_snapshot_age.as_secs(),
            "Reaper started"
        );
        loop {
            ticker.tick().await;
            if self.scheduler.is_shut_down() {
                break;
            }
            self.sweep();
        }
        info!("Reaper stopped");
    }

    /// Start [`run`](Self::run) as a task on `runtime`.
    pub fn spawn(self, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(self.run())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use regen_types::{CellState, LocationKey, WorldId};

    use super::*;
    use crate::config::{RegenConfig, SchedulerConfig};
    use crate::executor::{World, WorldDriver};
    use crate::memory::MemoryWorld;
    use crate::rules::{AnyMaterial, RuleStore};

    fn key(x: i32) -> LocationKey {
        LocationKey::new(WorldId::from(uuid::Uuid::nil()), x, 70, 0)
    }

    fn state(spec: &str) -> CellState {
        CellState::parse(spec).unwrap()
    }

    fn setup(max_age_secs: u64) -> (Reaper, Arc<Scheduler>, WorldDriver<MemoryWorld>) {
        let rules = Arc::new(RuleStore::new());
        rules.load(
            &RegenConfig::parse(
                "materials:\n  WHEAT_CROP:\n    regenerate-delay: 10\n    regenerate-into: \"WHEAT_CROP[age=0]\"\n",
            )
            .unwrap(),
            &AnyMaterial,
        );
        let snapshots = Arc::new(SnapshotStore::new());
        let (driver, writes) = WorldDriver::new(MemoryWorld::new());
        let scheduler = Arc::new(Scheduler::new(
            rules,
            Arc::clone(&snapshots),
            writes,
            &SchedulerConfig::default(),
            Handle::current(),
        ));
        let reaper = Reaper::new(
            Arc::clone(&scheduler),
            snapshots,
            &ReaperConfig {
                interval_secs: 1,
                max_snapshot_age_secs: max_age_secs,
            },
        );
        (reaper, scheduler, driver)
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_fresh_state() {
        let (reaper, scheduler, _driver) = setup(300);
        assert!(scheduler.handle_removal(key(0), state("WHEAT_CROP[age=7]")));
        let report = reaper.sweep();
        assert_eq!(report.stale_jobs_removed, 0);
        assert_eq!(report.snapshots_evicted, 0);
        assert_eq!(report.active_jobs, 1);
        assert_eq!(report.stored_snapshots, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_snapshot_restores_fallback() {
        let (reaper, scheduler, mut driver) = setup(3);
        assert!(scheduler.handle_removal(key(0), state("WHEAT_CROP[age=7]")));

        tokio::time::sleep(Duration::from_secs(4)).await;
        let report = reaper.sweep();
        assert_eq!(report.snapshots_evicted, 1);
        // The job itself is still pending.
        assert_eq!(report.active_jobs, 1);

        tokio::time::sleep(Duration::from_secs(7)).await;
        driver.apply_pending();
        assert_eq!(
            driver.world().get_state(&key(0)),
            Some(state("WHEAT_CROP[age=0]"))
        );
        assert_eq!(scheduler.active_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_and_stops_on_shutdown() {
        let (reaper, scheduler, _driver) = setup(2);
        let handle = reaper.clone().spawn(&Handle::current());
        assert!(scheduler.handle_removal(key(0), state("WHEAT_CROP[age=7]")));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(reaper.stored_snapshots(), 0);
        assert_eq!(reaper.active_jobs(), 1);

        scheduler.mark_shut_down();
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }
}
