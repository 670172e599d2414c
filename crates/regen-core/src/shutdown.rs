//! Teardown of all regeneration work.
//!
//! [`ShutdownCoordinator::shutdown`] flips the scheduler into its permanent
//! shut-down state first, so no removal can arm a job afterwards, then
//! aborts every pending timer, clears the snapshot table and stops the
//! background tasks registered with it. Cells still showing a placeholder
//! keep it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotStore;

/// What a shutdown call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// `true` if an earlier call already shut everything down.
    pub already_shut_down: bool,
    /// Pending jobs cancelled.
    pub jobs_cancelled: usize,
    /// Snapshots discarded.
    pub snapshots_cleared: usize,
    /// Background tasks stopped.
    pub tasks_stopped: usize,
    /// When the call completed.
    pub completed_at: DateTime<Utc>,
}

/// Cancels pending work and clears state on teardown.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    scheduler: Arc<Scheduler>,
    snapshots: Arc<SnapshotStore>,
    tasks: Mutex<Vec<(&'static str, AbortHandle)>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the given scheduler and snapshot store.
    pub const fn new(scheduler: Arc<Scheduler>, snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            scheduler,
            snapshots,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Track a background task so shutdown stops it.
    pub fn register_task(&self, name: &'static str, task: AbortHandle) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push((name, task)),
            Err(poisoned) => poisoned.into_inner().push((name, task)),
        }
    }

    /// Shut down. Safe to call any number of times.
    pub fn shutdown(&self) -> ShutdownReport {
        if !self.scheduler.mark_shut_down() {
            return ShutdownReport {
                already_shut_down: true,
                jobs_cancelled: 0,
                snapshots_cleared: 0,
                tasks_stopped: 0,
                completed_at: Utc::now(),
            };
        }

        let jobs_cancelled = self.scheduler.cancel_all();
        let snapshots_cleared = self.snapshots.clear();

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => {
                warn!("Task registry lock poisoned, recovering");
                std::mem::take(&mut *poisoned.into_inner())
            }
        };
        for (name, task) in &tasks {
            task.abort();
            info!(task = name, "Background task stopped");
        }

        let report = ShutdownReport {
            already_shut_down: false,
            jobs_cancelled,
            snapshots_cleared,
            tasks_stopped: tasks.len(),
            completed_at: Utc::now(),
        };
        info!(
            jobs_cancelled,
            snapshots_cleared,
            tasks_stopped = report.tasks_stopped,
            "Regeneration shut down"
        );
        report
    }

    /// Whether shutdown has happened.
    pub fn is_shut_down(&self) -> bool {
        self.scheduler.is_shut_down()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use regen_types::{CellState, LocationKey, WorldId};
    use tokio::runtime::Handle;

    use super::*;
    use crate::config::{RegenConfig, SchedulerConfig};
    use crate::executor::WorldDriver;
    use crate::memory::MemoryWorld;
    use crate::rules::{AnyMaterial, RuleStore};

    fn key(x: i32) -> LocationKey {
        LocationKey::new(WorldId::from(uuid::Uuid::nil()), x, 12, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_clears_and_is_idempotent() {
        let rules = Arc::new(RuleStore::new());
        rules.load(
            &RegenConfig::parse("materials:\n  STONE:\n    regenerate-delay: 5\n").unwrap(),
            &AnyMaterial,
        );
        let snapshots = Arc::new(SnapshotStore::new());
        let (mut driver, writes) = WorldDriver::new(MemoryWorld::new());
        let scheduler = Arc::new(Scheduler::new(
            rules,
            Arc::clone(&snapshots),
            writes,
            &SchedulerConfig::default(),
            Handle::current(),
        ));
        let coordinator = ShutdownCoordinator::new(Arc::clone(&scheduler), Arc::clone(&snapshots));

        let background = tokio::spawn(std::future::pending::<()>());
        coordinator.register_task("idle", background.abort_handle());

        let stone = CellState::parse("STONE").unwrap();
        for x in 0..3 {
            assert!(scheduler.handle_removal(key(x), stone.clone()));
        }

        let report = coordinator.shutdown();
        assert!(!report.already_shut_down);
        assert_eq!(report.jobs_cancelled, 3);
        assert_eq!(report.snapshots_cleared, 3);
        assert_eq!(report.tasks_stopped, 1);
        assert!(coordinator.is_shut_down());

        let again = coordinator.shutdown();
        assert!(again.already_shut_down);
        assert_eq!(again.jobs_cancelled, 0);

        assert!(!scheduler.handle_removal(key(9), stone.clone()));
        assert_eq!(scheduler.active_jobs(), 0);
        assert!(snapshots.is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        driver.apply_pending();
        let restored = driver
            .world()
            .writes()
            .iter()
            .filter(|w| w.state == stone)
            .count();
        assert_eq!(restored, 0);
        assert!(background.await.is_err_and(|e| e.is_cancelled()));
    }
}
