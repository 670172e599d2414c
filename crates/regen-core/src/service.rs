//! The regeneration facade handed to the host.
//!
//! [`RegenService`] wires the rule table, snapshot store, scheduler, reaper
//! and shutdown coordinator together. Hosts call
//! [`handle_block_break`](RegenService::handle_block_break) from whatever
//! thread destroyed the cell and drain the paired
//! [`WorldDriver`](crate::executor::WorldDriver) on their mutation context.

use std::sync::Arc;

use regen_types::{CellState, LocationKey};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::RegenConfig;
use crate::executor::WriteQueue;
use crate::reaper::{Reaper, SweepReport};
use crate::rules::{LoadReport, MaterialCatalog, RuleStore};
use crate::scheduler::Scheduler;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::snapshot::SnapshotStore;

/// What the host knows about one destroyed cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakContext {
    /// Full state of the cell just before it was destroyed.
    pub state: CellState,
    /// Name of the effect that destroyed it, for logs.
    pub source: String,
}

impl BreakContext {
    /// Create a context.
    pub fn new(state: CellState, source: impl Into<String>) -> Self {
        Self {
            state,
            source: source.into(),
        }
    }
}

/// Point-in-time view of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenStatus {
    /// Live jobs counted against the ceiling.
    pub active_jobs: usize,
    /// Captured snapshots not yet consumed or evicted.
    pub stored_snapshots: usize,
    /// Current admission ceiling.
    pub ceiling: usize,
    /// Materials with a rule.
    pub rules_loaded: usize,
    /// Whether shutdown has happened.
    pub shut_down: bool,
}

/// Timed regeneration of destroyed cells.
#[derive(Debug)]
pub struct RegenService {
    rules: Arc<RuleStore>,
    catalog: Arc<dyn MaterialCatalog>,
    scheduler: Arc<Scheduler>,
    reaper: Reaper,
    coordinator: ShutdownCoordinator,
}

impl RegenService {
    /// Build the service, load the configured rules and start the reaper.
    ///
    /// Timers and the reaper run on `runtime`; `writes` is the queue of the
    /// host's mutation context.
    pub fn new(
        config: &RegenConfig,
        writes: WriteQueue,
        catalog: Arc<dyn MaterialCatalog>,
        runtime: Handle,
    ) -> Self {
        let rules = Arc::new(RuleStore::new());
        let snapshots = Arc::new(SnapshotStore::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&rules),
            Arc::clone(&snapshots),
            writes,
            &config.scheduler,
            runtime.clone(),
        ));
        let reaper = Reaper::new(
            Arc::clone(&scheduler),
            Arc::clone(&snapshots),
            &config.reaper,
        );
        let coordinator = ShutdownCoordinator::new(Arc::clone(&scheduler), snapshots);

        let task = reaper.clone().spawn(&runtime);
        coordinator.register_task("reaper", task.abort_handle());

        let service = Self {
            rules,
            catalog,
            scheduler,
            reaper,
            coordinator,
        };
        service.load_configurations(config);
        service
    }

    /// Load or reload rules and scheduler settings.
    ///
    /// Jobs already armed keep the rule they were armed with. Reaper timing
    /// is fixed at construction.
    pub fn load_configurations(&self, config: &RegenConfig) -> LoadReport {
        self.scheduler.set_ceiling(config.scheduler.max_pending_jobs);
        self.scheduler
            .set_notify_neighbors(config.scheduler.notify_neighbors);
        let report = self.rules.load(config, self.catalog.as_ref());
        info!(
            ceiling = config.scheduler.max_pending_jobs,
            rules = report.loaded,
            "Regeneration configured"
        );
        report
    }

    /// Report a destroyed cell.
    ///
    /// Returns `true` if the cell will regenerate.
    pub fn handle_block_break(&self, location: LocationKey, context: &BreakContext) -> bool {
        let accepted = self
            .scheduler
            .handle_removal(location, context.state.clone());
        debug!(
            location = %location,
            state = %context.state,
            source = %context.source,
            accepted,
            "Cell destroyed"
        );
        accepted
    }

    /// Cancel everything and refuse later removals. Idempotent.
    pub fn shutdown(&self) -> ShutdownReport {
        self.coordinator.shutdown()
    }

    /// Run a reaper sweep immediately.
    pub fn sweep_now(&self) -> SweepReport {
        self.reaper.sweep()
    }

    /// Live jobs counted against the ceiling.
    pub fn active_jobs(&self) -> usize {
        self.scheduler.active_jobs()
    }

    /// Captured snapshots not yet consumed or evicted.
    pub fn stored_snapshots(&self) -> usize {
        self.scheduler.stored_snapshots()
    }

    /// Whether a restoration is armed for `location`.
    pub fn is_pending(&self, location: &LocationKey) -> bool {
        self.scheduler.is_pending(location)
    }

    /// Snapshot of the counters.
    pub fn status(&self) -> RegenStatus {
        RegenStatus {
            active_jobs: self.scheduler.active_jobs(),
            stored_snapshots: self.scheduler.stored_snapshots(),
            ceiling: self.scheduler.ceiling(),
            rules_loaded: self.rules.len(),
            shut_down: self.coordinator.is_shut_down(),
        }
    }
}

impl Drop for RegenService {
    /// Dropping the service shuts it down, so no timer or reaper task keeps
    /// the write queue open.
    fn drop(&mut self) {
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use regen_types::WorldId;

    use super::*;
    use crate::executor::{World, WorldDriver};
    use crate::memory::MemoryWorld;
    use crate::rules::AnyMaterial;

    #[tokio::test(start_paused = true)]
    async fn reload_updates_rules_and_ceiling() {
        let config = RegenConfig::parse(
            "scheduler:\n  max_pending_jobs: 4\nmaterials:\n  STONE:\n    regenerate-delay: 5\n",
        )
        .unwrap();
        let (_driver, writes) = WorldDriver::new(MemoryWorld::new());
        let service = RegenService::new(&config, writes, Arc::new(AnyMaterial), Handle::current());
        assert_eq!(service.status().rules_loaded, 1);
        assert_eq!(service.status().ceiling, 4);

        let location = LocationKey::new(WorldId::from(uuid::Uuid::nil()), 0, 0, 0);
        let dirt = BreakContext::new(CellState::parse("DIRT").unwrap(), "test");
        assert!(!service.handle_block_break(location, &dirt));

        let reloaded = RegenConfig::parse(
            "scheduler:\n  max_pending_jobs: 9\nmaterials:\n  STONE: {}\n  DIRT: {}\n",
        )
        .unwrap();
        let report = service.load_configurations(&reloaded);
        assert_eq!(report.loaded, 2);
        assert!(service.handle_block_break(location, &dirt));

        let status = service.status();
        assert_eq!(status.ceiling, 9);
        assert_eq!(status.active_jobs, 1);
        assert_eq!(status.stored_snapshots, 1);
        assert!(!status.shut_down);

        let json = serde_json::to_value(service.status()).unwrap();
        assert_eq!(json["rules_loaded"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_service_closes_the_write_queue() {
        let config =
            RegenConfig::parse("materials:\n  STONE:\n    regenerate-delay: 5\n").unwrap();
        let (mut driver, writes) = WorldDriver::new(MemoryWorld::new());
        let service = RegenService::new(&config, writes, Arc::new(AnyMaterial), Handle::current());

        let location = LocationKey::new(WorldId::from(uuid::Uuid::nil()), 3, 0, 0);
        let stone = BreakContext::new(CellState::parse("STONE").unwrap(), "test");
        assert!(service.handle_block_break(location, &stone));
        drop(service);

        let processed = tokio::time::timeout(Duration::from_secs(120), driver.run())
            .await
            .unwrap();
        // Only the placeholder; the cancelled timer never restores.
        assert_eq!(processed, 1);
        assert_eq!(
            driver.world().get_state(&location),
            Some(CellState::parse("AIR").unwrap())
        );
    }
}
