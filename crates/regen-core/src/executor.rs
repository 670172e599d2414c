//! The world-mutation context.
//!
//! The host owns exactly one context allowed to touch world state. The core
//! never calls into the world directly: it submits [`WriteRequest`]s through
//! a [`WriteQueue`], and the host drains them with a [`WorldDriver`] from
//! its own loop. Only two kinds of work cross this boundary, the immediate
//! placeholder write and the eventual restore or fallback write.
//!
//! When the world refuses a state the driver retries with the bare material
//! and, if that is refused too, leaves the cell as it is and logs a warning.

use regen_types::{CellState, LocationKey};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{RegenError, WorldError};

/// World state access provided by the host.
///
/// Both methods are only ever called from the thread driving the
/// [`WorldDriver`].
pub trait World {
    /// Current state of a cell, or `None` if it is not loaded.
    fn get_state(&self, location: &LocationKey) -> Option<CellState>;

    /// Replace the state of a cell.
    ///
    /// # Errors
    ///
    /// Returns a [`WorldError`] if the host refuses the state.
    fn set_state(
        &mut self,
        location: &LocationKey,
        state: &CellState,
        notify_neighbors: bool,
    ) -> Result<(), WorldError>;
}

/// Why a write was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    /// Temporary state right after removal.
    Placeholder,
    /// Replaying a captured snapshot.
    Restore,
    /// Rule fallback after the snapshot was evicted.
    Fallback,
}

/// One queued world write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Target cell.
    pub location: LocationKey,
    /// Desired state.
    pub state: CellState,
    /// Whether neighbours are notified of the change.
    pub notify_neighbors: bool,
    /// Why the write was requested.
    pub kind: WriteKind,
}

/// Sending half of the mutation channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

impl WriteQueue {
    /// Queue a write for the mutation context.
    ///
    /// # Errors
    ///
    /// Returns [`RegenError::ContextUnavailable`] if the driver has been
    /// dropped; the write is discarded.
    pub fn submit(&self, request: WriteRequest) -> Result<(), RegenError> {
        self.tx
            .send(request)
            .map_err(|rejected| RegenError::ContextUnavailable {
                location: rejected.0.location,
            })
    }

    /// Whether the driver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What happened to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The requested state was written.
    Applied,
    /// The requested state was refused; the bare material was written.
    AppliedBare,
    /// Nothing could be written; the cell keeps its current state.
    Skipped,
}

/// Running totals kept by a [`WorldDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    /// Requests written as asked.
    pub applied: u64,
    /// Requests written as their bare material.
    pub applied_bare: u64,
    /// Requests that could not be written at all.
    pub skipped: u64,
}

/// Receiving half of the mutation channel, bound to the host world.
#[derive(Debug)]
pub struct WorldDriver<W> {
    world: W,
    rx: mpsc::UnboundedReceiver<WriteRequest>,
    stats: DriverStats,
}

impl<W: World> WorldDriver<W> {
    /// Wrap `world` and return the driver with its queue.
    pub fn new(world: W) -> (Self, WriteQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                world,
                rx,
                stats: DriverStats::default(),
            },
            WriteQueue { tx },
        )
    }

    /// Apply every request queued so far without waiting for more.
    ///
    /// Returns the number of requests processed.
    pub fn apply_pending(&mut self) -> usize {
        let mut processed: usize = 0;
        while let Ok(request) = self.rx.try_recv() {
            self.apply(&request);
            processed = processed.saturating_add(1);
        }
        processed
    }

    /// Apply requests as they arrive until every [`WriteQueue`] is dropped.
    ///
    /// Returns the number of requests processed.
    pub async fn run(&mut self) -> usize {
        let mut processed: usize = 0;
        while let Some(request) = self.rx.recv().await {
            self.apply(&request);
            processed = processed.saturating_add(1);
        }
        debug!(processed, "Write queue closed, driver stopping");
        processed
    }

    /// Apply a single request with the bare-material fallback chain.
    pub fn apply(&mut self, request: &WriteRequest) -> ApplyOutcome {
        let outcome = match self.world.set_state(
            &request.location,
            &request.state,
            request.notify_neighbors,
        ) {
            Ok(()) => ApplyOutcome::Applied,
            Err(first) if !request.state.is_bare() => {
                let bare = request.state.stripped();
                match self
                    .world
                    .set_state(&request.location, &bare, request.notify_neighbors)
                {
                    Ok(()) => {
                        debug!(
                            location = %request.location,
                            state = %request.state,
                            error = %first,
                            "State refused, wrote bare material instead"
                        );
                        ApplyOutcome::AppliedBare
                    }
                    Err(second) => {
                        warn!(
                            location = %request.location,
                            state = %request.state,
                            kind = ?request.kind,
                            error = %second,
                            "Cell write refused, leaving cell unchanged"
                        );
                        ApplyOutcome::Skipped
                    }
                }
            }
            Err(e) => {
                warn!(
                    location = %request.location,
                    state = %request.state,
                    kind = ?request.kind,
                    error = %e,
                    "Cell write refused, leaving cell unchanged"
                );
                ApplyOutcome::Skipped
            }
        };

        match outcome {
            ApplyOutcome::Applied => self.stats.applied = self.stats.applied.saturating_add(1),
            ApplyOutcome::AppliedBare => {
                self.stats.applied_bare = self.stats.applied_bare.saturating_add(1);
            }
            ApplyOutcome::Skipped => self.stats.skipped = self.stats.skipped.saturating_add(1),
        }
        outcome
    }

    /// Shared access to the world.
    pub const fn world(&self) -> &W {
        &self.world
    }

    /// Mutable access to the world, for host-side edits between drains.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Totals since the driver was created.
    pub const fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Close the channel and hand the world back.
    ///
    /// Requests still queued are dropped; later submissions fail with
    /// [`RegenError::ContextUnavailable`].
    pub fn into_world(self) -> W {
        self.world
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use regen_types::{Material, WorldId};

    use super::*;
    use crate::memory::MemoryWorld;

    fn key(x: i32) -> LocationKey {
        LocationKey::new(WorldId::from(uuid::Uuid::nil()), x, 0, 0)
    }

    fn state(spec: &str) -> CellState {
        CellState::parse(spec).unwrap()
    }

    fn request(x: i32, spec: &str, kind: WriteKind) -> WriteRequest {
        WriteRequest {
            location: key(x),
            state: state(spec),
            notify_neighbors: false,
            kind,
        }
    }

    #[test]
    fn applies_in_submission_order() {
        let (mut driver, queue) = WorldDriver::new(MemoryWorld::new());
        queue.submit(request(1, "AIR", WriteKind::Placeholder)).unwrap();
        queue.submit(request(1, "STONE", WriteKind::Restore)).unwrap();

        assert_eq!(driver.apply_pending(), 2);
        assert_eq!(driver.world().get_state(&key(1)), Some(state("STONE")));
        assert_eq!(driver.stats().applied, 2);
        assert_eq!(driver.apply_pending(), 0);
    }

    #[test]
    fn refused_state_falls_back_to_bare_material() {
        let mut world = MemoryWorld::new();
        world.reject_state(state("WHEAT_CROP[age=7]"));
        let (mut driver, _queue) = WorldDriver::new(world);

        let outcome = driver.apply(&request(2, "WHEAT_CROP[age=7]", WriteKind::Restore));
        assert_eq!(outcome, ApplyOutcome::AppliedBare);
        assert_eq!(driver.world().get_state(&key(2)), Some(state("WHEAT_CROP")));
    }

    #[test]
    fn refused_material_leaves_cell_unchanged() {
        let mut world = MemoryWorld::new();
        world.insert(key(3), state("AIR"));
        world.reject_material(Material::parse("BEDROCK").unwrap());
        let (mut driver, _queue) = WorldDriver::new(world);

        let outcome = driver.apply(&request(3, "BEDROCK", WriteKind::Fallback));
        assert_eq!(outcome, ApplyOutcome::Skipped);
        assert_eq!(driver.world().get_state(&key(3)), Some(state("AIR")));
        assert_eq!(driver.stats().skipped, 1);
    }

    #[tokio::test]
    async fn run_drains_until_every_queue_is_dropped() {
        let (mut driver, queue) = WorldDriver::new(MemoryWorld::new());
        let producer = queue.clone();
        let task = tokio::spawn(async move {
            producer.submit(request(5, "AIR", WriteKind::Placeholder)).unwrap();
            producer.submit(request(5, "GRAVEL", WriteKind::Restore)).unwrap();
        });
        task.await.unwrap();
        drop(queue);

        assert_eq!(driver.run().await, 2);
        assert_eq!(driver.world().get_state(&key(5)), Some(state("GRAVEL")));
    }

    #[test]
    fn submit_fails_once_driver_is_gone() {
        let (driver, queue) = WorldDriver::new(MemoryWorld::new());
        assert!(!queue.is_closed());
        drop(driver.into_world());
        assert!(queue.is_closed());
        let err = queue.submit(request(4, "STONE", WriteKind::Restore));
        assert!(matches!(err, Err(RegenError::ContextUnavailable { .. })));
    }
}
