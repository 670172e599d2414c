//! Area destruction bursts.
//!
//! A burst picks every solid cell inside a sphere, then reports the cells
//! to the regeneration service from a pool of worker threads, the way an
//! explosion handler running off the main thread would. The cells are read
//! on the mutation context before the workers start; the workers never
//! touch the world.

use std::sync::atomic::{AtomicUsize, Ordering};

use regen_core::memory::MemoryWorld;
use regen_core::{BreakContext, RegenService, World};
use regen_types::{CellState, LocationKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Demo run settings, read from the `demo` section of `regen-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Terrain half-width in cells.
    #[serde(default = "default_half_width")]
    pub half_width: i32,

    /// Terrain depth below the surface.
    #[serde(default = "default_depth")]
    pub depth: i32,

    /// Terrain and blast placement seed.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of blasts to fire.
    #[serde(default = "default_blasts")]
    pub blasts: u32,

    /// Blast radius in cells.
    #[serde(default = "default_radius")]
    pub radius: i32,

    /// Worker threads reporting destroyed cells.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Interval between mutation-context drains, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Give up waiting for restorations after this many seconds.
    #[serde(default = "default_max_run_secs")]
    pub max_run_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            half_width: default_half_width(),
            depth: default_depth(),
            seed: default_seed(),
            blasts: default_blasts(),
            radius: default_radius(),
            workers: default_workers(),
            tick_interval_ms: default_tick_interval_ms(),
            max_run_secs: default_max_run_secs(),
        }
    }
}

const fn default_half_width() -> i32 {
    24
}

const fn default_depth() -> i32 {
    16
}

const fn default_seed() -> u64 {
    0x5EED
}

const fn default_blasts() -> u32 {
    3
}

const fn default_radius() -> i32 {
    5
}

const fn default_workers() -> usize {
    4
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_max_run_secs() -> u64 {
    120
}

// -----------------------------------------------------------------------
// Planning
// -----------------------------------------------------------------------

/// One cell a blast will destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Where the cell is.
    pub location: LocationKey,
    /// Its state before the blast.
    pub state: CellState,
}

/// Every location within `radius` of `center`, including the center.
#[allow(clippy::arithmetic_side_effects)]
pub fn sphere(center: LocationKey, radius: i32) -> Vec<LocationKey> {
    let radius = radius.max(0);
    let limit = i64::from(radius) * i64::from(radius);
    let mut cells = Vec::new();
    for dx in -radius..=radius {
        for dy in -radius..=radius {
            for dz in -radius..=radius {
                let distance = i64::from(dx) * i64::from(dx)
                    + i64::from(dy) * i64::from(dy)
                    + i64::from(dz) * i64::from(dz);
                if distance <= limit {
                    if let Some(location) = center.offset(dx, dy, dz) {
                        cells.push(location);
                    }
                }
            }
        }
    }
    cells
}

/// Solid cells inside the sphere, with their current state.
///
/// Must run on the mutation context.
pub fn plan(world: &MemoryWorld, center: LocationKey, radius: i32) -> Vec<Target> {
    sphere(center, radius)
        .into_iter()
        .filter_map(|location| {
            world
                .get_state(&location)
                .filter(|state| !state.material.is_air())
                .map(|state| Target { location, state })
        })
        .collect()
}

// -----------------------------------------------------------------------
// Detonation
// -----------------------------------------------------------------------

/// What one burst did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurstReport {
    /// Cells reported to the service.
    pub targeted: usize,
    /// Cells that will regenerate.
    pub accepted: usize,
    /// Cells without a rule, or refused by the ceiling or shutdown.
    pub rejected: usize,
}

/// Report every target to `service` from `workers` threads.
///
/// Returns the report and the targets that were accepted.
pub fn detonate(
    service: &RegenService,
    targets: &[Target],
    workers: usize,
    source: &str,
) -> (BurstReport, Vec<Target>) {
    let workers = workers.max(1);
    let chunk = targets.len().div_ceil(workers).max(1);
    let accepted_count = AtomicUsize::new(0);

    let accepted: Vec<Target> = std::thread::scope(|scope| {
        let handles: Vec<_> = targets
            .chunks(chunk)
            .map(|batch| {
                let accepted_count = &accepted_count;
                scope.spawn(move || {
                    let mut kept = Vec::new();
                    for target in batch {
                        let context = BreakContext::new(target.state.clone(), source);
                        if service.handle_block_break(target.location, &context) {
                            accepted_count.fetch_add(1, Ordering::Relaxed);
                            kept.push(target.clone());
                        }
                    }
                    kept
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .flatten()
            .collect()
    });

    let accepted_total = accepted_count.load(Ordering::Relaxed);
    let report = BurstReport {
        targeted: targets.len(),
        accepted: accepted_total,
        rejected: targets.len().saturating_sub(accepted_total),
    };
    debug!(
        source,
        targeted = report.targeted,
        accepted = report.accepted,
        "Burst reported"
    );
    (report, accepted)
}
