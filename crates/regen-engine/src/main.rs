//! Demo host for the Regrowth regeneration engine.
//!
//! Generates a patch of voxel terrain, owns it as the single mutation
//! context, fires area destruction bursts whose cells are reported from
//! worker threads, and drains regeneration writes on a tick loop until
//! every destroyed cell has grown back.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `regen-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Generate terrain and wrap it in a world driver
//! 4. Start the regeneration service (rules, scheduler, reaper)
//! 5. Fire the configured blasts
//! 6. Tick until restorations finish or the run times out
//! 7. Verify the terrain, shut down and log the final status

mod burst;
mod error;
mod terrain;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regen_core::memory::MemoryWorld;
use regen_core::{RegenConfig, RegenService, World, WorldDriver};
use regen_types::{CellState, LocationKey, WorldId};
use tokio::runtime::Handle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::burst::DemoConfig;
use crate::error::EngineError;

/// Config file looked up in the working directory.
const CONFIG_PATH: &str = "regen-config.yaml";

/// Time given to the mutation context between blasts.
const BLAST_SPACING: Duration = Duration::from_secs(1);

/// Application entry point for the demo host.
///
/// # Errors
///
/// Returns an error if configuration, terrain generation or a burst
/// worker fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;
    let demo = load_demo_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("regen-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        max_pending_jobs = config.scheduler.max_pending_jobs,
        reaper_interval_secs = config.reaper.interval_secs,
        max_snapshot_age_secs = config.reaper.max_snapshot_age_secs,
        materials = config.materials.len(),
        "Configuration loaded"
    );

    // 3. Generate terrain.
    let world_id = WorldId::new();
    let cells = terrain::generate(world_id, demo.half_width, demo.depth, demo.seed)
        .map_err(EngineError::from)?;
    info!(
        world = %world_id,
        cells = cells.len(),
        half_width = demo.half_width,
        depth = demo.depth,
        "Terrain generated"
    );
    let (mut driver, writes) = WorldDriver::new(cells);

    // 4. Start the regeneration service.
    let catalog = terrain::catalog().map_err(EngineError::from)?;
    let service = Arc::new(RegenService::new(
        &config,
        writes,
        Arc::new(catalog),
        Handle::current(),
    ));
    info!(rules = service.status().rules_loaded, "Regeneration service started");

    let mut ticker = tokio::time::interval(Duration::from_millis(demo.tick_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // 5. Fire the blasts.
    let mut rng = SmallRng::seed_from_u64(demo.seed);
    let mut expected: HashMap<LocationKey, CellState> = HashMap::new();
    for blast in 0..demo.blasts {
        let center = LocationKey::new(
            world_id,
            rng.random_range(demo.half_width.saturating_neg()..=demo.half_width),
            0,
            rng.random_range(demo.half_width.saturating_neg()..=demo.half_width),
        );
        let targets = burst::plan(driver.world(), center, demo.radius);
        let source = format!("blast-{blast}");

        let worker_service = Arc::clone(&service);
        let workers = demo.workers;
        let (report, accepted) = tokio::task::spawn_blocking(move || {
            burst::detonate(&worker_service, &targets, workers, &source)
        })
        .await
        .map_err(EngineError::from)?;

        info!(
            blast,
            center = %center,
            targeted = report.targeted,
            accepted = report.accepted,
            rejected = report.rejected,
            active_jobs = service.active_jobs(),
            "Blast fired"
        );
        for target in accepted {
            expected.insert(target.location, target.state);
        }
        drain_for(&mut driver, &mut ticker, BLAST_SPACING).await;
    }

    // 6. Tick until every job has completed.
    let started = Instant::now();
    let limit = Duration::from_secs(demo.max_run_secs);
    loop {
        ticker.tick().await;
        tick(&mut driver);
        if service.active_jobs() == 0 {
            break;
        }
        if started.elapsed() >= limit {
            warn!(
                active_jobs = service.active_jobs(),
                max_run_secs = demo.max_run_secs,
                "Gave up waiting for regeneration"
            );
            break;
        }
    }
    tick(&mut driver);

    // 7. Verify, shut down and report.
    let (restored, differing) = verify(driver.world(), &expected);
    if differing == 0 {
        info!(restored, "Every destroyed cell regenerated");
    } else {
        warn!(restored, differing, "Some cells did not regenerate as captured");
    }

    let sweep = service.sweep_now();
    info!(stale_jobs_removed = sweep.stale_jobs_removed, "Final sweep");

    let shutdown = service.shutdown();
    tick(&mut driver);
    info!(
        status = %serde_json::to_string(&service.status()).map_err(EngineError::from)?,
        driver = %serde_json::to_string(&driver.stats()).map_err(EngineError::from)?,
        shutdown = %serde_json::to_string(&shutdown).map_err(EngineError::from)?,
        "regen-engine shutdown complete"
    );

    Ok(())
}

/// Apply queued writes on every tick for `duration`.
async fn drain_for(driver: &mut WorldDriver<MemoryWorld>, ticker: &mut Interval, duration: Duration) {
    let started = Instant::now();
    while started.elapsed() < duration {
        ticker.tick().await;
        tick(driver);
    }
}

/// Apply queued writes once and discard the world's write log.
fn tick(driver: &mut WorldDriver<MemoryWorld>) {
    if driver.apply_pending() > 0 {
        let written = driver.world_mut().take_writes().len();
        debug!(written, "Regeneration writes applied");
    }
}

/// Count cells that are back in their captured state, and those that are not.
fn verify(world: &MemoryWorld, expected: &HashMap<LocationKey, CellState>) -> (usize, usize) {
    let restored = expected
        .iter()
        .filter(|(location, state)| world.get_state(location).as_ref() == Some(*state))
        .count();
    (restored, expected.len().saturating_sub(restored))
}

/// Load the regeneration configuration from `regen-config.yaml`.
///
/// Returns the configuration and whether it came from the file.
fn load_config() -> Result<(RegenConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        let config = RegenConfig::from_file(config_path)?;
        Ok((config, true))
    } else {
        let mut config = RegenConfig::default();
        config.scheduler.apply_env_overrides();
        Ok((config, false))
    }
}

/// Load demo settings from the `demo` section of `regen-config.yaml`.
///
/// Falls back to defaults if the file or the section is missing.
fn load_demo_config() -> Result<DemoConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        return Ok(DemoConfig::default());
    }
    let contents = std::fs::read_to_string(config_path).map_err(|e| EngineError::Demo {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Demo {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    match raw.get("demo") {
        Some(section) => serde_yml::from_value(section.clone()).map_err(|e| EngineError::Demo {
            message: format!("failed to parse demo config: {e}"),
        }),
        None => Ok(DemoConfig::default()),
    }
}
