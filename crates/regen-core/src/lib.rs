//! Timed regeneration of destroyed voxel cells.
//!
//! When an area-destruction effect removes a cell whose material has a
//! regeneration rule, the cell is swapped for a placeholder, its state is
//! captured, and a timer later puts the captured state back. Removing the
//! same cell again while a restoration is pending restarts its timer.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `regen-config.yaml` into
//!   strongly-typed structs.
//! - [`rules`] -- Per-material [`RegenerationRule`]s behind a lock-free,
//!   copy-on-reload [`RuleStore`].
//! - [`snapshot`] -- Location-keyed table of captured cell states.
//! - [`scheduler`] -- Removal handling, supersession, the admission ceiling
//!   and restoration timers.
//! - [`reaper`] -- Periodic sweep of stale jobs and expired snapshots.
//! - [`shutdown`] -- Idempotent teardown of all pending work.
//! - [`executor`] -- The [`World`] trait and the write queue that carries
//!   every mutation to the host's single mutation context.
//! - [`memory`] -- In-memory [`World`] for hosts without their own.
//! - [`service`] -- The [`RegenService`] facade tying it all together.
//! - [`error`] -- Error types.
//!
//! [`RegenerationRule`]: rules::RegenerationRule
//! [`RuleStore`]: rules::RuleStore
//! [`World`]: executor::World
//! [`RegenService`]: service::RegenService

pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod reaper;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod snapshot;

pub use config::RegenConfig;
pub use error::{RegenError, WorldError};
pub use executor::{World, WorldDriver, WriteQueue};
pub use service::{BreakContext, RegenService, RegenStatus};
