//! Error types for the `regen-core` crate.
//!
//! None of these escape the public removal or timer entry points: they are
//! produced by internal steps and logged where the failure is absorbed.

use regen_types::{LocationKey, Material, StateParseError};

use crate::config::ConfigError;

/// Errors raised by the regeneration core.
#[derive(Debug, thiserror::Error)]
pub enum RegenError {
    /// A material entry in the configuration has the wrong shape.
    #[error("material entry {material:?} is malformed: {source}")]
    InvalidEntry {
        /// The configured material key.
        material: String,
        /// The underlying parse error.
        source: ConfigError,
    },

    /// A material name or state spec in a material entry does not parse.
    #[error("material entry {material:?} has an invalid {field}: {source}")]
    InvalidState {
        /// The configured material key.
        material: String,
        /// Which setting failed (`material`, `replace-with`, `regenerate-into`).
        field: &'static str,
        /// The underlying parse error.
        source: StateParseError,
    },

    /// A material parsed but the host does not know it.
    #[error("unknown material {material} in entry {entry:?}")]
    UnknownMaterial {
        /// The configured material key.
        entry: String,
        /// The unrecognised material.
        material: Material,
    },

    /// The same material was configured twice (after name normalisation).
    #[error("duplicate material entry {material}")]
    DuplicateMaterial {
        /// The repeated material.
        material: Material,
    },

    /// The world-mutation context is gone; the write was dropped.
    #[error("mutation context unavailable, write to {location} dropped")]
    ContextUnavailable {
        /// Target of the dropped write.
        location: LocationKey,
    },
}

/// Errors reported by a [`World`](crate::executor::World) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The world refused to apply the state at that location.
    #[error("state {state} rejected at {location}: {reason}")]
    Rejected {
        /// Target location.
        location: LocationKey,
        /// Rendered state that was refused.
        state: String,
        /// Host-supplied reason.
        reason: String,
    },

    /// The location is not loaded or does not exist.
    #[error("location {0} is not loaded")]
    NotLoaded(LocationKey),
}
