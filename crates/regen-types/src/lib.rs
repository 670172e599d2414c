//! Shared value types for the Regrowth regeneration engine.
//!
//! Everything the regeneration core keys on or replays lives here, so hosts
//! can build locations and states without depending on the core itself.
//!
//! # Modules
//!
//! - [`ids`] -- UUID newtypes for worlds and regeneration jobs
//! - [`location`] -- [`LocationKey`], the hashable address of a voxel cell
//! - [`material`] -- Validated material names
//! - [`state`] -- [`CellState`], a material plus its block properties

pub mod ids;
pub mod location;
pub mod material;
pub mod state;

pub use ids::{JobId, WorldId};
pub use location::LocationKey;
pub use material::Material;
pub use state::{CellState, StateParseError};
