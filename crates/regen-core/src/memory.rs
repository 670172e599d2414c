//! In-memory [`World`] used by the demo host and by tests.
//!
//! Cells live in a hash map. Specific states or whole materials can be
//! marked as refused to exercise the driver's fallback chain, and every
//! successful write is recorded in order. The write log is unbounded; a
//! long-running host drains it with [`MemoryWorld::take_writes`].

use std::collections::{HashMap, HashSet};

use regen_types::{CellState, LocationKey, Material};

use crate::error::WorldError;
use crate::executor::World;

/// One successful write as seen by the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Target cell.
    pub location: LocationKey,
    /// State written.
    pub state: CellState,
    /// Whether neighbours were notified.
    pub notify_neighbors: bool,
}

/// Hash-map backed world.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    cells: HashMap<LocationKey, CellState>,
    refused_states: HashSet<CellState>,
    refused_materials: HashSet<Material>,
    writes: Vec<RecordedWrite>,
}

impl MemoryWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a cell directly, bypassing refusal rules and the write log.
    pub fn insert(&mut self, location: LocationKey, state: CellState) {
        self.cells.insert(location, state);
    }

    /// Refuse this exact state on every later write.
    pub fn reject_state(&mut self, state: CellState) {
        self.refused_states.insert(state);
    }

    /// Refuse every state of this material on later writes.
    pub fn reject_material(&mut self, material: Material) {
        self.refused_materials.insert(material);
    }

    /// Successful writes, oldest first.
    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    /// Drain the write log, oldest first.
    pub fn take_writes(&mut self) -> Vec<RecordedWrite> {
        std::mem::take(&mut self.writes)
    }

    /// Number of loaded cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is loaded.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over every loaded cell.
    pub fn cells(&self) -> impl Iterator<Item = (&LocationKey, &CellState)> {
        self.cells.iter()
    }
}

impl World for MemoryWorld {
    fn get_state(&self, location: &LocationKey) -> Option<CellState> {
        self.cells.get(location).cloned()
    }

    fn set_state(
        &mut self,
        location: &LocationKey,
        state: &CellState,
        notify_neighbors: bool,
    ) -> Result<(), WorldError> {
        let refused_reason = if self.refused_materials.contains(&state.material) {
            Some("material refused")
        } else if self.refused_states.contains(state) {
            Some("state refused")
        } else {
            None
        };
        if let Some(reason) = refused_reason {
            return Err(WorldError::Rejected {
                location: *location,
                state: state.to_string(),
                reason: reason.to_owned(),
            });
        }

        self.cells.insert(*location, state.clone());
        self.writes.push(RecordedWrite {
            location: *location,
            state: state.clone(),
            notify_neighbors,
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use regen_types::WorldId;

    use super::*;

    #[test]
    fn take_writes_empties_the_log_but_keeps_cells() {
        let location = LocationKey::new(WorldId::new(), 0, 0, 0);
        let stone = CellState::parse("STONE").unwrap();
        let mut world = MemoryWorld::new();
        world.set_state(&location, &stone, false).unwrap();
        world.set_state(&location, &stone, true).unwrap();

        let drained = world.take_writes();
        assert_eq!(drained.len(), 2);
        assert!(drained.last().unwrap().notify_neighbors);
        assert!(world.writes().is_empty());
        assert_eq!(world.get_state(&location), Some(stone));
    }
}
