//! Per-material regeneration rules.
//!
//! The [`RuleStore`] holds one immutable [`RegenerationRule`] per material.
//! A load builds a complete new table and publishes it with a single
//! [`ArcSwap`] store, so readers on any thread see either the whole old
//! table or the whole new one and never take a lock.
//!
//! Bad entries (malformed YAML, unparsable names or state specs, materials
//! the host does not know) are logged and skipped; the rest of the table
//! still loads.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use regen_types::{CellState, Material};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{MaterialEntry, RegenConfig, parse_material_entry};
use crate::error::RegenError;

/// How one material regenerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerationRule {
    /// Material this rule applies to.
    pub material: Material,
    /// State written immediately after removal.
    pub placeholder: CellState,
    /// Time between removal and restoration (at least one second).
    pub restore_delay: Duration,
    /// State restored when no snapshot survives.
    pub fallback: CellState,
}

impl RegenerationRule {
    /// Build a rule from a configured entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegenError::InvalidState`] if the material name or either
    /// state spec fails to parse, and [`RegenError::UnknownMaterial`] if any
    /// referenced material is missing from `catalog`.
    pub fn from_entry(
        name: &str,
        entry: &MaterialEntry,
        catalog: &dyn MaterialCatalog,
    ) -> Result<Self, RegenError> {
        let invalid = |field: &'static str| {
            move |source| RegenError::InvalidState {
                material: name.to_owned(),
                field,
                source,
            }
        };

        let material = Material::parse(name).map_err(invalid("material"))?;
        let placeholder = CellState::parse(&entry.replace_with).map_err(invalid("replace-with"))?;
        let fallback =
            CellState::parse(entry.fallback_spec(name)).map_err(invalid("regenerate-into"))?;

        for referenced in [&material, &placeholder.material, &fallback.material] {
            if !catalog.contains(referenced) {
                return Err(RegenError::UnknownMaterial {
                    entry: name.to_owned(),
                    material: referenced.clone(),
                });
            }
        }

        Ok(Self {
            material,
            placeholder,
            restore_delay: entry.delay(),
            fallback,
        })
    }
}

/// The host's set of known materials.
pub trait MaterialCatalog: Send + Sync + std::fmt::Debug {
    /// Whether `material` exists in the host world.
    fn contains(&self, material: &Material) -> bool;
}

/// A catalog accepting every syntactically valid material.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMaterial;

impl MaterialCatalog for AnyMaterial {
    fn contains(&self, _material: &Material) -> bool {
        true
    }
}

impl MaterialCatalog for BTreeSet<Material> {
    fn contains(&self, material: &Material) -> bool {
        Self::contains(self, material)
    }
}

/// Outcome of one [`RuleStore::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Number of rules in the newly published table.
    pub loaded: usize,
    /// Configured keys that were skipped.
    pub skipped: Vec<String>,
}

type RuleTable = HashMap<Material, Arc<RegenerationRule>>;

/// Copy-on-reload table of regeneration rules.
#[derive(Debug)]
pub struct RuleStore {
    rules: ArcSwap<RuleTable>,
}

impl RuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Parse every configured material and publish the result atomically.
    ///
    /// Entries that fail to parse are logged at `warn` and left out.
    pub fn load(&self, config: &RegenConfig, catalog: &dyn MaterialCatalog) -> LoadReport {
        let mut table = RuleTable::with_capacity(config.materials.len());
        let mut report = LoadReport::default();

        for (name, raw) in &config.materials {
            let parsed = parse_material_entry(raw)
                .map_err(|source| RegenError::InvalidEntry {
                    material: name.clone(),
                    source,
                })
                .and_then(|entry| RegenerationRule::from_entry(name, &entry, catalog))
                .and_then(|rule| {
                    if table.contains_key(&rule.material) {
                        Err(RegenError::DuplicateMaterial {
                            material: rule.material,
                        })
                    } else {
                        Ok(rule)
                    }
                });

            match parsed {
                Ok(rule) => {
                    table.insert(rule.material.clone(), Arc::new(rule));
                }
                Err(e) => {
                    warn!(entry = name, error = %e, "Skipping regeneration entry");
                    report.skipped.push(name.clone());
                }
            }
        }

        report.loaded = table.len();
        self.rules.store(Arc::new(table));
        info!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "Regeneration rules loaded"
        );
        report
    }

    /// Look up the rule for a material.
    pub fn get(&self, material: &Material) -> Option<Arc<RegenerationRule>> {
        self.rules.load().get(material).cloned()
    }

    /// Number of rules in the current table.
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    /// Whether the current table is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }

    /// Materials with a rule, sorted.
    pub fn materials(&self) -> Vec<Material> {
        let mut materials: Vec<Material> = self.rules.load().keys().cloned().collect();
        materials.sort();
        materials
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn material(name: &str) -> Material {
        Material::parse(name).unwrap()
    }

    fn config(yaml: &str) -> RegenConfig {
        RegenConfig::parse(yaml).unwrap()
    }

    #[test]
    fn loads_rules_with_defaults() {
        let store = RuleStore::new();
        let report = store.load(
            &config("materials:\n  STONE:\n    regenerate-delay: 5\n"),
            &AnyMaterial,
        );
        assert_eq!(report.loaded, 1);
        assert!(report.skipped.is_empty());

        let rule = store.get(&material("stone")).unwrap();
        assert_eq!(rule.placeholder, CellState::bare(Material::air()));
        assert_eq!(rule.restore_delay, Duration::from_secs(5));
        assert_eq!(rule.fallback, CellState::bare(material("STONE")));
    }

    #[test]
    fn fallback_keeps_properties() {
        let store = RuleStore::new();
        store.load(
            &config(
                "materials:\n  WHEAT_CROP:\n    regenerate-delay: 10\n    regenerate-into: \"WHEAT_CROP[age=0]\"\n",
            ),
            &AnyMaterial,
        );
        let rule = store.get(&material("WHEAT_CROP")).unwrap();
        assert_eq!(rule.fallback.property("age"), Some("0"));
    }

    #[test]
    fn bad_entries_are_skipped_not_fatal() {
        let yaml = r#"
materials:
  STONE:
    regenerate-delay: 5
  "not a block":
    regenerate-delay: 5
  SAND:
    replace-with: "AIR[broken"
  GRAVEL:
    regenerate-delay: later
  DIRT:
    regenerate-into: "DIRT[snowy=true]"
"#;
        let store = RuleStore::new();
        let report = store.load(&config(yaml), &AnyMaterial);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped.len(), 3);
        assert!(store.get(&material("STONE")).is_some());
        assert!(store.get(&material("DIRT")).is_some());
        assert!(store.get(&material("SAND")).is_none());
    }

    #[test]
    fn unknown_materials_are_skipped() {
        let catalog: BTreeSet<Material> = [material("STONE"), material("COBBLESTONE"), Material::air()]
            .into_iter()
            .collect();
        // OBSIDIAN is unknown itself; COBBLESTONE is known but its placeholder is not.
        let yaml = "materials:\n  STONE: {}\n  OBSIDIAN: {}\n  COBBLESTONE:\n    replace-with: GLASS\n";
        let store = RuleStore::new();
        let report = store.load(&config(yaml), &catalog);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, vec!["COBBLESTONE".to_owned(), "OBSIDIAN".to_owned()]);
    }

    #[test]
    fn duplicate_after_normalisation_is_skipped() {
        let store = RuleStore::new();
        let report = store.load(&config("materials:\n  STONE: {}\n  stone: {}\n"), &AnyMaterial);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, vec!["stone".to_owned()]);
    }

    #[test]
    fn reload_replaces_whole_table() {
        let store = RuleStore::new();
        store.load(&config("materials:\n  STONE: {}\n  DIRT: {}\n"), &AnyMaterial);
        assert_eq!(store.len(), 2);

        let held = store.get(&material("STONE")).unwrap();
        store.load(&config("materials:\n  SAND: {}\n"), &AnyMaterial);
        assert_eq!(store.materials(), vec![material("SAND")]);
        assert!(store.get(&material("STONE")).is_none());
        // Rules handed out before the reload stay valid.
        assert_eq!(held.material, material("STONE"));
    }

    #[test]
    fn readers_never_see_partial_tables() {
        let store = Arc::new(RuleStore::new());
        let both = config("materials:\n  STONE: {}\n  DIRT: {}\n");
        let neither = RegenConfig::default();

        std::thread::scope(|scope| {
            let writer_store = Arc::clone(&store);
            scope.spawn(move || {
                for i in 0..200 {
                    if i % 2 == 0 {
                        writer_store.load(&both, &AnyMaterial);
                    } else {
                        writer_store.load(&neither, &AnyMaterial);
                    }
                }
            });
            for _ in 0..4 {
                let reader_store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..2000 {
                        let len = reader_store.len();
                        assert!(len == 0 || len == 2, "observed partial table of {len}");
                    }
                });
            }
        });
    }
}
