//! Full cell state: a material plus its block properties.
//!
//! Restoration must replay the exact prior configuration of a cell (crop
//! age, facing, waterlogging, ...), not only its material, so the captured
//! value is a [`CellState`]. The textual form is
//! `MATERIAL` or `MATERIAL[key=value,key=value]`, for example
//! `WHEAT_CROP[age=7]`. Property keys are lower-cased; properties are kept
//! sorted so two equal states always render identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::material::Material;

/// Errors produced while parsing a material name or a state spec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateParseError {
    /// The material portion was blank.
    #[error("material name is empty")]
    EmptyMaterial,

    /// The material name contains characters outside `[A-Za-z0-9_]`.
    #[error("invalid material name: {name:?}")]
    InvalidMaterial {
        /// The offending input.
        name: String,
    },

    /// A `[` was opened but never closed, or text follows the `]`.
    #[error("malformed property block in {spec:?}")]
    MalformedProperties {
        /// The full spec being parsed.
        spec: String,
    },

    /// A property entry has no `=`, an empty key or an empty value.
    #[error("invalid property entry {entry:?}")]
    InvalidProperty {
        /// The offending `key=value` fragment.
        entry: String,
    },

    /// The same property key appears twice.
    #[error("duplicate property key {key:?}")]
    DuplicateProperty {
        /// The repeated key.
        key: String,
    },
}

/// The complete state of one voxel cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellState {
    /// The cell's material.
    pub material: Material,
    /// Block properties, sorted by key.
    pub properties: BTreeMap<String, String>,
}

impl CellState {
    /// A state with the given material and no properties.
    pub const fn bare(material: Material) -> Self {
        Self {
            material,
            properties: BTreeMap::new(),
        }
    }

    /// Return a copy with one property set (key is lower-cased).
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties
            .insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
        self
    }

    /// Look up a property value.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The same material with every property dropped.
    pub fn stripped(&self) -> Self {
        Self::bare(self.material.clone())
    }

    /// Whether the state carries no properties.
    pub fn is_bare(&self) -> bool {
        self.properties.is_empty()
    }

    /// Parse a state spec such as `WHEAT_CROP[age=0]`.
    ///
    /// # Errors
    ///
    /// Returns a [`StateParseError`] describing the first problem found.
    pub fn parse(spec: &str) -> Result<Self, StateParseError> {
        let spec = spec.trim();
        let Some(open) = spec.find('[') else {
            return Material::parse(spec).map(Self::bare);
        };

        let malformed = || StateParseError::MalformedProperties {
            spec: spec.to_owned(),
        };

        let head = spec.get(..open).ok_or_else(malformed)?;
        let rest = spec.get(open..).ok_or_else(malformed)?;
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(malformed)?;
        if inner.contains('[') || inner.contains(']') {
            return Err(malformed());
        }

        let mut state = Self::bare(Material::parse(head)?);
        if inner.trim().is_empty() {
            return Err(malformed());
        }

        for entry in inner.split(',') {
            let invalid = || StateParseError::InvalidProperty {
                entry: entry.trim().to_owned(),
            };
            let (key, value) = entry.split_once('=').ok_or_else(invalid)?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if key.is_empty() || value.is_empty() || value.contains('=') {
                return Err(invalid());
            }
            if state.properties.contains_key(&key) {
                return Err(StateParseError::DuplicateProperty { key });
            }
            state.properties.insert(key, value.to_owned());
        }

        Ok(state)
    }
}

impl core::fmt::Display for CellState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.material)?;
        if self.properties.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("]")
    }
}

impl From<Material> for CellState {
    fn from(material: Material) -> Self {
        Self::bare(material)
    }
}

impl TryFrom<String> for CellState {
    type Error = StateParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CellState> for String {
    fn from(state: CellState) -> Self {
        state.to_string()
    }
}

impl core::str::FromStr for CellState {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_material() {
        let state = CellState::parse("stone").unwrap();
        assert_eq!(state.material.as_str(), "STONE");
        assert!(state.is_bare());
        assert_eq!(state.to_string(), "STONE");
    }

    #[test]
    fn parses_properties_and_renders_sorted() {
        let state = CellState::parse("OAK_STAIRS[ half = top , Facing=north ]").unwrap();
        assert_eq!(state.property("facing"), Some("north"));
        assert_eq!(state.property("half"), Some("top"));
        assert_eq!(state.to_string(), "OAK_STAIRS[facing=north,half=top]");
    }

    #[test]
    fn crop_age_is_part_of_identity() {
        let grown = CellState::parse("WHEAT_CROP[age=7]").unwrap();
        let seedling = CellState::parse("WHEAT_CROP[age=0]").unwrap();
        assert_ne!(grown, seedling);
        assert_eq!(grown.stripped(), seedling.stripped());
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(matches!(
            CellState::parse("WHEAT_CROP[age=7"),
            Err(StateParseError::MalformedProperties { .. })
        ));
        assert!(matches!(
            CellState::parse("WHEAT_CROP[]"),
            Err(StateParseError::MalformedProperties { .. })
        ));
        assert!(matches!(
            CellState::parse("WHEAT_CROP[age=7]x"),
            Err(StateParseError::MalformedProperties { .. })
        ));
        assert!(matches!(
            CellState::parse("WHEAT_CROP[age]"),
            Err(StateParseError::InvalidProperty { .. })
        ));
        assert!(matches!(
            CellState::parse("WHEAT_CROP[=7]"),
            Err(StateParseError::InvalidProperty { .. })
        ));
        assert!(matches!(
            CellState::parse("WHEAT_CROP[age=1,age=2]"),
            Err(StateParseError::DuplicateProperty { .. })
        ));
        assert!(matches!(
            CellState::parse("[age=1]"),
            Err(StateParseError::EmptyMaterial)
        ));
    }

    #[test]
    fn builder_matches_parser() {
        let built = CellState::bare(Material::parse("WHEAT_CROP").unwrap()).with_property("AGE", "7");
        assert_eq!(built, CellState::parse("wheat_crop[age=7]").unwrap());
    }

    #[test]
    fn serde_uses_text_form() {
        let state = CellState::parse("WHEAT_CROP[age=3]").unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"WHEAT_CROP[age=3]\"");
        let back: CellState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
