//! Material identifiers.
//!
//! Materials are upper-case identifiers such as `STONE` or `WHEAT_CROP`.
//! Input is trimmed and upper-cased, and the `minecraft:` namespace prefix
//! is accepted and dropped, so `minecraft:stone` and `STONE` name the same
//! material.

use serde::{Deserialize, Serialize};

use crate::state::StateParseError;

/// Namespace prefix accepted (and stripped) in front of a material name.
const NAMESPACE_PREFIX: &str = "minecraft:";

/// A validated material name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Material(String);

impl Material {
    /// Parse and normalise a material name.
    ///
    /// # Errors
    ///
    /// Returns [`StateParseError::EmptyMaterial`] for blank input and
    /// [`StateParseError::InvalidMaterial`] if the name contains anything
    /// other than ASCII letters, digits and underscores.
    pub fn parse(raw: &str) -> Result<Self, StateParseError> {
        let trimmed = raw.trim();
        let name = trimmed
            .get(..NAMESPACE_PREFIX.len())
            .filter(|head| head.eq_ignore_ascii_case(NAMESPACE_PREFIX))
            .and_then(|_| trimmed.get(NAMESPACE_PREFIX.len()..))
            .unwrap_or(trimmed);

        if name.is_empty() {
            return Err(StateParseError::EmptyMaterial);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StateParseError::InvalidMaterial {
                name: trimmed.to_owned(),
            });
        }
        Ok(Self(name.to_ascii_uppercase()))
    }

    /// The empty-cell material used as the default placeholder.
    pub fn air() -> Self {
        Self("AIR".to_owned())
    }

    /// Whether this is the empty-cell material.
    pub fn is_air(&self) -> bool {
        self.0 == "AIR"
    }

    /// The normalised name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Material {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Material {
    type Error = StateParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Material> for String {
    fn from(material: Material) -> Self {
        material.0
    }
}

impl core::str::FromStr for Material {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
