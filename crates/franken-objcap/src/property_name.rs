//! Confidentiality tiers carried by property names.
//!
//! Tiers are purely lexical: a trailing `__` marks an engine-internal name,
//! a single trailing `_` an object-private one.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ENGINE_INTERNAL_SUFFIX: &str = "__";
pub const OBJECT_PRIVATE_SUFFIX: &str = "_";

/// Visibility tier of a property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameTier {
    Ordinary,
    /// Visible to the object's own methods only.
    ObjectPrivate,
    /// Visible to nobody, the owning object included.
    EngineInternal,
}

impl NameTier {
    pub fn of(name: &str) -> Self {
        if name.ends_with(ENGINE_INTERNAL_SUFFIX) {
            Self::EngineInternal
        } else if name.ends_with(OBJECT_PRIVATE_SUFFIX) {
            Self::ObjectPrivate
        } else {
            Self::Ordinary
        }
    }

    pub fn visible_to_self(self) -> bool {
        !matches!(self, Self::EngineInternal)
    }

    pub fn visible_to_public(self) -> bool {
        matches!(self, Self::Ordinary)
    }
}

impl fmt::Display for NameTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinary => write!(f, "ordinary"),
            Self::ObjectPrivate => write!(f, "object_private"),
            Self::EngineInternal => write!(f, "engine_internal"),
        }
    }
}
