// mdr-common/src/dependency/definition.rs
// Dependency edges as declared, before a version has been chosen.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::coordinates::{Coordinates, ModuleKey};
use crate::model::version::VersionConstraint;

/// Who declared a dependency or constraint. Only `Direct` strict versions win outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyOrigin {
    Direct,
    Transitive,
    Bom,
}

impl fmt::Display for DependencyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyOrigin::Direct => f.write_str("direct"),
            DependencyOrigin::Transitive => f.write_str("transitive"),
            DependencyOrigin::Bom => f.write_str("bom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub key: ModuleKey,
    /// `None` when the version is expected from a BOM.
    pub constraint: Option<VersionConstraint>,
    pub origin: DependencyOrigin,
}

impl DeclaredDependency {
    pub fn new(key: ModuleKey, constraint: Option<VersionConstraint>, origin: DependencyOrigin) -> Self {
        Self { key, constraint, origin }
    }

    pub fn direct(coordinates: &Coordinates) -> Result<Self> {
        Ok(Self::new(coordinates.key(), coordinates.constraint()?, DependencyOrigin::Direct))
    }

    /// Text used when sorting siblings and when printing the graph.
    pub fn sort_key(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{}:{}", self.key, c),
            None => self.key.to_string(),
        }
    }
}

impl fmt::Display for DeclaredDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sort_key())
    }
}

/// A version constraint contributed by a BOM or platform; it adds no graph edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedVersion {
    pub key: ModuleKey,
    pub constraint: VersionConstraint,
}
