// mdr-core/src/descriptor.rs
//! What the graph builder needs to know about one module version: its outgoing edges,
//! the constraints it publishes and the files it wants. Descriptors are cached as JSON
//! next to the artifacts and invalidated when the metadata they came from changes.

use std::fmt;

use mdr_aio::fs::remove_file_if_exists_async;
use mdr_aio::{read_json_async, write_json_async};
use mdr_common::cache::Cache;
use mdr_common::dependency::{ArtifactFile, Message};
use mdr_common::error::Result;
use mdr_common::model::{Coordinates, ModuleKey, Version, VersionConstraint, VersionRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bumped whenever the JSON layout changes; older files are ignored.
pub const DESCRIPTOR_FORMAT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorSource {
    Pom,
    GradleModule,
}

impl fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorSource::Pom => f.write_str("pom"),
            DescriptorSource::GradleModule => f.write_str("module"),
        }
    }
}

/// Serializable form of a [`VersionConstraint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ConstraintSpec {
    Soft(String),
    Strict(String),
    Range(String),
}

impl From<&VersionConstraint> for ConstraintSpec {
    fn from(constraint: &VersionConstraint) -> Self {
        match constraint {
            VersionConstraint::Soft(v) => ConstraintSpec::Soft(v.as_str().to_string()),
            VersionConstraint::Strict(v) => ConstraintSpec::Strict(v.as_str().to_string()),
            VersionConstraint::Range(r) => ConstraintSpec::Range(r.as_str().to_string()),
        }
    }
}

impl ConstraintSpec {
    pub fn to_constraint(&self) -> Result<VersionConstraint> {
        Ok(match self {
            ConstraintSpec::Soft(v) => VersionConstraint::Soft(Version::parse(v)),
            ConstraintSpec::Strict(v) => VersionConstraint::Strict(Version::parse(v)),
            ConstraintSpec::Range(r) => VersionConstraint::Range(VersionRange::parse(r)?),
        })
    }
}

/// A dependency or constraint as published by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredEdge {
    pub group: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintSpec>,
}

impl DeclaredEdge {
    pub fn new(key: &ModuleKey, constraint: Option<&VersionConstraint>) -> Self {
        Self {
            group: key.group.clone(),
            module: key.module.clone(),
            constraint: constraint.map(ConstraintSpec::from),
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.group.clone(), self.module.clone())
    }

    pub fn constraint(&self) -> Result<Option<VersionConstraint>> {
        self.constraint.as_ref().map(ConstraintSpec::to_constraint).transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub format: u32,
    pub coordinates: Coordinates,
    pub source: DescriptorSource,
    /// sha256 of the `.module` or `.pom` this descriptor was computed from.
    pub metadata_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DeclaredEdge>,
    /// Versions this module imposes on others without depending on them.
    #[serde(default)]
    pub constraints: Vec<DeclaredEdge>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactFile>,
    #[serde(default)]
    pub source_sets: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Descriptor {
    pub fn new(coordinates: Coordinates, source: DescriptorSource, metadata_sha256: impl Into<String>) -> Self {
        Self {
            format: DESCRIPTOR_FORMAT,
            coordinates,
            source,
            metadata_sha256: metadata_sha256.into(),
            variant: None,
            dependencies: Vec::new(),
            constraints: Vec::new(),
            artifacts: Vec::new(),
            source_sets: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn push_dependency(&mut self, key: &ModuleKey, constraint: Option<&VersionConstraint>) {
        let edge = DeclaredEdge::new(key, constraint);
        if !self.dependencies.contains(&edge) {
            self.dependencies.push(edge);
        }
    }

    pub fn push_constraint(&mut self, key: &ModuleKey, constraint: &VersionConstraint) {
        let edge = DeclaredEdge::new(key, Some(constraint));
        if !self.constraints.contains(&edge) {
            self.constraints.push(edge);
        }
    }

    pub fn push_artifact(&mut self, artifact: ArtifactFile) {
        if !self.artifacts.iter().any(|a| a.path == artifact.path) {
            self.artifacts.push(artifact);
        }
    }
}

/// Returns the cached descriptor when it was computed from metadata with the same
/// digest. Unreadable or outdated entries are removed.
pub async fn load_descriptor(
    cache: &Cache,
    coordinates: &Coordinates,
    tag: &str,
    metadata_sha256: &str,
) -> Option<Descriptor> {
    let path = cache.descriptor_path(coordinates, tag).ok()?;
    if !path.exists() {
        return None;
    }
    match read_json_async::<Descriptor>(&path).await {
        Ok(d) if d.format == DESCRIPTOR_FORMAT && d.metadata_sha256 == metadata_sha256 => {
            debug!("Descriptor cache hit for {} ({})", coordinates, tag);
            Some(d)
        }
        Ok(_) => {
            debug!("Descriptor for {} is outdated", coordinates);
            None
        }
        Err(e) => {
            debug!("Discarding unreadable descriptor {}: {}", path.display(), e);
            let _ = remove_file_if_exists_async(&path).await;
            None
        }
    }
}

pub async fn store_descriptor(cache: &Cache, tag: &str, descriptor: &Descriptor) -> Result<()> {
    let path = cache.descriptor_path(&descriptor.coordinates, tag)?;
    write_json_async(&path, descriptor).await
}
