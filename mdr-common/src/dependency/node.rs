// mdr-common/src/dependency/node.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dependency::definition::ManagedVersion;
use crate::dependency::message::{Message, Severity};
use crate::error::{MdrError, Result};
use crate::model::artifact::{Hashes, ResolvedFile};
use crate::model::coordinates::{Coordinates, ModuleKey};
use crate::model::version::VersionConstraint;

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A file a node wants downloaded, as described by its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Repository-relative path, e.g. `org/acme/widget/1.0/widget-1.0.jar`.
    pub path: String,
    pub file_name: String,
    #[serde(default)]
    pub hashes: Hashes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
    /// Optional files (sources) may be missing from every repository.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct MavenNode {
    pub key: ModuleKey,
    /// Every constraint that reached this node, in the order they were seen.
    pub requested: Vec<VersionConstraint>,
    /// The constraint each parent edge carried.
    requested_by: Vec<(NodeId, VersionConstraint)>,
    resolved_version: Option<String>,
    /// Name of the selected Gradle variant, when resolved from a `.module` file.
    pub variant: Option<String>,
    /// Kotlin source sets shared by all requested platforms.
    pub source_sets: Vec<String>,
    pub artifacts: Vec<ArtifactFile>,
    pub files: Vec<ResolvedFile>,
}

impl MavenNode {
    pub fn new(key: ModuleKey) -> Self {
        Self {
            key,
            requested: Vec::new(),
            requested_by: Vec::new(),
            resolved_version: None,
            variant: None,
            source_sets: Vec::new(),
            artifacts: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Records the constraint declared on the edge from `parent`.
    pub fn request(&mut self, parent: NodeId, constraint: VersionConstraint) {
        if !self.requested.contains(&constraint) {
            self.requested.push(constraint.clone());
        }
        if !self.requested_by.iter().any(|(p, c)| *p == parent && *c == constraint) {
            self.requested_by.push((parent, constraint));
        }
    }

    /// Constraints the edge from `parent` carried; empty when it named no version.
    pub fn requested_by(&self, parent: NodeId) -> impl Iterator<Item = &VersionConstraint> {
        self.requested_by.iter().filter(move |(p, _)| *p == parent).map(|(_, c)| c)
    }

    pub fn resolved_version(&self) -> Option<&str> {
        self.resolved_version.as_deref()
    }

    /// Fixes the version. A node's version is set exactly once.
    pub fn fix_version(&mut self, version: impl Into<String>) -> Result<()> {
        let version = version.into();
        match &self.resolved_version {
            None => {
                self.resolved_version = Some(version);
                Ok(())
            }
            Some(existing) if *existing == version => Ok(()),
            Some(existing) => Err(MdrError::Generic(format!(
                "version of {} is already fixed to {existing}, refusing {version}",
                self.key
            ))),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(
            self.key.group.clone(),
            self.key.module.clone(),
            self.resolved_version.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct BomNode {
    pub coordinates: Coordinates,
    pub managed: Vec<ManagedVersion>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root { name: String },
    /// A local/project module grouping its declared dependencies.
    Module { name: String },
    Maven(MavenNode),
    BomConstraint(BomNode),
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    messages: Vec<Message>,
}

impl DependencyNode {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self { id, kind, parents: Vec::new(), children: Vec::new(), messages: Vec::new() }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages are append-only. The node's label becomes the message source when none is set.
    pub fn push_message(&mut self, message: Message) {
        let message = if message.source.is_none() {
            message.with_source(self.label())
        } else {
            message
        };
        self.messages.push(message);
    }

    pub fn push_error(&mut self, err: &MdrError) {
        self.push_message(Message::from_error(err, Severity::Error));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }

    pub fn as_maven(&self) -> Option<&MavenNode> {
        match &self.kind {
            NodeKind::Maven(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_maven_mut(&mut self) -> Option<&mut MavenNode> {
        match &mut self.kind {
            NodeKind::Maven(m) => Some(m),
            _ => None,
        }
    }

    /// Name shown in trees and diagnostics.
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Root { name } => name.clone(),
            NodeKind::Module { name } => format!("module:{name}"),
            NodeKind::BomConstraint(bom) => format!("bom:{}", bom.coordinates),
            NodeKind::Maven(m) => {
                let declared = m.requested.first().map(ToString::to_string);
                match (declared, m.resolved_version()) {
                    (Some(d), Some(r)) if d != r => format!("{}:{} -> {}", m.key, d, r),
                    (_, Some(r)) => format!("{}:{}", m.key, r),
                    (Some(d), None) => format!("{}:{}", m.key, d),
                    (None, None) => m.key.to_string(),
                }
            }
        }
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
