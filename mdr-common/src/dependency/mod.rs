pub mod definition;
pub mod graph;
pub mod message;
pub mod node;

pub use definition::{DeclaredDependency, DependencyOrigin, ManagedVersion};
pub use graph::{CycleDetected, DependencyGraph};
pub use message::{Message, Severity};
pub use node::{ArtifactFile, BomNode, DependencyNode, MavenNode, NodeId, NodeKind};
